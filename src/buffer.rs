//! Buffer port (C8): the abstract document the algorithm applies operations
//! to. Defined only at its interface per spec §3/§6 — storage, rendering,
//! and persistence of the actual buffer are out of scope (spec §1
//! Non-goals). A reference in-memory rope implementation is provided behind
//! the `rope-buffer` feature for tests and for embedders who don't need a
//! custom buffer.

use crate::error::{OtError, Result};
use crate::error::Span;
use crate::op::text::TextChunk;

/// The buffer port consumed by the core (spec §6).
pub trait Buffer {
    /// Character length of the buffer's current content.
    fn length(&self) -> usize;

    /// Inserts `payload` at `pos`. `pos` must be `<= length()`.
    fn apply_insert(&mut self, pos: usize, payload: &TextChunk) -> Result<()>;

    /// Removes `len` characters starting at `pos`, returning the removed
    /// content so a non-reversible `Delete` can be promoted to a
    /// `ReversibleDelete` by the caller (spec §4.2 `make_reversible`).
    fn apply_delete(&mut self, pos: usize, len: usize) -> Result<TextChunk>;

    /// Reads `len` characters starting at `pos` without mutating the
    /// buffer, used by `make_reversible` to snapshot content ahead of a
    /// delete that's about to be applied elsewhere (e.g. during translation,
    /// where the op is made reversible before being applied to this site's
    /// buffer).
    fn extract(&self, pos: usize, len: usize) -> Result<TextChunk>;
}

fn check_bounds(pos: usize, len: usize, buf_len: usize) -> Result<()> {
    if pos > buf_len || pos + len > buf_len {
        Err(OtError::OutOfRange(Span { pos, len }))
    } else {
        Ok(())
    }
}

/// A minimal `String`-backed buffer. Useful for tests and small embeddings;
/// production use wants a rope (see [`RopeBuffer`] under `rope-buffer`).
#[derive(Debug, Clone, Default)]
pub struct StringBuffer {
    content: String,
}

impl StringBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_str(s: &str) -> Self {
        Self { content: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }

    fn char_byte_range(&self, pos: usize, len: usize) -> (usize, usize) {
        let mut iter = self.content.char_indices();
        let start = iter.by_ref().nth(pos).map(|(i, _)| i).unwrap_or(self.content.len());
        let end = iter.nth(len.saturating_sub(1)).map(|(i, c)| i + c.len_utf8()).unwrap_or(self.content.len());
        (start, end)
    }
}

impl Buffer for StringBuffer {
    fn length(&self) -> usize {
        self.content.chars().count()
    }

    fn apply_insert(&mut self, pos: usize, payload: &TextChunk) -> Result<()> {
        check_bounds(pos, 0, self.length())?;
        let (byte_pos, _) = self.char_byte_range(pos, 0);
        self.content.insert_str(byte_pos, &payload.to_plain_string());
        Ok(())
    }

    fn apply_delete(&mut self, pos: usize, len: usize) -> Result<TextChunk> {
        check_bounds(pos, len, self.length())?;
        let (start, end) = self.char_byte_range(pos, len);
        let removed = self.content[start..end].to_string();
        self.content.replace_range(start..end, "");
        Ok(TextChunk::single(crate::id::UserId(0), removed))
    }

    fn extract(&self, pos: usize, len: usize) -> Result<TextChunk> {
        check_bounds(pos, len, self.length())?;
        let (start, end) = self.char_byte_range(pos, len);
        Ok(TextChunk::single(crate::id::UserId(0), self.content[start..end].to_string()))
    }
}

#[cfg(feature = "rope-buffer")]
pub use rope::RopeBuffer;

#[cfg(feature = "rope-buffer")]
mod rope {
    use super::*;
    use jumprope::JumpRope;

    /// A rope-backed [`Buffer`], mirroring how the teacher crate keeps its
    /// document content in a `JumpRope` rather than a flat `String` so large
    /// documents stay fast under many small edits.
    #[derive(Debug, Clone, Default)]
    pub struct RopeBuffer {
        rope: JumpRope,
    }

    impl RopeBuffer {
        pub fn new() -> Self {
            Self { rope: JumpRope::new() }
        }

        pub fn from_str(s: &str) -> Self {
            Self { rope: JumpRope::from(s) }
        }

        pub fn to_string(&self) -> String {
            self.rope.to_string()
        }
    }

    impl Buffer for RopeBuffer {
        fn length(&self) -> usize {
            self.rope.len_chars()
        }

        fn apply_insert(&mut self, pos: usize, payload: &TextChunk) -> Result<()> {
            check_bounds(pos, 0, self.length())?;
            self.rope.insert(pos, &payload.to_plain_string());
            Ok(())
        }

        fn apply_delete(&mut self, pos: usize, len: usize) -> Result<TextChunk> {
            check_bounds(pos, len, self.length())?;
            let removed: String = self.rope.slice_chars(pos..pos + len).collect();
            self.rope.remove(pos..pos + len);
            Ok(TextChunk::single(crate::id::UserId(0), removed))
        }

        fn extract(&self, pos: usize, len: usize) -> Result<TextChunk> {
            check_bounds(pos, len, self.length())?;
            let content: String = self.rope.slice_chars(pos..pos + len).collect();
            Ok(TextChunk::single(crate::id::UserId(0), content))
        }
    }
}
