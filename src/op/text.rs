//! Insert payload: an opaque sequence, specialized here to text with
//! per-segment author attribution (spec §3, SPEC_FULL §B).
//!
//! Stored as a run of `(author, text)` segments rather than a single string
//! plus a single author, because a `Split` (spec §4.2) can bisect an insert
//! whose halves originated from different authors once two inserts have been
//! merged by `transform`. Adjacent segments from the same author are kept
//! merged so the common case (one author, one contiguous insert) stays a
//! single-element run.

use smartstring::alias::String as SmartString;

use crate::id::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    pub author: UserId,
    pub text: SmartString,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextChunk {
    segments: Vec<Segment>,
}

impl TextChunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(author: UserId, text: impl Into<SmartString>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::default()
        } else {
            Self { segments: vec![Segment { author, text }] }
        }
    }

    pub fn len_chars(&self) -> usize {
        self.segments.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Renders the chunk's text content, dropping author attribution. Used
    /// by `Operation::apply` when handing content to a plain-text buffer.
    pub fn to_plain_string(&self) -> String {
        let mut s = String::with_capacity(self.len_chars());
        for seg in &self.segments {
            s.push_str(&seg.text);
        }
        s
    }

    /// Appends `other` to `self`, merging into the last segment when the
    /// author matches (keeps the common single-author case as one segment).
    pub fn push_chunk(&mut self, other: TextChunk) {
        for seg in other.segments {
            self.push_segment(seg.author, seg.text);
        }
    }

    pub fn push_segment(&mut self, author: UserId, text: SmartString) {
        if text.is_empty() {
            return;
        }
        if let Some(last) = self.segments.last_mut() {
            if last.author == author {
                last.text.push_str(&text);
                return;
            }
        }
        self.segments.push(Segment { author, text });
    }

    /// Splits at a character offset, returning `(before, after)`. Offset 0
    /// or `len_chars()` are valid and produce one empty half.
    pub fn split_at_char(&self, at: usize) -> (TextChunk, TextChunk) {
        debug_assert!(at <= self.len_chars());
        let mut before = TextChunk::new();
        let mut after = TextChunk::new();
        let mut consumed = 0usize;
        for seg in &self.segments {
            let seg_len = seg.text.chars().count();
            if consumed + seg_len <= at {
                before.push_segment(seg.author, seg.text.clone());
            } else if consumed >= at {
                after.push_segment(seg.author, seg.text.clone());
            } else {
                let local = at - consumed;
                let (l, r) = split_str_at_char(&seg.text, local);
                before.push_segment(seg.author, l);
                after.push_segment(seg.author, r);
            }
            consumed += seg_len;
        }
        (before, after)
    }

    /// Returns the sub-chunk covering `[start, start+len)` characters.
    pub fn slice(&self, start: usize, len: usize) -> TextChunk {
        let (_, rest) = self.split_at_char(start);
        let (middle, _) = rest.split_at_char(len);
        middle
    }

    /// Removes the `[start, start+len)` character range, splicing the
    /// remaining prefix and suffix back together. Used when a delete's
    /// range is partly superseded by a concurrent delete (spec §4.2,
    /// delete-vs-delete transform).
    pub fn remove_range(&self, start: usize, len: usize) -> TextChunk {
        let (before, rest) = self.split_at_char(start);
        let (_, after) = rest.split_at_char(len);
        let mut result = before;
        result.push_chunk(after);
        result
    }
}

fn split_str_at_char(s: &str, at: usize) -> (SmartString, SmartString) {
    let byte_idx = s
        .char_indices()
        .nth(at)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (SmartString::from(&s[..byte_idx]), SmartString::from(&s[byte_idx..]))
}

impl From<&str> for TextChunk {
    fn from(s: &str) -> Self {
        TextChunk::single(UserId(0), s)
    }
}
