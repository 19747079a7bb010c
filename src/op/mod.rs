//! Operation (C2): the polymorphic edit primitive. Modeled as a closed sum
//! type rather than a class hierarchy (spec §9 design note) so `transform`
//! is an exhaustive match instead of runtime dispatch.

pub mod text;
pub mod transform;

use crate::buffer::Buffer;
use crate::error::{OtError, Result};
use crate::id::UserId;
use text::TextChunk;

pub use transform::ConcurrencyWinner;

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert { pos: usize, payload: TextChunk },
    /// Non-reversible: carries no prior content, so it cannot be inverted.
    Delete { pos: usize, len: usize },
    /// Carries the content it removed, so it can be inverted back into an
    /// `Insert` (spec §3, §4.2).
    ReversibleDelete { pos: usize, payload: TextChunk },
    Move { user: UserId, from: usize, to: usize },
    NoOp,
    /// An ordered pair of operations applied as a unit. Produced by
    /// `transform` when a delete is bisected by a concurrent insert (spec
    /// §4.2); transform is not closed over the other four variants alone.
    Split(Box<Operation>, Box<Operation>),
}

impl Operation {
    pub fn noop() -> Self {
        Operation::NoOp
    }

    pub fn split(first: Operation, second: Operation) -> Self {
        if first.is_noop() {
            second
        } else if second.is_noop() {
            first
        } else {
            crate::stats::split_produced();
            Operation::Split(Box::new(first), Box::new(second))
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Operation::NoOp)
    }

    /// Affected span length in model units (spec §3). For `Split`, the sum
    /// of its parts, matching how `length_delta` composes.
    pub fn length(&self) -> usize {
        match self {
            Operation::Insert { payload, .. } => payload.len_chars(),
            Operation::Delete { len, .. } => *len,
            Operation::ReversibleDelete { payload, .. } => payload.len_chars(),
            Operation::Move { .. } => 0,
            Operation::NoOp => 0,
            Operation::Split(a, b) => a.length() + b.length(),
        }
    }

    /// Net change in buffer length this operation would cause when applied,
    /// e.g. `+len` for an insert, `-len` for a delete. Used by `transform`
    /// to slide positions of operations that land after this one.
    pub(crate) fn length_delta(&self) -> isize {
        match self {
            Operation::Insert { payload, .. } => payload.len_chars() as isize,
            Operation::Delete { len, .. } => -(*len as isize),
            Operation::ReversibleDelete { payload, .. } => -(payload.len_chars() as isize),
            Operation::Move { .. } | Operation::NoOp => 0,
            Operation::Split(a, b) => a.length_delta() + b.length_delta(),
        }
    }

    /// The position a `Split` component starts at, when it has one. Used to
    /// pick a safe execution order for split applies (see `apply`).
    fn start_pos(&self) -> Option<usize> {
        match self {
            Operation::Insert { pos, .. }
            | Operation::Delete { pos, .. }
            | Operation::ReversibleDelete { pos, .. } => Some(*pos),
            Operation::Move { from, .. } => Some(*from),
            Operation::NoOp => None,
            Operation::Split(a, b) => a.start_pos().or_else(|| b.start_pos()),
        }
    }

    /// Applies this operation to `buffer`. Per spec §3, `apply` is defined
    /// for every variant; `Move` only updates caret state the buffer itself
    /// doesn't model here (out of scope per spec §1 — the buffer port is a
    /// text document, not a cursor registry) so it's a no-op against the
    /// buffer port itself.
    ///
    /// Every leaf of a `Split` tree is expressed as a position in the *same*
    /// pre-split buffer state (see `transform`'s bisected-delete case), so
    /// applying leaves in their stored, left-to-right order would shift a
    /// later leaf's target out from under it as soon as an earlier one
    /// changes the buffer's length. Flattening the tree and applying leaves
    /// in descending-position order keeps every still-to-run leaf's stored
    /// position valid, regardless of how the tree nests.
    pub fn apply(&self, buffer: &mut dyn Buffer) -> Result<()> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves.sort_by_key(|op| std::cmp::Reverse(op.start_pos().unwrap_or(0)));
        for leaf in leaves {
            leaf.apply_leaf(buffer)?;
        }
        Ok(())
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Operation>) {
        match self {
            Operation::Split(a, b) => {
                a.collect_leaves(out);
                b.collect_leaves(out);
            }
            other => out.push(other),
        }
    }

    fn apply_leaf(&self, buffer: &mut dyn Buffer) -> Result<()> {
        match self {
            Operation::Insert { pos, payload } => buffer.apply_insert(*pos, payload),
            Operation::Delete { pos, len } => buffer.apply_delete(*pos, *len).map(|_| ()),
            Operation::ReversibleDelete { pos, payload } => {
                let removed = buffer.apply_delete(*pos, payload.len_chars())?;
                debug_assert_eq!(removed.len_chars(), payload.len_chars());
                Ok(())
            }
            Operation::Move { .. } => Ok(()),
            Operation::NoOp => Ok(()),
            Operation::Split(..) => unreachable!("collect_leaves never yields a Split"),
        }
    }

    /// Promotes a non-reversible `Delete` into a `ReversibleDelete` by
    /// reading the content it's about to remove from `buffer` (spec §3
    /// `make_reversible`). Applied to the other variants it's the identity.
    pub fn make_reversible(&self, buffer: &dyn Buffer) -> Result<Operation> {
        match self {
            Operation::Delete { pos, len } => {
                let payload = buffer.extract(*pos, *len)?;
                Ok(Operation::ReversibleDelete { pos: *pos, payload })
            }
            Operation::Split(a, b) => {
                let a = a.make_reversible(buffer)?;
                // `b`'s position is already expressed in the frame after `a`
                // would be applied, so extracting from the same snapshot of
                // `buffer` needs `b`'s *pre-a* position. Since `a` hasn't
                // actually been applied yet at this point, `b`'s position as
                // stored is already correct against `buffer`.
                let b = b.make_reversible(buffer)?;
                Ok(Operation::split(a, b))
            }
            other => Ok(other.clone()),
        }
    }

    /// Inverts a reversible operation (spec §3, §4.2:
    /// `apply(invert(op)) . apply(op) = identity`). `Insert` is reversible
    /// on its own (it already carries its content); a bare `Delete` is not.
    pub fn invert(&self) -> Result<Operation> {
        match self {
            Operation::Insert { pos, payload } => Ok(Operation::ReversibleDelete {
                pos: *pos,
                payload: payload.clone(),
            }),
            Operation::ReversibleDelete { pos, payload } => Ok(Operation::Insert {
                pos: *pos,
                payload: payload.clone(),
            }),
            Operation::Delete { .. } => Err(OtError::Irreversible),
            Operation::Move { user, from, to } => Ok(Operation::Move {
                user: *user,
                from: *to,
                to: *from,
            }),
            Operation::NoOp => Ok(Operation::NoOp),
            // Applied as a unit in order (first, second); undoing requires
            // reversing both the order and each half.
            Operation::Split(a, b) => {
                let a_inv = a.invert()?;
                let b_inv = b.invert()?;
                Ok(Operation::split(b_inv, a_inv))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StringBuffer;

    #[test]
    fn insert_then_invert_is_identity() {
        let mut buf = StringBuffer::from_str("hello");
        let op = Operation::Insert { pos: 2, payload: TextChunk::single(UserId(1), "X") };
        op.apply(&mut buf).unwrap();
        assert_eq!(buf.as_str(), "heXllo");
        op.invert().unwrap().apply(&mut buf).unwrap();
        assert_eq!(buf.as_str(), "hello");
    }

    #[test]
    fn delete_must_be_made_reversible_before_it_can_be_inverted() {
        let mut buf = StringBuffer::from_str("hello");
        let op = Operation::Delete { pos: 1, len: 3 };
        assert!(op.invert().is_err());
        let reversible = op.make_reversible(&buf).unwrap();
        reversible.apply(&mut buf).unwrap();
        assert_eq!(buf.as_str(), "ho");
        reversible.invert().unwrap().apply(&mut buf).unwrap();
        assert_eq!(buf.as_str(), "hello");
    }
}
