//! Request (C3): the causally-timestamped, immutable unit of history.

use crate::id::UserId;
use crate::op::Operation;
use crate::vector::StateVector;

/// What role a request plays in its issuing user's undo/redo chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RequestKind {
    Do,
    Undo,
    Redo,
}

/// A `(user_id, vector, operation, kind)` tuple plus, for `Undo`/`Redo`, a
/// back-link into the issuing user's own log (spec §3). Requests are never
/// mutated after construction; a `RequestLog` only ever appends them.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub user_id: UserId,
    pub vector: StateVector,
    pub operation: Operation,
    pub kind: RequestKind,
    /// Offset, within `user_id`'s own log, of the request this one acts on.
    /// Always `Some` for `Undo`/`Redo`, always `None` for `Do` (spec §4.3:
    /// "that entry must not be a foreign request").
    pub target_index: Option<u32>,
}

impl Request {
    pub fn do_request(user_id: UserId, vector: StateVector, operation: Operation) -> Self {
        Self { user_id, vector, operation, kind: RequestKind::Do, target_index: None }
    }

    pub fn undo_request(user_id: UserId, vector: StateVector, operation: Operation, target_index: u32) -> Self {
        Self { user_id, vector, operation, kind: RequestKind::Undo, target_index: Some(target_index) }
    }

    pub fn redo_request(user_id: UserId, vector: StateVector, operation: Operation, target_index: u32) -> Self {
        Self { user_id, vector, operation, kind: RequestKind::Redo, target_index: Some(target_index) }
    }

    pub fn is_do(&self) -> bool {
        self.kind == RequestKind::Do
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::text::TextChunk;

    #[test]
    fn do_request_has_no_target() {
        let r = Request::do_request(
            UserId(1),
            StateVector::new(),
            Operation::Insert { pos: 0, payload: TextChunk::single(UserId(1), "a") },
        );
        assert!(r.is_do());
        assert_eq!(r.target_index, None);
    }

    #[test]
    fn undo_request_carries_target() {
        let r = Request::undo_request(UserId(1), StateVector::new(), Operation::NoOp, 3);
        assert_eq!(r.kind, RequestKind::Undo);
        assert_eq!(r.target_index, Some(3));
    }
}
