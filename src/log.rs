//! RequestLog (C4): one user's append-only request history, with O(1)
//! offset lookup, back-link validation for Undo/Redo, and a translation memo
//! (spec §4.3, §9 "memoized translations").
//!
//! Back-links are `(log offset)` integers rather than references between
//! request objects (spec §9: "log back-links as integer indices into an
//! arena"), which keeps `RequestLog` free of internal ownership cycles and
//! lets `cleanup` drop old entries without invalidating anything still
//! reachable.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{OtError, Result};
use crate::id::UserId;
use crate::op::Operation;
use crate::request::Request;
use crate::vector::StateVector;
use crate::stats;

struct LogEntry {
    /// The request exactly as issued: original vector, original operation.
    request: Request,
    /// The operation as it was actually applied to the buffer, i.e.
    /// `request.operation` transformed forward to the vector in effect at
    /// application time.
    applied: Operation,
}

/// Per-user append-only request history, beginning at some absolute offset
/// `begin` (advanced by `cleanup`). Offsets are absolute across the log's
/// lifetime; `begin` only ever grows.
pub struct RequestLog {
    owner: UserId,
    begin: u32,
    entries: Vec<LogEntry>,
    memo: HashMap<(u32, u64), Operation>,
}

fn digest(vector: &StateVector) -> u64 {
    let mut hasher = DefaultHasher::new();
    vector.serialize().hash(&mut hasher);
    hasher.finish()
}

impl RequestLog {
    pub fn new(owner: UserId) -> Self {
        Self { owner, begin: 0, entries: Vec::new(), memo: HashMap::new() }
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn begin(&self) -> u32 {
        self.begin
    }

    /// The owner's next vector component: the offset that a freshly
    /// appended request must declare (spec §4.3 invariant 1).
    pub fn next_offset(&self) -> u32 {
        self.begin + self.entries.len() as u32
    }

    fn index_of(&self, offset: u32) -> Result<usize> {
        if offset < self.begin {
            return Err(OtError::LogGap { user: self.owner, offset });
        }
        let idx = (offset - self.begin) as usize;
        if idx >= self.entries.len() {
            return Err(OtError::LogGap { user: self.owner, offset });
        }
        Ok(idx)
    }

    /// Fetches the request issued at absolute offset `offset` (spec §4.3
    /// `get`). `ErrLogGap` if the entry was cleaned up or doesn't exist yet.
    pub fn get(&self, offset: u32) -> Result<&Request> {
        self.index_of(offset).map(|idx| &self.entries[idx].request)
    }

    pub fn get_applied(&self, offset: u32) -> Result<&Operation> {
        self.index_of(offset).map(|idx| &self.entries[idx].applied)
    }

    /// Appends `request` (already known to have been applied as `applied`).
    /// Validates invariant 1 (vector component matches the next offset) and,
    /// for Undo/Redo, that the back-link target is live and owned by the
    /// same user (spec §4.3 invariant 2).
    pub fn append(&mut self, request: Request, applied: Operation) -> Result<()> {
        if request.user_id != self.owner {
            return Err(OtError::UnknownOperation(format!(
                "request for user {} appended to log owned by {}",
                request.user_id, self.owner
            )));
        }
        let expected = self.next_offset();
        if request.vector.get(self.owner) != expected {
            return Err(OtError::BadVector(format!(
                "request declares {} {} requests issued, log expects {}",
                self.owner,
                request.vector.get(self.owner),
                expected
            )));
        }
        if !request.is_do() {
            let target = request
                .target_index
                .ok_or_else(|| OtError::BadVector("undo/redo request missing target_index".into()))?;
            // Must resolve inside the still-live window; a target that's
            // already been cleaned up or never existed is a bug upstream.
            self.index_of(target)?;
        }

        let offset = expected;
        self.entries.push(LogEntry { request, applied });
        self.invalidate_from(offset);
        Ok(())
    }

    /// Drops every memo entry for offset `>= from`. Called after `append`
    /// (a no-op there, since nothing could reference the brand-new offset
    /// yet) and after `cleanup` (where it matters: offsets below the new
    /// `begin` must never be served stale).
    fn invalidate_from(&mut self, from: u32) {
        self.memo.retain(|&(offset, _), _| offset < from);
    }

    pub fn memo_get(&self, offset: u32, target: &StateVector) -> Option<Operation> {
        let found = self.memo.get(&(offset, digest(target))).cloned();
        if found.is_some() {
            stats::memo_hit();
        } else {
            stats::memo_miss();
        }
        found
    }

    pub fn memo_put(&mut self, offset: u32, target: &StateVector, op: Operation) {
        self.memo.insert((offset, digest(target)), op);
    }

    /// Follows back-links from `offset` until it reaches a `Do` (spec §4.3
    /// `lookup_associated_do`).
    pub fn lookup_associated_do(&self, offset: u32) -> Result<&Request> {
        let mut cur = self.get(offset)?;
        while !cur.is_do() {
            let target = cur
                .target_index
                .expect("non-Do request always carries a target_index (checked on append)");
            cur = self.get(target)?;
        }
        Ok(cur)
    }

    /// One hop up the back-link chain from `offset` (the request it targets,
    /// if any).
    pub fn upper_related(&self, offset: u32) -> Result<Option<&Request>> {
        let cur = self.get(offset)?;
        match cur.target_index {
            Some(target) => Ok(Some(self.get(target)?)),
            None => Ok(None),
        }
    }

    /// One hop down the back-link chain: the earliest still-live request
    /// that targets `offset`, i.e. the entry immediately after it in the
    /// same Undo/Redo chain.
    pub fn next_associated(&self, offset: u32) -> Option<&Request> {
        let start = offset.saturating_sub(self.begin) as usize + 1;
        self.entries
            .get(start..)
            .into_iter()
            .flatten()
            .find(|e| e.request.target_index == Some(offset))
            .map(|e| &e.request)
    }

    /// Removes every entry whose vector is causally before (or equal to)
    /// `min_v`, stopping short of any offset a still-live entry's back-link
    /// depends on (spec §4.4 cleanup, §8 TP7 cleanup safety). Returns the
    /// number of entries removed.
    pub fn cleanup(&mut self, min_v: &StateVector) -> usize {
        let mut cutoff = 0usize;
        while cutoff < self.entries.len() && self.entries[cutoff].request.vector.le(min_v) {
            cutoff += 1;
        }
        if cutoff == 0 {
            return 0;
        }
        let boundary_offset = self.begin + cutoff as u32;
        let min_referenced = self.entries[cutoff..]
            .iter()
            .filter_map(|e| e.request.target_index)
            .filter(|&t| t < boundary_offset)
            .min();
        if let Some(referenced) = min_referenced {
            cutoff = cutoff.min((referenced - self.begin) as usize);
        }
        if cutoff == 0 {
            return 0;
        }
        self.entries.drain(0..cutoff);
        self.begin += cutoff as u32;
        self.invalidate_from(self.begin);
        cutoff
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::text::TextChunk;

    fn insert_request(owner: UserId, offset: u32, at: usize, text: &str) -> Request {
        let mut v = StateVector::new();
        v.set(owner, offset);
        Request::do_request(owner, v, Operation::Insert { pos: at, payload: TextChunk::single(owner, text) })
    }

    #[test]
    fn append_and_get_roundtrip() {
        let owner = UserId(1);
        let mut log = RequestLog::new(owner);
        let req = insert_request(owner, 0, 0, "a");
        log.append(req.clone(), req.operation.clone()).unwrap();
        assert_eq!(log.get(0).unwrap(), &req);
        assert_eq!(log.next_offset(), 1);
    }

    #[test]
    fn append_rejects_wrong_offset() {
        let owner = UserId(1);
        let mut log = RequestLog::new(owner);
        let mut v = StateVector::new();
        v.set(owner, 5);
        let req = Request::do_request(owner, v, Operation::NoOp);
        assert!(log.append(req.clone(), req.operation).is_err());
    }

    #[test]
    fn undo_chain_resolves_to_do() {
        let owner = UserId(1);
        let mut log = RequestLog::new(owner);
        let do_req = insert_request(owner, 0, 0, "a");
        log.append(do_req.clone(), do_req.operation.clone()).unwrap();

        let mut v = StateVector::new();
        v.set(owner, 1);
        let undo_req = Request::undo_request(owner, v, Operation::NoOp, 0);
        log.append(undo_req, Operation::NoOp).unwrap();

        assert_eq!(log.lookup_associated_do(1).unwrap(), &do_req);
        assert_eq!(log.next_associated(0).unwrap().target_index, Some(0));
    }

    #[test]
    fn cleanup_respects_live_back_links() {
        let owner = UserId(1);
        let mut log = RequestLog::new(owner);
        let do_req = insert_request(owner, 0, 0, "a");
        log.append(do_req.clone(), do_req.operation.clone()).unwrap();

        let mut v = StateVector::new();
        v.set(owner, 1);
        let far_later = insert_request(owner, 1, 0, "b");
        log.append(far_later, Operation::NoOp).unwrap();

        let mut min_v = StateVector::new();
        min_v.set(owner, 2);
        // Nothing references offset 0 from a surviving entry, so both are
        // eligible and get removed.
        let removed = log.cleanup(&min_v);
        assert_eq!(removed, 2);
        assert_eq!(log.begin(), 2);
    }

    #[test]
    fn cleanup_stops_before_referenced_entry() {
        let owner = UserId(1);
        let mut log = RequestLog::new(owner);
        let do_req = insert_request(owner, 0, 0, "a");
        log.append(do_req.clone(), do_req.operation.clone()).unwrap();

        let mut v1 = StateVector::new();
        v1.set(owner, 1);
        let filler = insert_request(owner, 1, 1, "b");
        log.append(filler, Operation::NoOp).unwrap();

        let mut v2 = StateVector::new();
        v2.set(owner, 2);
        let undo = Request::undo_request(owner, v2, Operation::NoOp, 0);
        log.append(undo, Operation::NoOp).unwrap();

        // min_v trails the undo at offset 2 (vector {1:2}), so that entry
        // is not yet eligible for cleanup; its back-link to offset 0 must
        // keep offset 0 alive too even though offset 0 alone would qualify.
        let mut min_v = StateVector::new();
        min_v.set(owner, 1);
        let removed = log.cleanup(&min_v);
        assert_eq!(removed, 0);
        assert_eq!(log.begin(), 0);
    }
}
