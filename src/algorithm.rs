//! Algorithm (C5): the site-wide OT controller (spec §4.4). Owns the
//! current state vector, the buffer, and every user's request log; applies
//! local edits, integrates remote requests by recursively translating them
//! to the local vector, and drives undo grouping and cleanup.

use std::collections::HashMap;

use crate::buffer::Buffer;
use crate::error::{OtError, Result};
use crate::id::UserId;
use crate::log::RequestLog;
use crate::op::transform::{ask_concurrency, ConcurrencyWinner};
use crate::op::Operation;
use crate::request::Request;
use crate::undo::{UndoGrouping, UndoGroupingConfig};
use crate::vector::StateVector;

/// Session lifecycle (spec §7). Once diverged, the session is a dead end:
/// every further call returns the error that caused the divergence.
pub enum SessionState {
    Active,
    Diverged(OtError),
}

/// Hooks for the events named in spec §6's session port. All have no-op
/// defaults; implement only the ones an embedder cares about.
pub trait SessionObserver {
    fn on_local_request(&mut self, _req: &Request) {}
    fn on_remote_applied(&mut self, _req: &Request) {}
    fn on_cleanup(&mut self, _up_to: &StateVector) {}
}

struct NoopObserver;
impl SessionObserver for NoopObserver {}

/// Finds a user, other than `exclude`, whose component in `target` exceeds
/// its component in `v` (translate's recursive case, spec §4.4). `exclude`
/// is always `r.user_id`: its own log offset equals `v[r.user_id]` exactly
/// (invariant 1), so treating it as a gap would fetch `r` against itself.
/// A remaining gap in `r.user_id`'s own component is `r`'s own later
/// history, handled separately by folding through its own log.
fn find_gap_user(v: &StateVector, target: &StateVector, exclude: UserId) -> Option<UserId> {
    target.iter().find(|&(u, n)| u != exclude && n > v.get(u)).map(|(u, _)| u)
}

pub struct Algorithm<B: Buffer> {
    local_user: UserId,
    current: StateVector,
    logs: HashMap<UserId, RequestLog>,
    buffer: B,
    undo: UndoGrouping,
    state: SessionState,
    observer: Box<dyn SessionObserver>,
    /// `(user, offset)` pairs in the order entries were actually applied at
    /// this site, across every user's log. Lets `rebase_to_current` fold an
    /// old request's effect forward to the present by walking real local
    /// history instead of recursing through `translate`'s cross-user case,
    /// which only handles targets that causally dominate the source vector.
    applied_order: Vec<(UserId, u32)>,
}

impl<B: Buffer> Algorithm<B> {
    pub fn new(local_user: UserId, buffer: B) -> Self {
        Self::with_config(local_user, buffer, UndoGroupingConfig::default())
    }

    pub fn with_config(local_user: UserId, buffer: B, undo_config: UndoGroupingConfig) -> Self {
        Self {
            local_user,
            current: StateVector::new(),
            logs: HashMap::new(),
            buffer,
            undo: UndoGrouping::new(undo_config),
            state: SessionState::Active,
            observer: Box::new(NoopObserver),
            applied_order: Vec::new(),
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn SessionObserver>) {
        self.observer = observer;
    }

    pub fn local_user(&self) -> UserId {
        self.local_user
    }

    pub fn current_vector(&self) -> &StateVector {
        &self.current
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn is_diverged(&self) -> bool {
        matches!(self.state, SessionState::Diverged(_))
    }

    fn ensure_active(&self) -> Result<()> {
        match &self.state {
            SessionState::Active => Ok(()),
            SessionState::Diverged(e) => Err(e.clone()),
        }
    }

    fn note_fatal<T>(&mut self, res: &Result<T>) {
        if let Err(e) = res {
            if e.is_fatal() && !self.is_diverged() {
                tracing::error!(error = %e, "session diverged");
                self.state = SessionState::Diverged(e.clone());
            }
        }
    }

    fn log(&self, user: UserId) -> Result<&RequestLog> {
        self.logs
            .get(&user)
            .ok_or_else(|| OtError::UnknownOperation(format!("no log for user {user}")))
    }

    fn log_mut(&mut self, user: UserId) -> Result<&mut RequestLog> {
        self.logs
            .get_mut(&user)
            .ok_or_else(|| OtError::UnknownOperation(format!("no log for user {user}")))
    }

    fn next_offset_for(&self, user: UserId) -> u32 {
        self.logs.get(&user).map(|l| l.next_offset()).unwrap_or(0)
    }

    fn append(&mut self, req: Request, applied: Operation) -> Result<()> {
        let user = req.user_id;
        let offset = req.vector.get(user);
        self.logs.entry(user).or_insert_with(|| RequestLog::new(user)).append(req, applied)?;
        self.applied_order.push((user, offset));
        Ok(())
    }

    /// Expresses the request at `(user, offset)` as it reads *now*, by
    /// folding its already-applied operation forward through every entry
    /// this site has applied since, in the real order it applied them.
    ///
    /// This is the mechanism behind undo/redo rebasing an old Do (or Undo)
    /// forward across intervening activity from any user, own or remote. It
    /// sidesteps the cross-user branch of `translate`, which assumes its
    /// target vector causally dominates the source request's vector — true
    /// for a freshly arriving remote request, not true in general for an old
    /// entry being rebased past history that itself already knows about
    /// still-older entries. TP1 (concurrent transforms commute) is what
    /// makes folding through real local order, rather than some canonical
    /// vector-driven order, still converge to the same result across sites.
    fn rebase_to_current(&self, user: UserId, offset: u32) -> Result<Operation> {
        let mut op = self.log(user)?.get_applied(offset)?.clone();
        let start = self
            .applied_order
            .iter()
            .position(|&(u, o)| u == user && o == offset)
            .ok_or(OtError::LogGap { user, offset })?;
        let hops = self.applied_order.len() - start - 1;
        for &(u2, o2) in &self.applied_order[start + 1..] {
            let mid = self.log(u2)?.get_applied(o2)?.clone();
            op = op.transform(&mid, ask_concurrency(user, u2))?;
        }
        tracing::debug!(user = %user, offset, hops, "rebased request to current vector");
        Ok(op)
    }

    /// Follows `r`'s back-link chain down to its originating `Do`, counting
    /// the number of Undo/Redo hops along the way. Each hop toggles whether
    /// the Do's effect must be inverted to recover `r`'s own effect (spec
    /// §4.4: "invert once per Undo/Redo parity along the chain").
    fn resolve_chain(&self, r: &Request) -> Result<(Request, u32)> {
        let mut cur = r.clone();
        let mut flips = 0u32;
        loop {
            if cur.is_do() {
                return Ok((cur, flips));
            }
            let target = cur
                .target_index
                .ok_or_else(|| OtError::BadVector("undo/redo request missing target_index".into()))?;
            cur = self.log(cur.user_id)?.get(target)?.clone();
            flips += 1;
        }
    }

    /// Recursively expresses `r.operation` at `target` (spec §4.4
    /// `translate`). Memoized per-request on the owning log, keyed by the
    /// target vector's digest (spec §9).
    fn translate(&mut self, r: &Request, target: &StateVector) -> Result<Operation> {
        tracing::trace!(user = %r.user_id, source = %r.vector.serialize(), target = %target.serialize(), "translate");
        // Translating an already-logged request to the live current vector
        // is the common undo/redo case, and the one `rebase_to_current`
        // handles directly via real local history — see its doc comment for
        // why the cross-user recursion below can't, in general, handle a
        // target this old. A request that hasn't been appended yet (a fresh
        // remote Do arriving in `on_remote`) has nothing to rebase from, so
        // that case still falls through to the recursive logic.
        if *target == self.current {
            let (do_req, flips) = self.resolve_chain(r)?;
            let offset = do_req.vector.get(do_req.user_id);
            let already_logged = self.log(do_req.user_id).map(|l| offset < l.next_offset()).unwrap_or(false);
            if already_logged {
                let mut op = self.rebase_to_current(do_req.user_id, offset)?;
                for _ in 0..flips {
                    op = op.invert()?;
                }
                return Ok(op);
            }
        }

        if !r.is_do() {
            let (do_req, flips) = self.resolve_chain(r)?;
            let mut op = self.translate(&do_req, target)?;
            for _ in 0..flips {
                op = op.invert()?;
            }
            return Ok(op);
        }

        if r.vector == *target {
            return Ok(r.operation.clone());
        }
        if !r.vector.le(target) {
            return Err(OtError::CausalityViolation { user: r.user_id, vector: r.vector.clone() });
        }

        let offset = r.vector.get(r.user_id);
        if let Ok(log) = self.log(r.user_id) {
            if let Some(cached) = log.memo_get(offset, target) {
                return Ok(cached);
            }
        }

        let result = match find_gap_user(&r.vector, target, r.user_id) {
            Some(u) => {
                let v_u = r.vector.get(u);
                let mid_req = self.log(u)?.get(v_u)?.clone();

                let mut reduced_target = target.clone();
                reduced_target.set(u, v_u);

                let op_r = self.translate(r, &reduced_target)?;
                let op_mid = self.translate(&mid_req, &r.vector.clone())?;

                let winner = ask_concurrency(r.user_id, u);
                if winner == ConcurrencyWinner::Theirs && r.operation.need_concurrency_id(&op_mid) {
                    tracing::warn!(user = %r.user_id, other = %u, "resolved insert/insert tie by fallback owner-id ordering");
                }
                op_r.transform(&op_mid, winner)?
            }
            // No other user's component differs: the only remaining gap is
            // r's own later history (e.g. rebasing an old Do forward for
            // undo). Fold through each later own-log entry's already
            //-applied operation directly; a user's own requests are
            // strictly sequential, never concurrent with each other, so no
            // further recursion or tie-break is needed.
            None => {
                let my = r.user_id;
                let mut op = r.operation.clone();
                for later_offset in (offset + 1)..target.get(my) {
                    let later_applied = self.log(my)?.get_applied(later_offset)?.clone();
                    op = op.transform(&later_applied, ConcurrencyWinner::Mine)?;
                }
                op
            }
        };

        if let Ok(log) = self.log_mut(r.user_id) {
            log.memo_put(offset, target, result.clone());
        }
        Ok(result)
    }

    /// Generates a local edit: wraps it into a Do request at the current
    /// vector, appends it, applies it, and advances `current` (spec §4.4
    /// "Generate local operation"). `caret_hint` feeds undo grouping's span
    /// threshold.
    pub fn submit_local(&mut self, op: Operation, caret_hint: usize) -> Result<Request> {
        self.ensure_active()?;
        let res = self.submit_local_impl(op, caret_hint);
        self.note_fatal(&res);
        res
    }

    fn submit_local_impl(&mut self, op: Operation, caret_hint: usize) -> Result<Request> {
        let op = op.make_reversible(&self.buffer)?;
        let req = Request::do_request(self.local_user, self.current.clone(), op.clone());
        self.append(req.clone(), op.clone())?;
        op.apply(&mut self.buffer)?;
        self.current.add(self.local_user, 1)?;
        self.undo.on_local_do(req.vector.get(self.local_user), caret_hint);
        self.observer.on_local_request(&req);
        Ok(req)
    }

    /// Integrates a remote request (spec §4.4 "Receive remote request").
    pub fn on_remote(&mut self, req: Request) -> Result<()> {
        self.ensure_active()?;
        let res = self.on_remote_impl(req);
        self.note_fatal(&res);
        res
    }

    fn on_remote_impl(&mut self, req: Request) -> Result<()> {
        let expected = self.next_offset_for(req.user_id);
        let declared = req.vector.get(req.user_id);
        if declared != expected {
            return Err(OtError::CausalityViolation { user: req.user_id, vector: req.vector.clone() });
        }
        let target = self.current.clone();
        let applied = self.translate(&req, &target)?;
        applied.apply(&mut self.buffer)?;
        self.append(req.clone(), applied)?;
        self.current.add(req.user_id, 1)?;
        self.undo.on_remote_activity();
        self.observer.on_remote_applied(&req);
        Ok(())
    }

    /// Undoes the most recent local group, composing the inverse of every
    /// Do it contains into one synthetic Undo request (spec §4.5). Returns
    /// `Ok(None)` when there's nothing left to undo.
    pub fn undo(&mut self) -> Result<Option<Request>> {
        self.ensure_active()?;
        let res = self.undo_impl();
        self.note_fatal(&res);
        res
    }

    fn undo_impl(&mut self) -> Result<Option<Request>> {
        let group = match self.undo.take_undo_group() {
            Some(g) => g,
            None => return Ok(None),
        };
        let local = self.local_user;
        let mut composed = Operation::NoOp;
        for &offset in &group {
            let do_req = self.log(local)?.get(offset)?.clone();
            let target = self.current.clone();
            let translated = self.translate(&do_req, &target)?;
            let inverted = translated.invert()?;
            composed = Operation::split(composed, inverted);
        }
        composed.apply(&mut self.buffer)?;
        let last_offset = *group.last().expect("take_undo_group never returns an empty group");
        let req = Request::undo_request(local, self.current.clone(), composed, last_offset);
        self.append(req.clone(), req.operation.clone())?;
        self.current.add(local, 1)?;
        self.observer.on_local_request(&req);
        Ok(Some(req))
    }

    /// Redoes the most recently undone group. Per spec §9's open-question
    /// resolution, targets the Undo request that still leads the chain for
    /// that group rather than reaching all the way back to the original
    /// Do, so a Redo interleaved with remote activity stays well-defined.
    pub fn redo(&mut self) -> Result<Option<Request>> {
        self.ensure_active()?;
        let res = self.redo_impl();
        self.note_fatal(&res);
        res
    }

    fn redo_impl(&mut self) -> Result<Option<Request>> {
        let group = match self.undo.take_redo_group() {
            Some(g) => g,
            None => return Ok(None),
        };
        let local = self.local_user;
        let last_offset = *group.last().expect("take_redo_group never returns an empty group");
        let undo_req = self
            .log(local)?
            .next_associated(last_offset)
            .cloned()
            .ok_or_else(|| OtError::BadVector(format!("no live undo to redo for offset {last_offset}")))?;
        let target = self.current.clone();
        let translated = self.translate(&undo_req, &target)?;
        let redone = translated.invert()?;
        redone.apply(&mut self.buffer)?;
        let undo_offset = undo_req.vector.get(local);
        let req = Request::redo_request(local, self.current.clone(), redone, undo_offset);
        self.append(req.clone(), req.operation.clone())?;
        self.current.add(local, 1)?;
        self.observer.on_local_request(&req);
        Ok(Some(req))
    }

    /// Trims every log to the meet of `peer_vectors` and the local vector
    /// (spec §4.4 cleanup). Returns the vector cleanup actually advanced to.
    pub fn cleanup(&mut self, peer_vectors: &[StateVector]) -> StateVector {
        let mut min_v = self.current.clone();
        for v in peer_vectors {
            min_v = min_v.meet(v);
        }
        let mut removed = 0usize;
        for log in self.logs.values_mut() {
            removed += log.cleanup(&min_v);
        }
        if removed > 0 {
            use humansize::{format_size, BINARY};
            let approx_bytes = format_size(removed * std::mem::size_of::<Operation>(), BINARY);
            tracing::info!(entries = removed, approx_bytes, up_to = %min_v.serialize(), "cleanup compacted request logs");
        }
        self.observer.on_cleanup(&min_v);
        min_v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::StringBuffer;
    use crate::op::text::TextChunk;

    fn insert(pos: usize, user: UserId, s: &str) -> Operation {
        Operation::Insert { pos, payload: TextChunk::single(user, s) }
    }

    #[test]
    fn s1_two_sites_converge_on_concurrent_inserts() {
        let mut a = Algorithm::new(UserId(1), StringBuffer::from_str("hello"));
        let mut b = Algorithm::new(UserId(2), StringBuffer::from_str("hello"));

        let req_a = a.submit_local(insert(2, UserId(1), "X"), 2).unwrap();
        let req_b = b.submit_local(insert(2, UserId(2), "Y"), 2).unwrap();

        a.on_remote(req_b).unwrap();
        b.on_remote(req_a).unwrap();

        assert_eq!(a.buffer().as_str(), "heXYllo");
        assert_eq!(a.buffer().as_str(), b.buffer().as_str());
        assert_eq!(a.current_vector(), b.current_vector());
    }

    #[test]
    fn s4_undo_across_remote_activity() {
        let mut a = Algorithm::new(UserId(1), StringBuffer::from_str(""));
        let mut b = Algorithm::new(UserId(2), StringBuffer::from_str(""));

        let h = a.submit_local(insert(0, UserId(1), "h"), 0).unwrap();
        b.on_remote(h.clone()).unwrap();

        let bang = b.submit_local(insert(1, UserId(2), "!"), 1).unwrap();
        a.on_remote(bang.clone()).unwrap();

        let i = a.submit_local(insert(1, UserId(1), "i"), 1).unwrap();
        b.on_remote(i.clone()).unwrap();

        let undo1 = a.undo().unwrap().unwrap();
        b.on_remote(undo1).unwrap();
        let undo2 = a.undo().unwrap().unwrap();
        b.on_remote(undo2).unwrap();

        assert_eq!(a.buffer().as_str(), "!");
        assert_eq!(a.buffer().as_str(), b.buffer().as_str());
        assert_eq!(a.current_vector().get(UserId(1)), 4);
        assert_eq!(a.current_vector().get(UserId(2)), 1);
        assert_eq!(a.current_vector(), b.current_vector());
    }

    #[test]
    fn causality_violation_on_vector_gap_is_recoverable() {
        // A component jump > 1 reports ErrCausalityViolation and refuses to
        // advance that peer's stream (spec §5), but is not one of the
        // session-fatal errors listed in spec §7 — the session itself stays
        // usable so a retransmission can still be integrated later.
        let mut a = Algorithm::new(UserId(1), StringBuffer::from_str("hi"));
        let mut v = StateVector::new();
        v.set(UserId(2), 5);
        let bogus = Request::do_request(UserId(2), v, Operation::NoOp);
        let err = a.on_remote(bogus).unwrap_err();
        assert!(matches!(err, OtError::CausalityViolation { .. }));
        assert!(!a.is_diverged());
    }
}
