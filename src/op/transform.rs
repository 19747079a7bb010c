//! The adoPTed inclusion transformation IT (spec §4.2). `Operation::transform`
//! is the exhaustive case analysis the spec's design notes (§9) ask for in
//! place of the original's runtime-polymorphic dispatch.
//!
//! Required identities (spec §4.2, tested in `tests/properties.rs`):
//! - TP1 (parallel): `IT(a, IT(b,a,c)) = IT(b, IT(a,b,c))` with matching cid.
//! - TP2 (serialization): `ET(IT(a,b), b) = a`.
//! - `IT(NoOp, x) = NoOp`; `IT(x, NoOp) = x`.

use super::text::TextChunk;
use super::Operation;
use crate::error::Result;
use crate::id::UserId;

/// Resolves a same-position insert/insert tie (spec §4.2's concurrency id).
/// `Mine` means the operation being transformed keeps its position ("stays
/// left"); `Theirs` means it shifts past the other side's insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyWinner {
    Mine,
    Theirs,
}

/// The concurrency-id port (spec §6): `ask_concurrency(a, b)`. The default,
/// and only implementation needed for conformant peers, is the numerical
/// total order on user ids (spec §4.2: "any total order suffices provided
/// both sites agree"), matching scenario S1 (`user-id 1 < 2 so A's insert
/// wins the left position`).
pub fn ask_concurrency(mine: UserId, theirs: UserId) -> ConcurrencyWinner {
    if mine < theirs {
        ConcurrencyWinner::Mine
    } else {
        ConcurrencyWinner::Theirs
    }
}

fn make_delete(pos: usize, len: usize, payload: Option<TextChunk>) -> Operation {
    match payload {
        Some(payload) => Operation::ReversibleDelete { pos, payload },
        None => Operation::Delete { pos, len },
    }
}

/// Position and length of a deleted span, whichever delete variant it is.
fn delete_span(op: &Operation) -> Option<(usize, usize)> {
    match op {
        Operation::Delete { pos, len } => Some((*pos, *len)),
        Operation::ReversibleDelete { pos, payload } => Some((*pos, payload.len_chars())),
        _ => None,
    }
}

/// How a plain position slides across an applied operation. Shared by
/// `Move`'s from/to fields and by the Insert transform arms below.
fn shift_position(pos: usize, other: &Operation, winner: ConcurrencyWinner) -> usize {
    match other {
        Operation::Insert { pos: p2, payload } => {
            let n2 = payload.len_chars();
            if pos < *p2 {
                pos
            } else if pos > *p2 {
                pos + n2
            } else {
                // Tied exactly at the insert point: stay put only when this
                // side would also win an insert/insert tie there.
                match winner {
                    ConcurrencyWinner::Mine => pos,
                    ConcurrencyWinner::Theirs => pos + n2,
                }
            }
        }
        Operation::Move { .. } | Operation::NoOp => pos,
        Operation::Split(a, b) => shift_position(shift_position(pos, a, winner), b, winner),
        _ => match delete_span(other) {
            Some((p2, n2)) => {
                if pos <= p2 {
                    pos
                } else if pos >= p2 + n2 {
                    pos - n2
                } else {
                    p2
                }
            }
            None => pos,
        },
    }
}

fn transform_insert_against_delete(pos: usize, other: &Operation) -> usize {
    let (p2, n2) = delete_span(other).expect("transform_insert_against_delete requires a delete");
    if pos <= p2 {
        pos
    } else if pos >= p2 + n2 {
        pos - n2
    } else {
        p2
    }
}

fn transform_delete_against_insert(
    pos: usize,
    len: usize,
    payload: Option<&TextChunk>,
    ins_pos: usize,
    ins_len: usize,
) -> Operation {
    let (p1, n1, p2, n2) = (pos, len, ins_pos, ins_len);
    if p1 + n1 <= p2 {
        make_delete(p1, n1, payload.cloned())
    } else if p1 >= p2 {
        make_delete(p1 + n2, n1, payload.cloned())
    } else {
        let left_len = p2 - p1;
        let right_len = n1 - left_len;
        let (left_payload, right_payload) = match payload {
            Some(p) => {
                let (l, r) = p.split_at_char(left_len);
                (Some(l), Some(r))
            }
            None => (None, None),
        };
        Operation::split(
            make_delete(p1, left_len, left_payload),
            make_delete(p2 + n2, right_len, right_payload),
        )
    }
}

/// Delete-vs-delete never needs a `Split`: whichever portion of `self`'s
/// range was already removed by `other` closes up, and the remainder of
/// `self`'s range is always contiguous again once re-expressed in the frame
/// after `other` (its ends are brought together by the already-applied
/// delete). This resolves an open question left by spec §4.2's "classical
/// text-OT four-case split producing NoOp / Delete / Split" phrasing — see
/// DESIGN.md.
fn transform_delete_against_delete(
    pos: usize,
    len: usize,
    payload: Option<&TextChunk>,
    other_pos: usize,
    other_len: usize,
) -> Operation {
    let (p1, n1, p2, n2) = (pos, len, other_pos, other_len);
    if p1 + n1 <= p2 {
        make_delete(p1, n1, payload.cloned())
    } else if p1 >= p2 + n2 {
        make_delete(p1 - n2, n1, payload.cloned())
    } else {
        let overlap_start = p1.max(p2);
        let overlap_end = (p1 + n1).min(p2 + n2);
        let overlap_len = overlap_end.saturating_sub(overlap_start);
        let remaining = n1 - overlap_len;
        if remaining == 0 {
            return Operation::NoOp;
        }
        let new_pos = if p1 <= p2 { p1 } else { p2 };
        let new_payload = payload.map(|p| p.remove_range(overlap_start - p1, overlap_len));
        make_delete(new_pos, remaining, new_payload)
    }
}

impl Operation {
    /// True only when resolving this transform genuinely depends on a
    /// tie-break (spec §4.2): two inserts landing at the same position.
    /// Every other case is decidable from positions alone.
    pub fn need_concurrency_id(&self, other: &Operation) -> bool {
        matches!(
            (self, other),
            (Operation::Insert { pos: p1, .. }, Operation::Insert { pos: p2, .. }) if p1 == p2
        )
    }

    /// The inclusion transformation IT(self, other): expresses `self` so it
    /// can be applied after `other` has already been applied, preserving
    /// the combined intent of both (spec §4.2).
    pub fn transform(&self, other: &Operation, winner: ConcurrencyWinner) -> Result<Operation> {
        use Operation::*;

        if self.is_noop() {
            return Ok(NoOp);
        }
        if other.is_noop() {
            return Ok(self.clone());
        }
        if matches!(other, Move { .. }) {
            // A Move never changes buffer content, so it doesn't affect how
            // anything else transforms against it.
            return Ok(self.clone());
        }
        if let Move { user, from, to } = self {
            return Ok(Move {
                user: *user,
                from: shift_position(*from, other, winner),
                to: shift_position(*to, other, winner),
            });
        }

        match (self, other) {
            // Decompose `self` first: each half transforms independently
            // against `other`, since both halves of a `Split` already share
            // one common pre-`other` coordinate frame (spec §9 design note:
            // transform is not closed over the atomic variants alone).
            (Split(a, b), _) => {
                let a_t = a.transform(other, winner)?;
                let b_t = b.transform(other, winner)?;
                Ok(Operation::split(a_t, b_t))
            }

            // `other` is itself a split concurrent edit: fold `self` through
            // each half in turn, re-expressing the second half in the frame
            // left by the first before transforming against it.
            (_, Split(c, d)) => {
                let self_after_c = self.transform(c, winner)?;
                let d_after_c = d.transform(c, winner)?;
                self_after_c.transform(&d_after_c, winner)
            }

            (Insert { pos: p1, payload: pay1 }, Insert { pos: p2, payload: pay2 }) => {
                let n2 = pay2.len_chars();
                let new_pos = if p1 < p2 {
                    *p1
                } else if p1 > p2 {
                    p1 + n2
                } else {
                    match winner {
                        ConcurrencyWinner::Mine => *p1,
                        ConcurrencyWinner::Theirs => p1 + n2,
                    }
                };
                Ok(Insert { pos: new_pos, payload: pay1.clone() })
            }

            (Insert { pos, payload }, Delete { .. }) | (Insert { pos, payload }, ReversibleDelete { .. }) => {
                Ok(Insert { pos: transform_insert_against_delete(*pos, other), payload: payload.clone() })
            }

            (Delete { pos, len }, Insert { pos: ip, payload: ins }) => {
                Ok(transform_delete_against_insert(*pos, *len, None, *ip, ins.len_chars()))
            }
            (ReversibleDelete { pos, payload }, Insert { pos: ip, payload: ins }) => Ok(
                transform_delete_against_insert(*pos, payload.len_chars(), Some(payload), *ip, ins.len_chars()),
            ),

            (Delete { pos, len }, Delete { .. }) | (Delete { pos, len }, ReversibleDelete { .. }) => {
                let (op, ol) = delete_span(other).unwrap();
                Ok(transform_delete_against_delete(*pos, *len, None, op, ol))
            }
            (ReversibleDelete { pos, payload }, Delete { .. })
            | (ReversibleDelete { pos, payload }, ReversibleDelete { .. }) => {
                let (op, ol) = delete_span(other).unwrap();
                Ok(transform_delete_against_delete(*pos, payload.len_chars(), Some(payload), op, ol))
            }

            (NoOp, _) | (_, NoOp) | (_, Move { .. }) | (Move { .. }, _) => unreachable!("handled above"),
        }
    }
}
