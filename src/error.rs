//! Error taxonomy for the adoPTed OT core (spec §7).
//!
//! Every fallible core operation returns [`OtError`]. Callers distinguish
//! recoverable errors (drop the offending request, keep the session alive)
//! from session-fatal ones (the session moves to [`crate::algorithm::SessionState::Diverged`]
//! and refuses further requests) using [`OtError::is_fatal`].

use crate::id::UserId;
use crate::vector::StateVector;

pub type Result<T> = std::result::Result<T, OtError>;

/// A named component length, used when an operation would step outside the
/// bounds of the buffer it's applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub pos: usize,
    pub len: usize,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum OtError {
    /// State vector failed to parse, or an update would decrease a component.
    #[error("malformed state vector: {0}")]
    BadVector(String),

    /// A remote request's vector is incompatible with what the log already
    /// knows about its author (a gap, or a component going backwards).
    #[error("causality violation: user {user} sent vector {vector:?} but log expects sequential growth")]
    CausalityViolation { user: UserId, vector: StateVector },

    /// Applying an operation would step outside the buffer's current bounds.
    /// This usually means two sites have already diverged.
    #[error("operation out of range: pos {0:?}", .0)]
    OutOfRange(Span),

    /// The wire form named an element this core doesn't understand.
    #[error("unknown operation element: {0}")]
    UnknownOperation(String),

    /// Tried to invert an operation that doesn't carry enough information
    /// to be inverted (a non-reversible delete).
    #[error("operation is not reversible")]
    Irreversible,

    /// A translation needed a log entry that cleanup has already discarded.
    /// The peer that sent this request is too far behind to catch up.
    #[error("log entry for user {user} at offset {offset} was already cleaned up")]
    LogGap { user: UserId, offset: u32 },

    /// IT could not resolve a concurrency id from local information and the
    /// fallback ordering still produced an inconsistent result. This should
    /// never happen between conformant peers; treat it as a bug report.
    #[error("could not determine a concurrency id to resolve a transform ambiguity")]
    ConcurrencyAmbiguous,
}

impl OtError {
    /// Per spec §7: `OutOfRange`, `LogGap`, and `ConcurrencyAmbiguous` are
    /// session-fatal. `BadVector` and `UnknownOperation` are recoverable at
    /// the transport level (log and drop the offending request).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            OtError::OutOfRange(_) | OtError::LogGap { .. } | OtError::ConcurrencyAmbiguous
        )
    }
}
