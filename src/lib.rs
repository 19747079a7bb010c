//! An adoPTed-style operational transformation core for real-time
//! collaborative text editing.
//!
//! This crate is the OT engine only: state vectors, the operation algebra,
//! per-user request logs, the translation algorithm, undo/redo grouping,
//! and session replay. Transport, authentication, persistence, and UI are
//! out of scope — this crate exposes the ports those collaborators sit
//! behind (the [`buffer`] trait, the [`wire`] codec, [`algorithm::SessionObserver`]).
//!
//! Start at [`algorithm::Algorithm`]: one instance per local session, generic
//! over a [`buffer::Buffer`] implementation.

pub mod algorithm;
pub mod buffer;
pub mod error;
pub mod id;
pub mod log;
pub mod op;
pub mod request;
pub mod session_record;
pub mod stats;
pub mod undo;
pub mod vector;
pub mod wire;

pub use algorithm::Algorithm;
pub use error::{OtError, Result};
pub use id::UserId;
pub use op::Operation;
pub use request::{Request, RequestKind};
pub use session_record::SessionRecord;
pub use vector::StateVector;
