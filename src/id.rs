//! User identity. spec.md §3 defines user-id as "a positive integer"; we keep
//! it a thin newtype rather than a bare `u32` so state-vector keys, log
//! ownership, and concurrency-id tie-breaks can't be confused with plain
//! counts at the type level.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserId(pub u32);

impl UserId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for UserId {
    fn from(v: u32) -> Self {
        UserId(v)
    }
}
