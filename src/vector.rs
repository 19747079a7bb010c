//! StateVector (C1): a mapping from user-id to a monotonic per-user request
//! count, and the causality lattice it induces. See spec §3, §4.1.

use std::cmp::Ordering as StdOrdering;
use std::fmt;

use crate::error::{OtError, Result};
use crate::id::UserId;

/// The result of comparing two state vectors: they may be strictly ordered,
/// equal, or incomparable (`Concurrent`), per spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOrdering {
    Less,
    Equal,
    Greater,
    Concurrent,
}

/// A mapping from user-id to a non-negative component count. Missing keys
/// are implicitly zero. Kept as a sorted `Vec` rather than a `HashMap`:
/// sessions rarely have more than a handful of participants, the canonical
/// serialization needs ascending order anyway (spec §3), and `join`/`compare`
/// are simple merges over two sorted slices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateVector {
    components: Vec<(UserId, u32)>,
}

impl StateVector {
    pub fn new() -> Self {
        Self { components: Vec::new() }
    }

    fn find(&self, user: UserId) -> std::result::Result<usize, usize> {
        self.components.binary_search_by_key(&user, |&(u, _)| u)
    }

    /// Missing keys mean zero (spec §3).
    pub fn get(&self, user: UserId) -> u32 {
        match self.find(user) {
            Ok(idx) => self.components[idx].1,
            Err(_) => 0,
        }
    }

    pub fn set(&mut self, user: UserId, n: u32) {
        match self.find(user) {
            Ok(idx) => {
                if n == 0 {
                    self.components.remove(idx);
                } else {
                    self.components[idx].1 = n;
                }
            }
            Err(idx) => {
                if n != 0 {
                    self.components.insert(idx, (user, n));
                }
            }
        }
    }

    /// Increments a user's component by `delta`, checking for overflow.
    /// `delta` is unsigned: state vectors only ever grow (spec §3: "missing
    /// keys mean zero"; a vector never shrinks a live component).
    pub fn add(&mut self, user: UserId, delta: u32) -> Result<()> {
        let cur = self.get(user);
        let next = cur
            .checked_add(delta)
            .ok_or_else(|| OtError::BadVector(format!("component overflow for user {user}")))?;
        self.set(user, next);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (UserId, u32)> + '_ {
        self.components.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Independent copy, per spec §3 ("a copy yields an independent value").
    /// `Clone` already does this; kept as a named method because the spec
    /// calls out `copy` as a first-class operation used throughout §4.4.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// `u <= v` iff every component of `u` is `<=` the same component of `v`.
    pub fn le(&self, other: &Self) -> bool {
        self.components.iter().all(|&(u, n)| n <= other.get(u))
    }

    /// `causally_before(u, v)` iff `u <= v && u != v` (spec §3).
    pub fn causally_before(&self, other: &Self) -> bool {
        self.le(other) && self != other
    }

    pub fn compare(&self, other: &Self) -> VectorOrdering {
        if self == other {
            VectorOrdering::Equal
        } else if self.le(other) {
            VectorOrdering::Less
        } else if other.le(self) {
            VectorOrdering::Greater
        } else {
            VectorOrdering::Concurrent
        }
    }

    /// Componentwise maximum (spec §3).
    pub fn join(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for (user, n) in other.iter() {
            let cur = result.get(user);
            if n > cur {
                result.set(user, n);
            }
        }
        result
    }

    /// Componentwise minimum, used by cleanup (spec §4.4) to find the meet of
    /// every peer's current vector. Not named in §4.1's operation list but
    /// follows directly from `join`'s dual.
    pub fn meet(&self, other: &Self) -> Self {
        let mut result = StateVector::new();
        for (user, n) in self.iter() {
            let m = n.min(other.get(user));
            if m > 0 {
                result.set(user, m);
            }
        }
        result
    }

    /// Canonical serialization: `u1:c1;u2:c2;...` in ascending user-id order
    /// (spec §3, §6). `components` is already kept sorted, so this is a
    /// direct fold.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for (i, (user, n)) in self.components.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            out.push_str(&format!("{}:{}", user.0, n));
        }
        out
    }

    pub fn parse(s: &str) -> Result<Self> {
        let mut sv = StateVector::new();
        let mut last_user: Option<UserId> = None;
        if s.is_empty() {
            return Ok(sv);
        }
        for part in s.split(';') {
            let (u, c) = part
                .split_once(':')
                .ok_or_else(|| OtError::BadVector(format!("missing ':' in component {part:?}")))?;
            let user: u32 = u
                .parse()
                .map_err(|_| OtError::BadVector(format!("non-numeric user id {u:?}")))?;
            let count: u32 = c
                .parse()
                .map_err(|_| OtError::BadVector(format!("non-numeric count {c:?}")))?;
            let user = UserId(user);
            if let Some(last) = last_user {
                if user <= last {
                    return Err(OtError::BadVector(format!(
                        "components out of order or duplicated: {user} after {last}"
                    )));
                }
            }
            last_user = Some(user);
            sv.components.push((user, count));
        }
        Ok(sv)
    }
}

impl fmt::Display for StateVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// `compare` returning `StdOrdering` is occasionally convenient (e.g. sorting
/// requests by a total order for diagnostics); only meaningful when the two
/// vectors are actually comparable.
impl StateVector {
    pub fn partial_cmp_total(&self, other: &Self) -> Option<StdOrdering> {
        match self.compare(other) {
            VectorOrdering::Less => Some(StdOrdering::Less),
            VectorOrdering::Equal => Some(StdOrdering::Equal),
            VectorOrdering::Greater => Some(StdOrdering::Greater),
            VectorOrdering::Concurrent => None,
        }
    }
}
