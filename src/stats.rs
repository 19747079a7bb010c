//! Translation memo counters, kept behind the `stats` feature like the
//! teacher crate's own cache-hit bookkeeping.

#[cfg(feature = "stats")]
use std::cell::RefCell;

#[cfg(feature = "stats")]
thread_local! {
    static MEMO_HITS: RefCell<usize> = RefCell::default();
    static MEMO_MISSES: RefCell<usize> = RefCell::default();
    static SPLITS_PRODUCED: RefCell<usize> = RefCell::default();
}

pub(crate) fn memo_hit() {
    #[cfg(feature = "stats")]
    {
        let old = MEMO_HITS.take();
        MEMO_HITS.set(old + 1);
    }
}

pub(crate) fn memo_miss() {
    #[cfg(feature = "stats")]
    {
        let old = MEMO_MISSES.take();
        MEMO_MISSES.set(old + 1);
    }
}

pub(crate) fn split_produced() {
    #[cfg(feature = "stats")]
    {
        let old = SPLITS_PRODUCED.take();
        SPLITS_PRODUCED.set(old + 1);
    }
}

/// Returns `(memo hits, memo misses, splits produced)`, resetting the
/// counters. Always `(0, 0, 0)` when the `stats` feature is off.
pub fn take_stats() -> (usize, usize, usize) {
    #[cfg(feature = "stats")]
    {
        (MEMO_HITS.take(), MEMO_MISSES.take(), SPLITS_PRODUCED.take())
    }

    #[cfg(not(feature = "stats"))]
    {
        (0, 0, 0)
    }
}
