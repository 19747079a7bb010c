//! UndoGrouping (C6): consolidates consecutive same-direction local requests
//! into one atomic undo unit (spec §4.5).
//!
//! Thresholds (idle timeout, caret span, group size cap) are configurable
//! per spec §9 ("the source's constants... should be configurable options,
//! not hard-coded"), rather than burned in as the source's fixed constants.

use std::time::{Duration, Instant};

/// Tuning knobs for grouping (spec §9). Defaults approximate the source's
/// own constants: an idle gap around a second, and a caret jump of a
/// handful of characters, closes the current group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoGroupingConfig {
    pub idle_timeout: Duration,
    pub caret_span_threshold: usize,
    pub max_group_size: usize,
}

impl Default for UndoGroupingConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_millis(1000),
            caret_span_threshold: 8,
            max_group_size: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Do,
    Undo,
    Redo,
}

struct OpenGroup {
    direction: Direction,
    offsets: Vec<u32>,
    anchor: usize,
    last_activity: Instant,
}

/// Per-session undo/redo bookkeeping. Only `Do`-direction groups hold
/// content that can actually be inverted; `Undo`/`Redo` directions exist so
/// a run of same-direction local Do requests issued back to back (normal
/// typing) closes into one undoable unit instead of one entry per
/// keystroke.
pub struct UndoGrouping {
    config: UndoGroupingConfig,
    open: Option<OpenGroup>,
    undo_stack: Vec<Vec<u32>>,
    redo_stack: Vec<Vec<u32>>,
}

impl UndoGrouping {
    pub fn new(config: UndoGroupingConfig) -> Self {
        Self { config, open: None, undo_stack: Vec::new(), redo_stack: Vec::new() }
    }

    fn close_open(&mut self) -> Option<Vec<u32>> {
        let group = self.open.take()?;
        match group.direction {
            Direction::Do => {
                self.redo_stack.clear();
                self.undo_stack.push(group.offsets.clone());
            }
            Direction::Undo => self.redo_stack.push(group.offsets.clone()),
            Direction::Redo => self.undo_stack.push(group.offsets.clone()),
        }
        Some(group.offsets)
    }

    /// A local Do request was just appended at `offset`, touching the
    /// buffer around `caret`. Extends the open Do-group when it's a
    /// contiguous continuation of the same user's typing, otherwise closes
    /// whatever was open and starts a fresh group.
    pub fn on_local_do(&mut self, offset: u32, caret: usize) {
        let now = Instant::now();
        let continues = match &self.open {
            Some(g) if g.direction == Direction::Do => {
                g.offsets.len() < self.config.max_group_size
                    && now.duration_since(g.last_activity) <= self.config.idle_timeout
                    && caret.abs_diff(g.anchor) <= self.config.caret_span_threshold
            }
            _ => false,
        };
        if continues {
            let g = self.open.as_mut().unwrap();
            g.offsets.push(offset);
            g.anchor = caret;
            g.last_activity = now;
        } else {
            self.close_open();
            self.redo_stack.clear();
            self.open = Some(OpenGroup { direction: Direction::Do, offsets: vec![offset], anchor: caret, last_activity: now });
        }
    }

    /// A remote request interleaved the active user's stream: always closes
    /// whatever group is open (spec §4.5).
    pub fn on_remote_activity(&mut self) {
        self.close_open();
    }

    /// Flushes any pending group and pops the next one to undo, pushing it
    /// onto the redo stack.
    pub fn take_undo_group(&mut self) -> Option<Vec<u32>> {
        if matches!(&self.open, Some(g) if g.direction == Direction::Do) {
            self.close_open();
        }
        let group = self.undo_stack.pop()?;
        self.redo_stack.push(group.clone());
        Some(group)
    }

    /// Pops the next group to redo, pushing it back onto the undo stack.
    pub fn take_redo_group(&mut self) -> Option<Vec<u32>> {
        let group = self.redo_stack.pop()?;
        self.undo_stack.push(group.clone());
        Some(group)
    }
}
