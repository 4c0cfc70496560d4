use std::cell::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interaction {
    Keystroke,
    Click,
    Focus,
    /// The note content changed through user input.
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityTransition {
    BecameIdle,
    Woke,
}

/// Idle/awake state machine.
///
/// Pure bookkeeping: it never schedules anything itself. The engine feeds it
/// interactions and periodic checks, and routes the returned transitions.
pub struct ActivityTracker {
    idle_threshold_ms: i64,
    last_activity_at: Cell<i64>,
    last_edit_at: Cell<Option<i64>>,
    idle: Cell<bool>,
}

impl ActivityTracker {
    pub fn new(idle_threshold_ms: u32, now: i64) -> Self {
        Self {
            idle_threshold_ms: i64::from(idle_threshold_ms),
            last_activity_at: Cell::new(now),
            last_edit_at: Cell::new(None),
            idle: Cell::new(false),
        }
    }

    pub fn record(&self, kind: Interaction, now: i64) -> Option<ActivityTransition> {
        self.last_activity_at.set(now);
        if kind == Interaction::Edit {
            self.last_edit_at.set(Some(now));
        }

        if self.idle.replace(false) {
            Some(ActivityTransition::Woke)
        } else {
            None
        }
    }

    pub fn check(&self, now: i64) -> Option<ActivityTransition> {
        if self.idle.get() {
            return None;
        }
        if now - self.last_activity_at.get() >= self.idle_threshold_ms {
            self.idle.set(true);
            return Some(ActivityTransition::BecameIdle);
        }
        None
    }

    pub fn is_idle(&self) -> bool {
        self.idle.get()
    }

    /// Whether an edit happened within the trailing `window_ms`.
    pub fn has_recent_edits(&self, now: i64, window_ms: u32) -> bool {
        self.last_edit_at
            .get()
            .is_some_and(|at| now - at < i64::from(window_ms))
    }
}
