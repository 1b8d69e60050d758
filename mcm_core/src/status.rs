//! Result of waiting on an in-flight move.

/// How a completion wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing was in flight.
    Idle,
    /// Encoder came within tolerance of the target.
    Arrived { counts: i32 },
    /// Deadline passed first; the target has been dropped anyway.
    TimedOut { target_counts: i32, last_counts: i32 },
}

impl MoveOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, MoveOutcome::TimedOut { .. })
    }
}
