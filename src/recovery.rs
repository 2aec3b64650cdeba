use crate::command::Command;
use std::time::Duration;

/// Thresholds for the two-tier stuck policy: soft failure-counter resets
/// while the goal is still worth retrying, a hard skip once the retry budget
/// for the goal is spent.
#[derive(Clone, Debug)]
pub struct RecoveryConfig {
    /// Elapsed time on one goal after which it counts as stuck.
    pub goal_timeout: Duration,
    /// Consecutive failed localization attempts after which it counts as stuck.
    pub max_failures: u32,
    /// Fallback actions to spend on one goal before abandoning it.
    pub max_swipe_attempts: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            goal_timeout: Duration::from_secs(20),
            max_failures: 3,
            max_swipe_attempts: 5,
        }
    }
}

/// Per-session recovery counters. `fallback_cursor` is global: it survives
/// goal advances so consecutive misses keep exploring new swipe directions
/// instead of restarting the rotation on every goal.
#[derive(Clone, Debug, Default)]
pub struct RecoveryState {
    pub consecutive_failures: u32,
    pub swipe_attempts: u32,
    pub fallback_cursor: usize,
}

/// What to do about the current goal before attempting localization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StuckDecision {
    /// Not stuck; attempt localization normally.
    Proceed,
    /// Stuck, but retry budget remains: clear the failure counter and try the
    /// same goal again.
    SoftReset,
    /// Retry budget exhausted: abandon the goal and move on.
    ForceAdvance,
}

impl RecoveryConfig {
    /// Evaluated before each localization attempt. The exhaustion check comes
    /// first and does not depend on the stuck signals, so the request after
    /// the final budgeted miss always escapes the goal.
    pub fn assess(&self, state: &RecoveryState, elapsed: Duration) -> StuckDecision {
        if state.swipe_attempts >= self.max_swipe_attempts {
            return StuckDecision::ForceAdvance;
        }
        if elapsed >= self.goal_timeout || state.consecutive_failures >= self.max_failures {
            return StuckDecision::SoftReset;
        }
        StuckDecision::Proceed
    }
}

impl RecoveryState {
    /// Registers a localization miss and returns the fallback action to send
    /// instead. Every miss moves the rotation forward one step.
    pub fn record_miss(&mut self) -> Command {
        self.consecutive_failures += 1;
        self.swipe_attempts += 1;
        self.next_fallback()
    }

    /// Next action in the fixed swipe rotation, advancing the cursor.
    pub fn next_fallback(&mut self) -> Command {
        let cmd = match self.fallback_cursor % 4 {
            0 => Command::SwipeDown,
            1 => Command::SwipeUp,
            2 => Command::SwipeLeft,
            _ => Command::SwipeRight,
        };
        self.fallback_cursor += 1;
        cmd
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Called on every goal advance. The rotation cursor deliberately
    /// survives.
    pub fn reset_for_new_goal(&mut self) {
        self.consecutive_failures = 0;
        self.swipe_attempts = 0;
    }
}
