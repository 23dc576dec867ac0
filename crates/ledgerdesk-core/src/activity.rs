//! Activity-gated token refresh throttle.
//!
//! User activity (pointer movement, key presses, touches) is what keeps a
//! session alive. Each activity event is fed to a [`RefreshThrottle`], which
//! decides whether enough wall-clock time has passed to re-validate the
//! session with the backend.

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Minute window used by the calendar-hour rule.
const CALENDAR_WINDOW_MINUTES: u32 = 25;

const DEFAULT_THRESHOLD_MINUTES: i64 = 25;

/// Longest accepted elapsed-rule threshold (one week).
pub const MAX_THRESHOLD_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    PointerMove,
    KeyPress,
    TouchStart,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActivityKind::PointerMove => "pointer_move",
            ActivityKind::KeyPress => "key_press",
            ActivityKind::TouchStart => "touch_start",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshRule {
    /// Refresh once at least `threshold_minutes` have elapsed since the
    /// last recorded activity.
    Elapsed { threshold_minutes: i64 },
    /// The web client's original rule. The recorded time is reset whenever
    /// its minute is within 25 minutes of the top of the hour, and a refresh
    /// fires when the hour has changed and the current minute is at least 25
    /// past the recorded minute. An event shortly after an hour boundary is
    /// skipped even when almost an hour has passed.
    CalendarHour,
}

impl RefreshRule {
    /// Reject thresholds outside `1..=MAX_THRESHOLD_MINUTES`.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            RefreshRule::Elapsed { threshold_minutes }
                if !(1..=MAX_THRESHOLD_MINUTES).contains(&threshold_minutes) =>
            {
                Err(format!(
                    "refresh threshold must be between 1 and {} minutes, got {}",
                    MAX_THRESHOLD_MINUTES, threshold_minutes
                ))
            }
            _ => Ok(()),
        }
    }
}

impl Default for RefreshRule {
    fn default() -> Self {
        RefreshRule::Elapsed {
            threshold_minutes: DEFAULT_THRESHOLD_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityDecision {
    /// Nothing to do
    Ignore,
    /// Recorded time moved to now, no refresh
    Reset,
    /// Re-validate the session; recorded time moved to now
    Refresh,
}

#[derive(Debug, Clone)]
pub struct RefreshThrottle {
    rule: RefreshRule,
    last_activity: NaiveDateTime,
}

impl RefreshThrottle {
    pub fn new(rule: RefreshRule, now: NaiveDateTime) -> Self {
        Self {
            rule,
            last_activity: now,
        }
    }

    pub fn last_activity(&self) -> NaiveDateTime {
        self.last_activity
    }

    /// Record an activity event at local wall-clock time `now`.
    pub fn observe(&mut self, now: NaiveDateTime) -> ActivityDecision {
        let decision = match self.rule {
            RefreshRule::Elapsed { threshold_minutes } => {
                let threshold =
                    Duration::minutes(threshold_minutes.clamp(1, MAX_THRESHOLD_MINUTES));
                let elapsed = now - self.last_activity;
                if elapsed < Duration::zero() {
                    // Clock went backwards; start over from here
                    ActivityDecision::Reset
                } else if elapsed >= threshold {
                    ActivityDecision::Refresh
                } else {
                    ActivityDecision::Ignore
                }
            }
            RefreshRule::CalendarHour => {
                let last_minute = self.last_activity.minute();
                let reset = last_minute + CALENDAR_WINDOW_MINUTES >= 60;
                let refresh = now.hour() != self.last_activity.hour()
                    && now.minute() >= last_minute + CALENDAR_WINDOW_MINUTES;
                if refresh {
                    ActivityDecision::Refresh
                } else if reset {
                    ActivityDecision::Reset
                } else {
                    ActivityDecision::Ignore
                }
            }
        };

        if decision != ActivityDecision::Ignore {
            self.last_activity = now;
        }
        decision
    }
}
