// src/harvest/window.rs
use chrono::{DateTime, TimeDelta, Utc};

/// Trailing interval `[since, until]` that post timestamps are judged against.
/// Derived at the start of a run, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl HarvestWindow {
    /// `(now - hours, now)`. Negative hours are treated as 0; a span reaching
    /// past the representable range starts at `DateTime::<Utc>::MIN_UTC`.
    pub fn trailing(now: DateTime<Utc>, hours: i64) -> Self {
        let since = TimeDelta::try_hours(hours.max(0))
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { since, until: now }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.since <= t && t <= self.until
    }
}
