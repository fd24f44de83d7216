//! Cache freshness policy.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Result of checking a stored report's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreshnessVerdict {
    pub is_fresh: bool,
    /// Whole days elapsed since the last update (floor)
    pub age_days: i64,
}

pub struct Freshness;

impl Freshness {
    /// A report is fresh when it was updated less than `max_age_days` ago.
    /// `max_age_days = 0` is never fresh; a window too large to represent
    /// always is.
    pub fn evaluate(
        updated_at: DateTime<Utc>,
        max_age_days: i64,
        now: DateTime<Utc>,
    ) -> FreshnessVerdict {
        let age = now - updated_at;
        FreshnessVerdict {
            is_fresh: max_age_days > 0
                && Duration::try_days(max_age_days).is_none_or(|window| age < window),
            age_days: age.num_days().max(0),
        }
    }
}
