//! Investment objectives, activities and actual spend
//!
//! An objective owns many activities; an activity owns many spend entries.
//! All amounts are USD minor units (cents).

use crate::{ActivityId, ObjectiveId, SpendId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A donor investment objective
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentObjective {
    pub id: ObjectiveId,

    /// Short reference code, unique across objectives
    pub code: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Total committed budget in cents
    pub budget_minor: i64,

    pub created_by: UserId,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Incremented on every persisted change
    pub version: u64,
}

impl InvestmentObjective {
    pub fn new(
        code: impl Into<String>,
        title: impl Into<String>,
        budget_minor: i64,
        created_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectiveId::generate(),
            code: code.into(),
            title: title.into(),
            description: String::new(),
            budget_minor,
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// An activity funded under an objective.
///
/// `locked_by_id`/`locked_at` form the edit lock; `version` is the optimistic
/// concurrency token compared on every write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,

    pub objective_id: ObjectiveId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Approved budget in cents
    pub budget_minor: i64,

    #[serde(default)]
    pub locked_by_id: Option<UserId>,

    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,

    pub version: u64,

    pub created_by: UserId,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        objective_id: ObjectiveId,
        title: impl Into<String>,
        budget_minor: i64,
        created_by: UserId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ActivityId::generate(),
            objective_id,
            title: title.into(),
            description: String::new(),
            budget_minor,
            locked_by_id: None,
            locked_at: None,
            version: 1,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a persisted change: bump the version and touch `updated_at`
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// An actual spend line recorded against an activity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendEntry {
    pub id: SpendId,

    pub activity_id: ActivityId,

    /// Amount spent in cents, always positive
    pub amount_minor: i64,

    pub spent_on: NaiveDate,

    #[serde(default)]
    pub description: String,

    pub recorded_by: UserId,

    pub created_at: DateTime<Utc>,
}

impl SpendEntry {
    pub fn new(
        activity_id: ActivityId,
        amount_minor: i64,
        spent_on: NaiveDate,
        recorded_by: UserId,
    ) -> Self {
        Self {
            id: SpendId::generate(),
            activity_id,
            amount_minor,
            spent_on,
            description: String::new(),
            recorded_by,
            created_at: Utc::now(),
        }
    }
}

/// Format cents as a plain decimal dollar string, e.g. `-1234.05`
pub fn format_minor(amount_minor: i64) -> String {
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_bumps_version() {
        let mut activity = Activity::new(ObjectiveId::generate(), "Wells", 10_000, UserId::generate());
        assert_eq!(activity.version, 1);
        activity.touch(Utc::now());
        assert_eq!(activity.version, 2);
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor(0), "0.00");
        assert_eq!(format_minor(123_405), "1234.05");
        assert_eq!(format_minor(-7), "-0.07");
    }
}
