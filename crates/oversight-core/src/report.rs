//! Dashboard figures and objective reports
//!
//! Everything here is pure aggregation over already-loaded records; the
//! service decides what to load. Totals are accumulated in `i128` and clamped
//! back to `i64` cents, so large budgets never overflow.

use crate::lock::{EditLock, LockState};
use chrono::{DateTime, Utc};
use oversight_types::{
    format_minor, Activity, ActivityId, ApprovalStatus, BudgetRevision, InvestmentObjective,
    ObjectiveId, SpendEntry, UserId,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Budget position of one objective
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectiveSummary {
    pub objective_id: ObjectiveId,
    pub code: String,
    pub title: String,
    pub budget_minor: i64,
    /// Sum of activity budgets
    pub allocated_minor: i64,
    pub spent_minor: i64,
    /// Budget minus spend
    pub remaining_minor: i64,
    /// Budget minus allocation
    pub unallocated_minor: i64,
    /// Spend as a share of budget, in basis points
    pub utilization_bp: u64,
    pub activity_count: usize,
    pub open_revisions: usize,
    pub over_allocated: bool,
    pub over_spent: bool,
}

/// Summarize one objective. Records belonging to other objectives are ignored.
pub fn summarize_objective(
    objective: &InvestmentObjective,
    activities: &[Activity],
    spend: &[SpendEntry],
    revisions: &[BudgetRevision],
) -> ObjectiveSummary {
    let owned: HashSet<ActivityId> = activities
        .iter()
        .filter(|a| a.objective_id == objective.id)
        .map(|a| a.id)
        .collect();

    let allocated = total(
        activities
            .iter()
            .filter(|a| owned.contains(&a.id))
            .map(|a| a.budget_minor),
    );
    let spent = total(
        spend
            .iter()
            .filter(|s| owned.contains(&s.activity_id))
            .map(|s| s.amount_minor),
    );
    let budget = i128::from(objective.budget_minor);
    let open_revisions = revisions
        .iter()
        .filter(|r| owned.contains(&r.activity_id) && !r.status.is_terminal())
        .count();

    ObjectiveSummary {
        objective_id: objective.id,
        code: objective.code.clone(),
        title: objective.title.clone(),
        budget_minor: objective.budget_minor,
        allocated_minor: clamp_minor(allocated),
        spent_minor: clamp_minor(spent),
        remaining_minor: clamp_minor(budget - spent),
        unallocated_minor: clamp_minor(budget - allocated),
        utilization_bp: utilization_bp(spent, budget),
        activity_count: owned.len(),
        open_revisions,
        over_allocated: allocated > budget,
        over_spent: spent > budget,
    }
}

fn total(amounts: impl Iterator<Item = i64>) -> i128 {
    amounts.map(i128::from).sum()
}

fn clamp_minor(amount: i128) -> i64 {
    i64::try_from(amount).unwrap_or(if amount < 0 { i64::MIN } else { i64::MAX })
}

fn utilization_bp(spent: i128, budget: i128) -> u64 {
    if budget <= 0 || spent <= 0 {
        return 0;
    }
    let bp = (spent as u128).saturating_mul(10_000) / budget as u128;
    u64::try_from(bp).unwrap_or(u64::MAX)
}

/// An activity currently under a valid edit lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockedActivity {
    pub activity_id: ActivityId,
    pub title: String,
    pub locked_by: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Portfolio-wide figures for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub objective_count: usize,
    pub activity_count: usize,
    pub total_budget_minor: i64,
    pub total_allocated_minor: i64,
    pub total_spent_minor: i64,
    pub total_remaining_minor: i64,
    pub utilization_bp: u64,
    pub revisions_by_status: BTreeMap<ApprovalStatus, usize>,
    pub locked_activities: Vec<LockedActivity>,
    pub objectives: Vec<ObjectiveSummary>,
    pub generated_at: DateTime<Utc>,
}

pub fn build_dashboard(
    objectives: &[InvestmentObjective],
    activities: &[Activity],
    spend: &[SpendEntry],
    revisions: &[BudgetRevision],
    lock: &EditLock,
    now: DateTime<Utc>,
) -> DashboardSummary {
    let summaries: Vec<ObjectiveSummary> = objectives
        .iter()
        .map(|o| summarize_objective(o, activities, spend, revisions))
        .collect();

    let budget = total(summaries.iter().map(|s| s.budget_minor));
    let allocated = total(summaries.iter().map(|s| s.allocated_minor));
    let spent = total(summaries.iter().map(|s| s.spent_minor));

    let mut revisions_by_status: BTreeMap<ApprovalStatus, usize> =
        ApprovalStatus::all().into_iter().map(|s| (s, 0)).collect();
    for revision in revisions {
        *revisions_by_status.entry(revision.status).or_default() += 1;
    }

    let mut locked_activities: Vec<LockedActivity> = activities
        .iter()
        .filter_map(|activity| match lock.state(activity, now) {
            LockState::Held { by, expires_at, .. } => Some(LockedActivity {
                activity_id: activity.id,
                title: activity.title.clone(),
                locked_by: by,
                expires_at,
            }),
            _ => None,
        })
        .collect();
    locked_activities.sort_by_key(|l| l.expires_at);

    DashboardSummary {
        objective_count: summaries.len(),
        activity_count: activities.len(),
        total_budget_minor: clamp_minor(budget),
        total_allocated_minor: clamp_minor(allocated),
        total_spent_minor: clamp_minor(spent),
        total_remaining_minor: clamp_minor(budget - spent),
        utilization_bp: utilization_bp(spent, budget),
        revisions_by_status,
        locked_activities,
        objectives: summaries,
        generated_at: now,
    }
}

/// One activity with its spend lines
#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub activity: Activity,
    pub spent_minor: i64,
    pub remaining_minor: i64,
    pub spend: Vec<SpendEntry>,
}

/// Exportable report for a single objective
#[derive(Debug, Clone, Serialize)]
pub struct ObjectiveReport {
    pub objective: InvestmentObjective,
    pub summary: ObjectiveSummary,
    pub activities: Vec<ActivityReport>,
    pub generated_at: DateTime<Utc>,
}

impl ObjectiveReport {
    pub fn build(
        objective: &InvestmentObjective,
        activities: &[Activity],
        spend: &[SpendEntry],
        revisions: &[BudgetRevision],
        now: DateTime<Utc>,
    ) -> Self {
        let summary = summarize_objective(objective, activities, spend, revisions);

        let mut by_activity: HashMap<ActivityId, Vec<SpendEntry>> = HashMap::new();
        for entry in spend {
            by_activity.entry(entry.activity_id).or_default().push(entry.clone());
        }

        let mut owned: Vec<&Activity> = activities
            .iter()
            .filter(|a| a.objective_id == objective.id)
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.title.cmp(&b.title)));

        let activities = owned
            .into_iter()
            .map(|activity| {
                let mut lines = by_activity.remove(&activity.id).unwrap_or_default();
                lines.sort_by(|a, b| a.spent_on.cmp(&b.spent_on).then(a.created_at.cmp(&b.created_at)));
                let spent = total(lines.iter().map(|l| l.amount_minor));
                ActivityReport {
                    activity: activity.clone(),
                    spent_minor: clamp_minor(spent),
                    remaining_minor: clamp_minor(i128::from(activity.budget_minor) - spent),
                    spend: lines,
                }
            })
            .collect();

        Self {
            objective: objective.clone(),
            summary,
            activities,
            generated_at: now,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Render as CSV with one row per objective, activity and spend line.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_row(
            &mut out,
            &[
                "record_type",
                "objective_code",
                "activity",
                "date",
                "description",
                "budget",
                "spent",
                "remaining",
            ],
        );

        let code = self.objective.code.as_str();
        push_row(
            &mut out,
            &[
                "objective",
                code,
                "",
                "",
                &self.objective.title,
                &format_minor(self.summary.budget_minor),
                &format_minor(self.summary.spent_minor),
                &format_minor(self.summary.remaining_minor),
            ],
        );

        for report in &self.activities {
            push_row(
                &mut out,
                &[
                    "activity",
                    code,
                    &report.activity.title,
                    "",
                    &report.activity.description,
                    &format_minor(report.activity.budget_minor),
                    &format_minor(report.spent_minor),
                    &format_minor(report.remaining_minor),
                ],
            );
            for line in &report.spend {
                push_row(
                    &mut out,
                    &[
                        "spend",
                        code,
                        &report.activity.title,
                        &line.spent_on.to_string(),
                        &line.description,
                        "",
                        &format_minor(line.amount_minor),
                        "",
                    ],
                );
            }
        }

        out
    }
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_field(field));
    }
    out.push_str("\r\n");
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn fixture() -> (InvestmentObjective, Vec<Activity>, Vec<SpendEntry>) {
        let owner = UserId::generate();
        let objective = InvestmentObjective::new("WASH-01", "Water access", 100_000, owner);
        let mut wells = Activity::new(objective.id, "Wells", 60_000, owner);
        wells.description = "Drilling, phase \"one\"".to_string();
        let training = Activity::new(objective.id, "Training", 50_000, owner);
        let foreign = Activity::new(ObjectiveId::generate(), "Elsewhere", 9_999, owner);

        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let spend = vec![
            SpendEntry::new(wells.id, 25_000, day, owner),
            SpendEntry::new(training.id, 5_000, day, owner),
            SpendEntry::new(foreign.id, 1_000, day, owner),
        ];
        (objective, vec![wells, training, foreign], spend)
    }

    #[test]
    fn summary_aggregates_only_owned_records() {
        let (objective, activities, spend) = fixture();
        let summary = summarize_objective(&objective, &activities, &spend, &[]);

        assert_eq!(summary.activity_count, 2);
        assert_eq!(summary.allocated_minor, 110_000);
        assert_eq!(summary.spent_minor, 30_000);
        assert_eq!(summary.remaining_minor, 70_000);
        assert_eq!(summary.unallocated_minor, -10_000);
        assert_eq!(summary.utilization_bp, 3_000);
        assert!(summary.over_allocated);
        assert!(!summary.over_spent);
    }

    #[test]
    fn zero_budget_has_zero_utilization() {
        assert_eq!(utilization_bp(500, 0), 0);
        assert_eq!(utilization_bp(0, 100), 0);
        assert_eq!(utilization_bp(150, 100), 15_000);
    }

    #[test]
    fn huge_budgets_clamp_instead_of_overflowing() {
        let owner = UserId::generate();
        let objective = InvestmentObjective::new("BIG-01", "Large", i64::MAX, owner);
        let first = Activity::new(objective.id, "First", i64::MAX, owner);
        let second = Activity::new(objective.id, "Second", i64::MAX, owner);
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let spend = vec![
            SpendEntry::new(first.id, i64::MAX, day, owner),
            SpendEntry::new(second.id, i64::MAX, day, owner),
        ];
        let activities = vec![first, second];

        let summary = summarize_objective(&objective, &activities, &spend, &[]);
        assert_eq!(summary.allocated_minor, i64::MAX);
        assert_eq!(summary.spent_minor, i64::MAX);
        assert_eq!(summary.remaining_minor, -i64::MAX);
        assert_eq!(summary.unallocated_minor, -i64::MAX);
        assert_eq!(summary.utilization_bp, 20_000);
        assert!(summary.over_allocated);
        assert!(summary.over_spent);

        let other = InvestmentObjective::new("BIG-02", "Also large", i64::MAX, owner);
        let lock = EditLock::new(Duration::minutes(30));
        let dashboard = build_dashboard(
            &[objective.clone(), other],
            &activities,
            &spend,
            &[],
            &lock,
            Utc::now(),
        );
        assert_eq!(dashboard.total_budget_minor, i64::MAX);
        assert_eq!(dashboard.total_spent_minor, i64::MAX);
        assert_eq!(dashboard.total_remaining_minor, i64::MAX);

        let report = ObjectiveReport::build(&objective, &activities, &spend, &[], Utc::now());
        assert_eq!(report.activities[0].remaining_minor, 0);
        assert!(report.to_csv().contains(&format_minor(i64::MAX)));
    }

    #[test]
    fn dashboard_lists_only_valid_locks() {
        let (objective, mut activities, spend) = fixture();
        let now = Utc::now();
        let lock = EditLock::new(Duration::minutes(30));
        let holder = UserId::generate();

        activities[0].locked_by_id = Some(holder);
        activities[0].locked_at = Some(now - Duration::minutes(5));
        activities[1].locked_by_id = Some(holder);
        activities[1].locked_at = Some(now - Duration::minutes(31));

        let dashboard = build_dashboard(&[objective], &activities, &spend, &[], &lock, now);
        assert_eq!(dashboard.locked_activities.len(), 1);
        assert_eq!(dashboard.locked_activities[0].activity_id, activities[0].id);
        assert_eq!(dashboard.total_spent_minor, 30_000);
        assert_eq!(dashboard.revisions_by_status[&ApprovalStatus::Submitted], 0);
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn csv_report_has_row_per_record() {
        let (objective, activities, spend) = fixture();
        let report = ObjectiveReport::build(&objective, &activities, &spend, &[], Utc::now());
        let csv = report.to_csv();
        let rows: Vec<&str> = csv.split("\r\n").filter(|r| !r.is_empty()).collect();

        // header, objective, two activities, two spend lines
        assert_eq!(rows.len(), 6);
        assert!(rows[0].starts_with("record_type,"));
        assert!(rows[1].starts_with("objective,WASH-01,"));
        assert!(csv.contains("\"Drilling, phase \"\"one\"\"\""));
        assert!(csv.contains(",250.00,"));
    }

    #[test]
    fn json_report_round_trips_through_value() {
        let (objective, activities, spend) = fixture();
        let report = ObjectiveReport::build(&objective, &activities, &spend, &[], Utc::now());
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["summary"]["spent_minor"], 30_000);
        assert_eq!(value["activities"].as_array().unwrap().len(), 2);
    }
}
