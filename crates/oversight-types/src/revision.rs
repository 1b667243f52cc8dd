//! Budget revisions and their approval state

use crate::{ActivityId, RevisionId, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Approval state of a budget revision.
///
/// Transitions only move forward:
/// `Submitted -> FinanceApproved -> CommitteeApproved`, with `Rejected`
/// reachable from either non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Submitted,
    FinanceApproved,
    CommitteeApproved,
    Rejected,
}

impl ApprovalStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::FinanceApproved => "finance_approved",
            Self::CommitteeApproved => "committee_approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CommitteeApproved | Self::Rejected)
    }

    pub fn all() -> [ApprovalStatus; 4] {
        [
            Self::Submitted,
            Self::FinanceApproved,
            Self::CommitteeApproved,
            Self::Rejected,
        ]
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "submitted" => Ok(Self::Submitted),
            "finance_approved" => Ok(Self::FinanceApproved),
            "committee_approved" => Ok(Self::CommitteeApproved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!(
                "invalid status '{other}'; expected one of: submitted, finance_approved, committee_approved, rejected"
            )),
        }
    }
}

/// Which step of the workflow a decision was taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    /// Threshold check at submission
    Auto,
    Finance,
    Committee,
}

/// Outcome recorded for one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

/// One entry in a revision's decision history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub stage: ApprovalStage,
    pub outcome: DecisionOutcome,
    /// None for automatic decisions
    pub actor: Option<UserId>,
    pub actor_role: Option<Role>,
    pub note: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// A request to change an activity's budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRevision {
    pub id: RevisionId,

    pub activity_id: ActivityId,

    pub requested_by: UserId,

    /// Activity budget when the revision was submitted
    pub current_budget_minor: i64,

    pub proposed_budget_minor: i64,

    #[serde(default)]
    pub justification: String,

    pub status: ApprovalStatus,

    /// Set when thresholds allowed the revision to skip human review
    pub auto_approved: bool,

    /// Set once the proposed budget has been written to the activity
    pub applied: bool,

    #[serde(default)]
    pub decisions: Vec<ApprovalDecision>,

    pub submitted_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl BudgetRevision {
    /// Absolute change requested, in cents
    pub fn delta_minor(&self) -> i64 {
        self.proposed_budget_minor - self.current_budget_minor
    }
}
