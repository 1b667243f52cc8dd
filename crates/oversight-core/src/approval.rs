//! Budget revision approval workflow
//!
//! Revisions move `Submitted -> FinanceApproved -> CommitteeApproved`, or to
//! `Rejected` from either open state. A revision whose change stays within
//! both the absolute and the relative threshold skips human review and is
//! approved at submission.

use crate::access::{authorize, Permission};
use crate::error::WorkflowError;
use crate::lock::EditLock;
use chrono::{DateTime, Utc};
use oversight_types::{
    Activity, ApprovalDecision, ApprovalStage, ApprovalStatus, BudgetRevision, DecisionOutcome,
    RevisionId, Settings, User,
};
use serde::Serialize;

/// Auto-approval thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Largest absolute change (cents) eligible for auto-approval
    pub max_delta_minor: u64,
    /// Largest relative change (basis points) eligible for auto-approval
    pub max_delta_bp: u64,
}

impl ApprovalPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_delta_minor: settings.auto_approve_max_minor.max(0) as u64,
            max_delta_bp: u64::from(settings.auto_approve_max_percent_bp),
        }
    }

    pub fn evaluate(&self, current_minor: i64, proposed_minor: i64) -> ThresholdCheck {
        let delta_minor = (i128::from(proposed_minor) - i128::from(current_minor)).unsigned_abs();
        let base = i128::from(current_minor).unsigned_abs();

        // Relative change is rounded up so 10.01% never passes a 10% threshold.
        let delta_bp = if base == 0 {
            if delta_minor == 0 {
                Some(0)
            } else {
                None
            }
        } else {
            let bp = (delta_minor * 10_000).div_ceil(base);
            Some(u64::try_from(bp).unwrap_or(u64::MAX))
        };

        let delta_minor = u64::try_from(delta_minor).unwrap_or(u64::MAX);
        let within_absolute = delta_minor <= self.max_delta_minor;
        let within_relative = delta_bp.is_some_and(|bp| bp <= self.max_delta_bp);

        ThresholdCheck {
            delta_minor,
            delta_bp,
            within_absolute,
            within_relative,
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// Result of comparing a proposed change against the thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdCheck {
    pub delta_minor: u64,
    /// None when the current budget is zero and the change is not
    pub delta_bp: Option<u64>,
    pub within_absolute: bool,
    pub within_relative: bool,
}

impl ThresholdCheck {
    /// Both thresholds must pass
    pub fn auto_approve(&self) -> bool {
        self.within_absolute && self.within_relative
    }
}

/// Stateless workflow rules; storage and persistence belong to the caller.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalWorkflow {
    policy: ApprovalPolicy,
    lock: EditLock,
}

impl ApprovalWorkflow {
    pub fn new(policy: ApprovalPolicy, lock: EditLock) -> Self {
        Self { policy, lock }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            ApprovalPolicy::from_settings(settings),
            EditLock::new(settings.lock_ttl()),
        )
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    pub fn lock(&self) -> &EditLock {
        &self.lock
    }

    /// Refuse a new revision while another one on the same activity is open
    pub fn ensure_no_open_revision<'a>(
        &self,
        activity: &Activity,
        existing: impl IntoIterator<Item = &'a BudgetRevision>,
    ) -> Result<(), WorkflowError> {
        let open = existing
            .into_iter()
            .any(|rev| rev.activity_id == activity.id && !rev.status.is_terminal());
        if open {
            return Err(WorkflowError::OpenRevisionExists(activity.id));
        }
        Ok(())
    }

    /// Build a new revision against the activity's current budget.
    ///
    /// When thresholds pass the revision is returned already
    /// `CommitteeApproved` with `auto_approved` set; the caller must still
    /// [`apply`](Self::apply) it.
    pub fn submit(
        &self,
        activity: &Activity,
        requester: &User,
        proposed_budget_minor: i64,
        justification: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<BudgetRevision, WorkflowError> {
        authorize(requester, Permission::SubmitRevision)?;

        if proposed_budget_minor < 0 {
            return Err(WorkflowError::validation("proposed budget must not be negative"));
        }
        if proposed_budget_minor == activity.budget_minor {
            return Err(WorkflowError::validation(
                "proposed budget equals the current budget",
            ));
        }

        let mut revision = BudgetRevision {
            id: RevisionId::generate(),
            activity_id: activity.id,
            requested_by: requester.id,
            current_budget_minor: activity.budget_minor,
            proposed_budget_minor,
            justification: justification.into(),
            status: ApprovalStatus::Submitted,
            auto_approved: false,
            applied: false,
            decisions: Vec::new(),
            submitted_at: now,
            updated_at: now,
        };

        let check = self
            .policy
            .evaluate(activity.budget_minor, proposed_budget_minor);
        if check.auto_approve() {
            revision.status = ApprovalStatus::CommitteeApproved;
            revision.auto_approved = true;
            revision.decisions.push(ApprovalDecision {
                stage: ApprovalStage::Auto,
                outcome: DecisionOutcome::Approved,
                actor: None,
                actor_role: None,
                note: Some(format!(
                    "change of {} cents ({} bp) within thresholds",
                    check.delta_minor,
                    check.delta_bp.unwrap_or_default()
                )),
                decided_at: now,
            });
            tracing::info!(revision_id = %revision.id, activity_id = %activity.id, "Budget revision auto-approved");
        }

        Ok(revision)
    }

    pub fn finance_approve(
        &self,
        revision: &mut BudgetRevision,
        actor: &User,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        authorize(actor, Permission::FinanceDecision)?;
        self.advance(
            revision,
            ApprovalStatus::Submitted,
            ApprovalStatus::FinanceApproved,
        )?;
        record(revision, ApprovalStage::Finance, DecisionOutcome::Approved, actor, note, now);
        Ok(())
    }

    /// Move to `CommitteeApproved`. The budget change is not written until
    /// [`apply`](Self::apply) succeeds.
    pub fn committee_approve(
        &self,
        revision: &mut BudgetRevision,
        actor: &User,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        authorize(actor, Permission::CommitteeDecision)?;
        self.advance(
            revision,
            ApprovalStatus::FinanceApproved,
            ApprovalStatus::CommitteeApproved,
        )?;
        record(revision, ApprovalStage::Committee, DecisionOutcome::Approved, actor, note, now);
        Ok(())
    }

    /// Reject an open revision. The required role depends on the stage the
    /// revision is waiting at.
    pub fn reject(
        &self,
        revision: &mut BudgetRevision,
        actor: &User,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let note = note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| WorkflowError::validation("a rejection note is required"))?;

        let stage = match revision.status {
            ApprovalStatus::Submitted => {
                authorize(actor, Permission::FinanceDecision)?;
                ApprovalStage::Finance
            }
            ApprovalStatus::FinanceApproved => {
                authorize(actor, Permission::CommitteeDecision)?;
                ApprovalStage::Committee
            }
            terminal => {
                return Err(WorkflowError::transition(
                    "submitted' or 'finance_approved",
                    terminal.name(),
                ))
            }
        };

        revision.status = ApprovalStatus::Rejected;
        record(revision, stage, DecisionOutcome::Rejected, actor, Some(note), now);
        Ok(())
    }

    /// Write an approved revision's budget to the activity.
    ///
    /// Fails with [`WorkflowError::StaleRevision`] when the activity budget
    /// moved after submission, and honours the edit lock for `actor`. The
    /// caller persists the activity with a version check so a concurrent write
    /// between load and save is also refused.
    pub fn apply(
        &self,
        revision: &mut BudgetRevision,
        activity: &mut Activity,
        actor: &User,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if revision.status != ApprovalStatus::CommitteeApproved {
            return Err(WorkflowError::transition(
                ApprovalStatus::CommitteeApproved.name(),
                revision.status.name(),
            ));
        }
        if revision.applied {
            return Err(WorkflowError::validation("revision has already been applied"));
        }
        if activity.id != revision.activity_id {
            return Err(WorkflowError::validation("revision belongs to another activity"));
        }
        if activity.budget_minor != revision.current_budget_minor {
            return Err(WorkflowError::StaleRevision {
                expected_minor: revision.current_budget_minor,
                actual_minor: activity.budget_minor,
            });
        }

        self.lock.guard_write(activity, actor.id, now)?;

        activity.budget_minor = revision.proposed_budget_minor;
        activity.touch(now);
        revision.applied = true;
        revision.updated_at = now;
        Ok(())
    }

    fn advance(
        &self,
        revision: &mut BudgetRevision,
        expected: ApprovalStatus,
        next: ApprovalStatus,
    ) -> Result<(), WorkflowError> {
        if revision.status != expected {
            return Err(WorkflowError::transition(
                expected.name(),
                revision.status.name(),
            ));
        }
        revision.status = next;
        Ok(())
    }
}

fn record(
    revision: &mut BudgetRevision,
    stage: ApprovalStage,
    outcome: DecisionOutcome,
    actor: &User,
    note: Option<String>,
    now: DateTime<Utc>,
) {
    revision.decisions.push(ApprovalDecision {
        stage,
        outcome,
        actor: Some(actor.id),
        actor_role: Some(actor.role),
        note,
        decided_at: now,
    });
    revision.updated_at = now;
}
