//! Oversight core rules.
//!
//! This crate holds the decisions the service must never get wrong: who may do
//! what, when a budget revision may advance, whether an activity lock is still
//! valid, and an append-only audit trail of every change.

#![deny(unsafe_code)]

pub mod access;
pub mod approval;
pub mod audit;
pub mod error;
pub mod lock;
pub mod report;

pub use access::{allows, authorize, Permission};
pub use approval::{ApprovalPolicy, ApprovalWorkflow, ThresholdCheck};
pub use audit::{AuditFilter, AuditLog, AuditPage};
pub use error::WorkflowError;
pub use lock::{EditLock, LockState};
pub use report::{
    build_dashboard, summarize_objective, ActivityReport, DashboardSummary, LockedActivity,
    ObjectiveReport, ObjectiveSummary,
};
