//! Oversight Types - core domain model for grant oversight
//!
//! Donor funds are tracked as investment objectives, each broken down into
//! activities with their own budgets. Actual spend is recorded against
//! activities, and budget changes move through a staged approval workflow.
//!
//! ## Key Concepts
//!
//! - **InvestmentObjective**: top-level donor commitment
//! - **Activity**: funded work item, carrying an edit lock and a version
//! - **SpendEntry**: actual spend against an activity
//! - **BudgetRevision**: a proposed budget change awaiting approval
//! - **Settings**: auto-approval thresholds and lock TTL

#![deny(unsafe_code)]

pub mod attachment;
pub mod audit;
pub mod ids;
pub mod objective;
pub mod revision;
pub mod settings;
pub mod user;

pub use attachment::{sanitize_filename, Attachment, AttachmentOwner};
pub use audit::{AuditEntry, AuditRecord, EntityKind};
pub use ids::{ActivityId, AttachmentId, IdParseError, ObjectiveId, RevisionId, SpendId, UserId};
pub use objective::{format_minor, Activity, InvestmentObjective, SpendEntry};
pub use revision::{
    ApprovalDecision, ApprovalStage, ApprovalStatus, BudgetRevision, DecisionOutcome,
};
pub use settings::Settings;
pub use user::{normalize_email, Role, User};
