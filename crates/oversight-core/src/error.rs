use chrono::{DateTime, Utc};
use oversight_types::{ActivityId, Role, UserId};
use thiserror::Error;

/// Workflow errors raised by the core rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Permission denied: role '{role}' may not {action}")]
    Forbidden { role: Role, action: &'static str },

    #[error("User {0} is inactive")]
    InactiveUser(UserId),

    #[error("Activity is locked by {by} until {expires_at}")]
    LockHeld {
        by: UserId,
        expires_at: DateTime<Utc>,
    },

    #[error("Lock on activity is held by {by}, not {requested_by}")]
    NotLockHolder { by: UserId, requested_by: UserId },

    #[error("Illegal transition: expected '{expected}', got '{actual}'")]
    IllegalTransition {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Stale revision: activity budget is now {actual_minor}, revision was based on {expected_minor}")]
    StaleRevision {
        expected_minor: i64,
        actual_minor: i64,
    },

    #[error("Activity {0} already has an open budget revision")]
    OpenRevisionExists(ActivityId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Audit log error: {0}")]
    Audit(String),
}

impl WorkflowError {
    pub fn transition(expected: &'static str, actual: &'static str) -> Self {
        Self::IllegalTransition { expected, actual }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
