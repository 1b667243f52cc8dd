//! Per-activity edit lock
//!
//! A lock is valid only while `locked_by_id` is set and `locked_at` is within
//! the TTL. Every write path runs [`EditLock::guard_write`] first, which clears
//! a stale lock on the record before the write proceeds.

use crate::error::WorkflowError;
use chrono::{DateTime, Duration, Utc};
use oversight_types::{Activity, User, UserId};
use serde::Serialize;

/// Observed lock state at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    Unlocked,
    Held {
        by: UserId,
        locked_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Lock fields are set but the TTL has passed (or `locked_at` is missing)
    Stale { by: UserId },
}

impl LockState {
    pub fn is_held_by(&self, user: UserId) -> bool {
        matches!(self, Self::Held { by, .. } if *by == user)
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Self::Held { .. })
    }
}

/// Lock rules parameterized by TTL
#[derive(Debug, Clone, Copy)]
pub struct EditLock {
    ttl: Duration,
}

impl EditLock {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self, activity: &Activity, now: DateTime<Utc>) -> LockState {
        match (activity.locked_by_id, activity.locked_at) {
            (None, _) => LockState::Unlocked,
            (Some(by), None) => LockState::Stale { by },
            (Some(by), Some(locked_at)) => {
                let expires_at = locked_at + self.ttl;
                if now < expires_at {
                    LockState::Held {
                        by,
                        locked_at,
                        expires_at,
                    }
                } else {
                    LockState::Stale { by }
                }
            }
        }
    }

    /// Take or refresh the lock for `user`.
    ///
    /// Mutates the in-memory record only; the caller persists it with a
    /// version check.
    pub fn acquire(
        &self,
        activity: &mut Activity,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<LockState, WorkflowError> {
        if !user.active {
            return Err(WorkflowError::InactiveUser(user.id));
        }

        match self.state(activity, now) {
            LockState::Held { by, expires_at, .. } if by != user.id => {
                Err(WorkflowError::LockHeld { by, expires_at })
            }
            previous => {
                if let LockState::Stale { by } = previous {
                    tracing::debug!(activity_id = %activity.id, stale_holder = %by, "Replacing stale edit lock");
                }
                activity.locked_by_id = Some(user.id);
                activity.locked_at = Some(now);
                activity.touch(now);
                Ok(self.state(activity, now))
            }
        }
    }

    /// Release the lock. The holder may release; Admin may force-release.
    ///
    /// Returns `true` when the record changed and must be persisted.
    pub fn release(
        &self,
        activity: &mut Activity,
        user: &User,
        now: DateTime<Utc>,
    ) -> Result<bool, WorkflowError> {
        match self.state(activity, now) {
            LockState::Held { by, .. } if by != user.id && !user.is_admin() => {
                Err(WorkflowError::NotLockHolder {
                    by,
                    requested_by: user.id,
                })
            }
            LockState::Unlocked if activity.locked_at.is_none() => Ok(false),
            _ => {
                clear(activity);
                activity.touch(now);
                Ok(true)
            }
        }
    }

    /// Check that `writer` may write to the activity now.
    ///
    /// A valid lock held by someone else refuses the write; a stale lock is
    /// cleared; the writer's own lock is refreshed. Does not bump the version:
    /// the write that follows does.
    pub fn guard_write(
        &self,
        activity: &mut Activity,
        writer: UserId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        match self.state(activity, now) {
            LockState::Held { by, expires_at, .. } if by != writer => {
                Err(WorkflowError::LockHeld { by, expires_at })
            }
            LockState::Held { .. } => {
                activity.locked_at = Some(now);
                Ok(())
            }
            LockState::Stale { by } => {
                tracing::info!(activity_id = %activity.id, stale_holder = %by, "Clearing stale edit lock before write");
                clear(activity);
                Ok(())
            }
            LockState::Unlocked => {
                if activity.locked_at.is_some() {
                    clear(activity);
                }
                Ok(())
            }
        }
    }
}

fn clear(activity: &mut Activity) {
    activity.locked_by_id = None;
    activity.locked_at = None;
}
