//! User accounts and roles

use crate::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role held by a user. Each user holds exactly one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full access, may act in place of Finance or Committee
    Admin,
    /// First approval stage; records and reviews spend
    Finance,
    /// Final approval stage
    Committee,
    /// Programme manager maintaining objectives and activities
    Manager,
    /// Read-only access (donors, observers)
    Viewer,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Finance => "finance",
            Self::Committee => "committee",
            Self::Manager => "manager",
            Self::Viewer => "viewer",
        }
    }

    pub fn all() -> [Role; 5] {
        [
            Self::Admin,
            Self::Finance,
            Self::Committee,
            Self::Manager,
            Self::Viewer,
        ]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "finance" => Ok(Self::Finance),
            "committee" => Ok(Self::Committee),
            "manager" => Ok(Self::Manager),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!(
                "unknown role '{other}'; expected one of: admin, finance, committee, manager, viewer"
            )),
        }
    }
}

/// A user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Login email, unique ignoring case
    pub email: String,

    pub display_name: String,

    pub role: Role,

    /// Deactivated users keep their history but cannot act
    pub active: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            email: normalize_email(&email.into()),
            display_name: display_name.into(),
            role,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Canonical form used for uniqueness checks
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
