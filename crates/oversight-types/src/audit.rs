//! Audit log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of entity an audit record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Objective,
    Activity,
    Spend,
    Attachment,
    Revision,
    Settings,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Objective => "objective",
            Self::Activity => "activity",
            Self::Spend => "spend",
            Self::Attachment => "attachment",
            Self::Revision => "revision",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "objective" => Ok(Self::Objective),
            "activity" => Ok(Self::Activity),
            "spend" => Ok(Self::Spend),
            "attachment" => Ok(Self::Attachment),
            "revision" => Ok(Self::Revision),
            "settings" => Ok(Self::Settings),
            other => Err(format!("invalid entity kind '{other}'")),
        }
    }
}

/// What happened, before it is chained into the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Acting user id, or `system` for automatic actions
    pub actor: String,
    pub action: String,
    pub entity: EntityKind,
    pub entity_id: String,
    #[serde(default)]
    pub detail: Value,
}

impl AuditRecord {
    pub fn new(
        actor: impl fmt::Display,
        action: impl Into<String>,
        entity: EntityKind,
        entity_id: impl fmt::Display,
    ) -> Self {
        Self {
            actor: actor.to_string(),
            action: action.into(),
            entity,
            entity_id: entity_id.to_string(),
            detail: Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Hash-chained audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub index: u64,
    pub actor: String,
    pub action: String,
    pub entity: EntityKind,
    pub entity_id: String,
    pub detail: Value,
    pub timestamp: DateTime<Utc>,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}
