//! Strongly-typed identifiers for oversight entities
//!
//! All IDs are UUID-based but wrapped in newtype structs so an activity id can
//! never be passed where a spend id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when an identifier cannot be parsed from a string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{value}'")]
pub struct IdParseError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| IdParseError {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user account
    UserId,
    "user"
);
uuid_id!(
    /// Unique identifier for an investment objective
    ObjectiveId,
    "objective"
);
uuid_id!(
    /// Unique identifier for an activity under an objective
    ActivityId,
    "activity"
);
uuid_id!(
    /// Unique identifier for an actual spend entry
    SpendId,
    "spend"
);
uuid_id!(
    /// Unique identifier for an uploaded attachment
    AttachmentId,
    "attachment"
);
uuid_id!(
    /// Unique identifier for a budget revision moving through approval
    RevisionId,
    "revision"
);
