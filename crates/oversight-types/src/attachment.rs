//! Attachment metadata

use crate::{ActivityId, AttachmentId, SpendId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Record an attachment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AttachmentOwner {
    Activity(ActivityId),
    Spend(SpendId),
}

/// Metadata for an uploaded document. Content lives in the blob store under
/// `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub owner: AttachmentOwner,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// blake3 hex digest of the content
    pub content_hash: String,
    pub storage_key: String,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}

/// Strip any path components and control characters from a client filename
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(r"C:\docs\receipt.pdf"), "receipt.pdf");
        assert_eq!(sanitize_filename("..."), "attachment");
        assert_eq!(sanitize_filename(".env"), "env");
    }

    #[test]
    fn owner_serializes_tagged() {
        let owner = AttachmentOwner::Spend(SpendId::generate());
        let json = serde_json::to_value(owner).unwrap();
        assert_eq!(json["kind"], "spend");
    }
}
