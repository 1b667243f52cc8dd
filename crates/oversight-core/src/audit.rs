//! Hash-chained audit log
//!
//! Each entry carries the blake3 hash of its predecessor. [`AuditLog`]
//! builds entries and only accepts them after the caller has persisted them.

use crate::error::WorkflowError;
use chrono::{DateTime, Utc};
use oversight_types::{AuditEntry, AuditRecord, EntityKind};
use serde_json::Value;

/// Append-only audit log with hash-chain proofs.
///
/// No in-place mutation APIs are exposed: every change to the system becomes
/// an additional entry linked to its predecessor.
#[derive(Debug, Default, Clone)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Rebuild a log from persisted entries and verify hash-chain integrity.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Result<Self, WorkflowError> {
        let log = Self { entries };

        for (expected_index, entry) in log.entries.iter().enumerate() {
            if entry.index != expected_index as u64 {
                return Err(WorkflowError::Audit(format!(
                    "audit index gap detected at position {} (found {})",
                    expected_index, entry.index
                )));
            }
        }

        if !log.verify_chain() {
            return Err(WorkflowError::Audit(
                "persisted audit hash-chain verification failed".to_string(),
            ));
        }

        Ok(log)
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(
        &mut self,
        record: AuditRecord,
        now: DateTime<Utc>,
    ) -> Result<AuditEntry, WorkflowError> {
        let entry = self.build_entry(record, now);
        self.commit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Build the next entry without mutating the in-memory chain.
    pub fn build_entry(&self, record: AuditRecord, now: DateTime<Utc>) -> AuditEntry {
        let index = self.entries.len() as u64;
        let previous_hash = self.entries.last().map(|entry| entry.entry_hash.clone());
        let entry_hash = compute_entry_hash(
            index,
            &record.actor,
            &record.action,
            record.entity,
            &record.entity_id,
            &record.detail,
            now,
            previous_hash.as_deref(),
        );

        AuditEntry {
            index,
            actor: record.actor,
            action: record.action,
            entity: record.entity,
            entity_id: record.entity_id,
            detail: record.detail,
            timestamp: now,
            previous_hash,
            entry_hash,
        }
    }

    /// Commit a pre-built entry after external durability succeeds.
    pub fn commit_entry(&mut self, entry: AuditEntry) -> Result<(), WorkflowError> {
        let expected_index = self.entries.len() as u64;
        if entry.index != expected_index {
            return Err(WorkflowError::Audit(format!(
                "commit index mismatch: expected {}, got {}",
                expected_index, entry.index
            )));
        }

        let expected_previous_hash = self.entries.last().map(|e| e.entry_hash.clone());
        if entry.previous_hash != expected_previous_hash {
            return Err(WorkflowError::Audit(
                "commit previous hash mismatch".to_string(),
            ));
        }

        if entry.entry_hash != hash_of(&entry) {
            return Err(WorkflowError::Audit(
                "commit hash mismatch for audit entry".to_string(),
            ));
        }

        self.entries.push(entry);
        Ok(())
    }

    pub fn verify_chain(&self) -> bool {
        let mut previous_hash: Option<String> = None;
        for entry in &self.entries {
            if entry.previous_hash != previous_hash {
                return false;
            }
            if entry.entry_hash != hash_of(entry) {
                return false;
            }
            previous_hash = Some(entry.entry_hash.clone());
        }
        true
    }

    pub fn query(&self, filter: &AuditFilter) -> AuditPage {
        let mut items: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();

        if filter.descending {
            items.reverse();
        }

        let total = items.len();
        let items: Vec<AuditEntry> = items
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();

        AuditPage { total, items }
    }
}

/// Listing filter for audit queries
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub entity: Option<EntityKind>,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub descending: bool,
    pub offset: usize,
    pub limit: usize,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            entity: None,
            entity_id: None,
            actor: None,
            descending: true,
            offset: 0,
            limit: 100,
        }
    }
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity.map_or(true, |kind| entry.entity == kind)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| entry.entity_id == id)
            && self.actor.as_deref().map_or(true, |actor| entry.actor == actor)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditPage {
    pub total: usize,
    pub items: Vec<AuditEntry>,
}

fn hash_of(entry: &AuditEntry) -> String {
    compute_entry_hash(
        entry.index,
        &entry.actor,
        &entry.action,
        entry.entity,
        &entry.entity_id,
        &entry.detail,
        entry.timestamp,
        entry.previous_hash.as_deref(),
    )
}

#[allow(clippy::too_many_arguments)]
fn compute_entry_hash(
    index: u64,
    actor: &str,
    action: &str,
    entity: EntityKind,
    entity_id: &str,
    detail: &Value,
    timestamp: DateTime<Utc>,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "index": index,
        "actor": actor,
        "action": action,
        "entity": entity,
        "entity_id": entity_id,
        "detail": detail,
        "timestamp": timestamp,
        "previous_hash": previous_hash,
    });

    // `Value`'s Display is infallible and matches the compact serializer.
    blake3::hash(material.to_string().as_bytes())
        .to_hex()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oversight_types::{ActivityId, UserId};

    fn record(action: &str) -> AuditRecord {
        AuditRecord::new(UserId::generate(), action, EntityKind::Activity, ActivityId::generate())
            .with_detail(serde_json::json!({ "title": "Boreholes" }))
    }

    #[test]
    fn verifies_hash_chain() {
        let mut log = AuditLog::new();
        log.append(record("activity.created"), Utc::now()).unwrap();
        log.append(record("activity.locked"), Utc::now()).unwrap();

        assert_eq!(log.len(), 2);
        assert!(log.verify_chain());
        assert_eq!(
            log.entries()[1].previous_hash.as_deref(),
            Some(log.entries()[0].entry_hash.as_str())
        );
    }

    #[test]
    fn detects_tampered_entries() {
        let mut log = AuditLog::new();
        log.append(record("activity.created"), Utc::now()).unwrap();

        let mut tampered = log.clone();
        tampered.entries[0].detail = serde_json::json!({ "title": "Something else" });
        assert!(!tampered.verify_chain());
    }

    #[test]
    fn from_entries_rejects_gaps() {
        let mut log = AuditLog::new();
        log.append(record("a"), Utc::now()).unwrap();
        log.append(record("b"), Utc::now()).unwrap();

        let mut entries = log.entries().to_vec();
        entries.remove(0);
        let err = AuditLog::from_entries(entries).unwrap_err();
        assert!(err.to_string().contains("index gap"));

        let rehydrated = AuditLog::from_entries(log.entries().to_vec()).unwrap();
        assert!(rehydrated.verify_chain());
    }

    #[test]
    fn commit_refuses_out_of_order_entry() {
        let mut log = AuditLog::new();
        let first = log.build_entry(record("a"), Utc::now());
        log.commit_entry(first.clone()).unwrap();
        assert!(log.commit_entry(first).is_err());
    }

    #[test]
    fn query_filters_and_pages() {
        let mut log = AuditLog::new();
        let target = ActivityId::generate();
        for action in ["created", "locked", "updated"] {
            log.append(
                AuditRecord::new("system", action, EntityKind::Activity, target),
                Utc::now(),
            )
            .unwrap();
        }
        log.append(record("other"), Utc::now()).unwrap();

        let page = log.query(&AuditFilter {
            entity_id: Some(target.to_string()),
            limit: 2,
            ..AuditFilter::default()
        });
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].action, "updated");

        let ascending = log.query(&AuditFilter {
            entity_id: Some(target.to_string()),
            descending: false,
            ..AuditFilter::default()
        });
        assert_eq!(ascending.items[0].action, "created");
    }
}
