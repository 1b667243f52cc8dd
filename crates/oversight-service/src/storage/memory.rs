//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use oversight_types::{
    normalize_email, Activity, ActivityId, ApprovalStatus, Attachment, AttachmentId,
    AttachmentOwner, AuditEntry, BudgetRevision, InvestmentObjective, ObjectiveId, RevisionId,
    Settings, SpendEntry, SpendId, User, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug)]
pub struct InMemoryStorage {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    objectives: Arc<RwLock<HashMap<ObjectiveId, InvestmentObjective>>>,
    activities: Arc<RwLock<HashMap<ActivityId, Activity>>>,
    spend: Arc<RwLock<HashMap<SpendId, SpendEntry>>>,
    attachments: Arc<RwLock<HashMap<AttachmentId, Attachment>>>,
    revisions: Arc<RwLock<HashMap<RevisionId, BudgetRevision>>>,
    audit: Arc<RwLock<Vec<AuditEntry>>>,
    settings: Arc<RwLock<Option<Settings>>>,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(HashMap::new())),
            objectives: Arc::new(RwLock::new(HashMap::new())),
            activities: Arc::new(RwLock::new(HashMap::new())),
            spend: Arc::new(RwLock::new(HashMap::new())),
            attachments: Arc::new(RwLock::new(HashMap::new())),
            revisions: Arc::new(RwLock::new(HashMap::new())),
            audit: Arc::new(RwLock::new(Vec::new())),
            settings: Arc::new(RwLock::new(None)),
        }
    }
}

impl Storage for InMemoryStorage {
    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl UserStorage for InMemoryStorage {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let users = self.users.read().await;
        let mut list: Vec<User> = users.values().cloned().collect();
        list.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(list)
    }

    async fn insert_user(&self, user: User) -> StorageResult<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(StorageError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        users.insert(user.id, user);
        Ok(())
    }

    async fn update_user(&self, user: User) -> StorageResult<()> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StorageError::Conflict(format!(
                "user with email {} already exists",
                user.email
            )));
        }
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("user {}", user.id))),
        }
    }
}

#[async_trait]
impl ObjectiveStorage for InMemoryStorage {
    async fn get_objective(&self, id: &ObjectiveId) -> StorageResult<Option<InvestmentObjective>> {
        let objectives = self.objectives.read().await;
        Ok(objectives.get(id).cloned())
    }

    async fn list_objectives(&self) -> StorageResult<Vec<InvestmentObjective>> {
        let objectives = self.objectives.read().await;
        let mut list: Vec<InvestmentObjective> = objectives.values().cloned().collect();
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }

    async fn insert_objective(&self, objective: InvestmentObjective) -> StorageResult<()> {
        let mut objectives = self.objectives.write().await;
        if objectives.values().any(|o| o.code == objective.code) {
            return Err(StorageError::Conflict(format!(
                "objective code {} already exists",
                objective.code
            )));
        }
        objectives.insert(objective.id, objective);
        Ok(())
    }

    async fn update_objective(
        &self,
        objective: InvestmentObjective,
        expected_version: u64,
    ) -> StorageResult<()> {
        let mut objectives = self.objectives.write().await;
        if objectives
            .values()
            .any(|o| o.id != objective.id && o.code == objective.code)
        {
            return Err(StorageError::Conflict(format!(
                "objective code {} already exists",
                objective.code
            )));
        }
        let existing = objectives
            .get_mut(&objective.id)
            .ok_or_else(|| StorageError::NotFound(format!("objective {}", objective.id)))?;
        if existing.version != expected_version {
            return Err(version_conflict("objective", expected_version, existing.version));
        }
        *existing = objective;
        Ok(())
    }

    async fn delete_objective(&self, id: &ObjectiveId) -> StorageResult<bool> {
        let mut objectives = self.objectives.write().await;
        Ok(objectives.remove(id).is_some())
    }
}

#[async_trait]
impl ActivityStorage for InMemoryStorage {
    async fn get_activity(&self, id: &ActivityId) -> StorageResult<Option<Activity>> {
        let activities = self.activities.read().await;
        Ok(activities.get(id).cloned())
    }

    async fn list_activities(&self) -> StorageResult<Vec<Activity>> {
        let activities = self.activities.read().await;
        let mut list: Vec<Activity> = activities.values().cloned().collect();
        list.sort_by_key(|a| a.created_at);
        Ok(list)
    }

    async fn list_activities_for_objective(
        &self,
        objective_id: &ObjectiveId,
    ) -> StorageResult<Vec<Activity>> {
        let activities = self.activities.read().await;
        let mut list: Vec<Activity> = activities
            .values()
            .filter(|a| &a.objective_id == objective_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.created_at);
        Ok(list)
    }

    async fn insert_activity(&self, activity: Activity) -> StorageResult<()> {
        let mut activities = self.activities.write().await;
        if activities.contains_key(&activity.id) {
            return Err(StorageError::Conflict(format!(
                "activity {} already exists",
                activity.id
            )));
        }
        activities.insert(activity.id, activity);
        Ok(())
    }

    async fn update_activity(&self, activity: Activity, expected_version: u64) -> StorageResult<()> {
        let mut activities = self.activities.write().await;
        let existing = activities
            .get_mut(&activity.id)
            .ok_or_else(|| StorageError::NotFound(format!("activity {}", activity.id)))?;
        if existing.version != expected_version {
            return Err(version_conflict("activity", expected_version, existing.version));
        }
        *existing = activity;
        Ok(())
    }

    async fn delete_activity(&self, id: &ActivityId, expected_version: u64) -> StorageResult<bool> {
        let mut activities = self.activities.write().await;
        match activities.get(id) {
            None => Ok(false),
            Some(existing) if existing.version != expected_version => Err(version_conflict(
                "activity",
                expected_version,
                existing.version,
            )),
            Some(_) => Ok(activities.remove(id).is_some()),
        }
    }
}

#[async_trait]
impl SpendStorage for InMemoryStorage {
    async fn get_spend(&self, id: &SpendId) -> StorageResult<Option<SpendEntry>> {
        let spend = self.spend.read().await;
        Ok(spend.get(id).cloned())
    }

    async fn list_spend(&self) -> StorageResult<Vec<SpendEntry>> {
        let spend = self.spend.read().await;
        let mut list: Vec<SpendEntry> = spend.values().cloned().collect();
        list.sort_by(|a, b| a.spent_on.cmp(&b.spent_on).then(a.created_at.cmp(&b.created_at)));
        Ok(list)
    }

    async fn list_spend_for_activity(
        &self,
        activity_id: &ActivityId,
    ) -> StorageResult<Vec<SpendEntry>> {
        let spend = self.spend.read().await;
        let mut list: Vec<SpendEntry> = spend
            .values()
            .filter(|s| &s.activity_id == activity_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.spent_on.cmp(&b.spent_on).then(a.created_at.cmp(&b.created_at)));
        Ok(list)
    }

    async fn insert_spend(&self, entry: SpendEntry) -> StorageResult<()> {
        let mut spend = self.spend.write().await;
        spend.insert(entry.id, entry);
        Ok(())
    }

    async fn delete_spend(&self, id: &SpendId) -> StorageResult<bool> {
        let mut spend = self.spend.write().await;
        Ok(spend.remove(id).is_some())
    }
}

#[async_trait]
impl AttachmentStorage for InMemoryStorage {
    async fn get_attachment(&self, id: &AttachmentId) -> StorageResult<Option<Attachment>> {
        let attachments = self.attachments.read().await;
        Ok(attachments.get(id).cloned())
    }

    async fn list_attachments_for_owner(
        &self,
        owner: &AttachmentOwner,
    ) -> StorageResult<Vec<Attachment>> {
        let attachments = self.attachments.read().await;
        let mut list: Vec<Attachment> = attachments
            .values()
            .filter(|a| &a.owner == owner)
            .cloned()
            .collect();
        list.sort_by_key(|a| a.uploaded_at);
        Ok(list)
    }

    async fn count_attachments_with_key(&self, storage_key: &str) -> StorageResult<usize> {
        let attachments = self.attachments.read().await;
        Ok(attachments
            .values()
            .filter(|a| a.storage_key == storage_key)
            .count())
    }

    async fn insert_attachment(&self, attachment: Attachment) -> StorageResult<()> {
        let mut attachments = self.attachments.write().await;
        attachments.insert(attachment.id, attachment);
        Ok(())
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> StorageResult<bool> {
        let mut attachments = self.attachments.write().await;
        Ok(attachments.remove(id).is_some())
    }
}

#[async_trait]
impl RevisionStorage for InMemoryStorage {
    async fn get_revision(&self, id: &RevisionId) -> StorageResult<Option<BudgetRevision>> {
        let revisions = self.revisions.read().await;
        Ok(revisions.get(id).cloned())
    }

    async fn list_revisions(&self, filter: &RevisionFilter) -> StorageResult<Vec<BudgetRevision>> {
        let revisions = self.revisions.read().await;
        let mut list: Vec<BudgetRevision> = revisions
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(list)
    }

    async fn insert_revision(&self, revision: BudgetRevision) -> StorageResult<()> {
        let mut revisions = self.revisions.write().await;
        if !revision.status.is_terminal()
            && revisions
                .values()
                .any(|r| r.activity_id == revision.activity_id && !r.status.is_terminal())
        {
            return Err(StorageError::Conflict(format!(
                "activity {} already has an open revision",
                revision.activity_id
            )));
        }
        revisions.insert(revision.id, revision);
        Ok(())
    }

    async fn update_revision(
        &self,
        revision: BudgetRevision,
        expected_status: ApprovalStatus,
    ) -> StorageResult<()> {
        let mut revisions = self.revisions.write().await;
        match revisions.get_mut(&revision.id) {
            Some(existing) if existing.status != expected_status => {
                Err(StorageError::Conflict(format!(
                    "revision {} status mismatch: expected {}, found {}",
                    revision.id, expected_status, existing.status
                )))
            }
            Some(existing) => {
                *existing = revision;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("revision {}", revision.id))),
        }
    }
}

#[async_trait]
impl AuditStorage for InMemoryStorage {
    async fn load_audit_entries(&self) -> StorageResult<Vec<AuditEntry>> {
        let audit = self.audit.read().await;
        Ok(audit.clone())
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> StorageResult<()> {
        let mut audit = self.audit.write().await;
        if entry.index != audit.len() as u64 {
            return Err(StorageError::Conflict(format!(
                "audit index {} does not follow {}",
                entry.index,
                audit.len()
            )));
        }
        audit.push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl SettingsStorage for InMemoryStorage {
    async fn load_settings(&self) -> StorageResult<Option<Settings>> {
        let settings = self.settings.read().await;
        Ok(settings.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> StorageResult<()> {
        let mut stored = self.settings.write().await;
        *stored = Some(settings.clone());
        Ok(())
    }
}

fn version_conflict(kind: &str, expected: u64, actual: u64) -> StorageError {
    StorageError::Conflict(format!(
        "{kind} version mismatch: expected {expected}, found {actual}"
    ))
}
