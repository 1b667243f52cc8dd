//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use oversight_types::{
    Activity, ActivityId, ApprovalStatus, Attachment, AttachmentId, AttachmentOwner, AuditEntry,
    BudgetRevision, InvestmentObjective, ObjectiveId, RevisionId, Settings, SpendEntry, SpendId,
    User, UserId,
};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Combined storage trait
#[async_trait]
pub trait Storage:
    UserStorage
    + ObjectiveStorage
    + ActivityStorage
    + SpendStorage
    + AttachmentStorage
    + RevisionStorage
    + AuditStorage
    + SettingsStorage
    + Send
    + Sync
{
    /// Backend name for health output
    fn backend(&self) -> &'static str;
}

/// Storage for user accounts
#[async_trait]
pub trait UserStorage: Send + Sync {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>>;

    /// Look up by normalized email
    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>>;

    async fn list_users(&self) -> StorageResult<Vec<User>>;

    /// Insert a new user; duplicate emails are a conflict
    async fn insert_user(&self, user: User) -> StorageResult<()>;

    async fn update_user(&self, user: User) -> StorageResult<()>;
}

/// Storage for investment objectives
#[async_trait]
pub trait ObjectiveStorage: Send + Sync {
    async fn get_objective(&self, id: &ObjectiveId) -> StorageResult<Option<InvestmentObjective>>;

    async fn list_objectives(&self) -> StorageResult<Vec<InvestmentObjective>>;

    /// Insert a new objective; duplicate codes are a conflict
    async fn insert_objective(&self, objective: InvestmentObjective) -> StorageResult<()>;

    /// Replace an objective if its stored version equals `expected_version`
    async fn update_objective(
        &self,
        objective: InvestmentObjective,
        expected_version: u64,
    ) -> StorageResult<()>;

    async fn delete_objective(&self, id: &ObjectiveId) -> StorageResult<bool>;
}

/// Storage for activities
#[async_trait]
pub trait ActivityStorage: Send + Sync {
    async fn get_activity(&self, id: &ActivityId) -> StorageResult<Option<Activity>>;

    async fn list_activities(&self) -> StorageResult<Vec<Activity>>;

    async fn list_activities_for_objective(
        &self,
        objective_id: &ObjectiveId,
    ) -> StorageResult<Vec<Activity>>;

    async fn insert_activity(&self, activity: Activity) -> StorageResult<()>;

    /// Compare-and-swap: replace the activity only if the stored version
    /// equals `expected_version`, otherwise [`StorageError::Conflict`]
    async fn update_activity(&self, activity: Activity, expected_version: u64) -> StorageResult<()>;

    /// Delete only if the stored version equals `expected_version`
    async fn delete_activity(&self, id: &ActivityId, expected_version: u64) -> StorageResult<bool>;
}

/// Storage for actual spend
#[async_trait]
pub trait SpendStorage: Send + Sync {
    async fn get_spend(&self, id: &SpendId) -> StorageResult<Option<SpendEntry>>;

    async fn list_spend(&self) -> StorageResult<Vec<SpendEntry>>;

    async fn list_spend_for_activity(&self, activity_id: &ActivityId)
        -> StorageResult<Vec<SpendEntry>>;

    async fn insert_spend(&self, entry: SpendEntry) -> StorageResult<()>;

    async fn delete_spend(&self, id: &SpendId) -> StorageResult<bool>;
}

/// Storage for attachment metadata
#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn get_attachment(&self, id: &AttachmentId) -> StorageResult<Option<Attachment>>;

    async fn list_attachments_for_owner(
        &self,
        owner: &AttachmentOwner,
    ) -> StorageResult<Vec<Attachment>>;

    /// Number of attachments sharing a blob
    async fn count_attachments_with_key(&self, storage_key: &str) -> StorageResult<usize>;

    async fn insert_attachment(&self, attachment: Attachment) -> StorageResult<()>;

    async fn delete_attachment(&self, id: &AttachmentId) -> StorageResult<bool>;
}

/// Filter for revision listings
#[derive(Debug, Clone, Default)]
pub struct RevisionFilter {
    pub status: Option<ApprovalStatus>,
    pub activity_id: Option<ActivityId>,
}

impl RevisionFilter {
    pub fn matches(&self, revision: &BudgetRevision) -> bool {
        self.status.map_or(true, |s| revision.status == s)
            && self.activity_id.map_or(true, |a| revision.activity_id == a)
    }
}

/// Storage for budget revisions
#[async_trait]
pub trait RevisionStorage: Send + Sync {
    async fn get_revision(&self, id: &RevisionId) -> StorageResult<Option<BudgetRevision>>;

    /// Newest first
    async fn list_revisions(&self, filter: &RevisionFilter) -> StorageResult<Vec<BudgetRevision>>;

    /// Insert a revision; a second open revision for the same activity is a conflict
    async fn insert_revision(&self, revision: BudgetRevision) -> StorageResult<()>;

    /// Replace a revision only while its stored status still equals `expected_status`
    async fn update_revision(
        &self,
        revision: BudgetRevision,
        expected_status: ApprovalStatus,
    ) -> StorageResult<()>;
}

/// Storage for the audit chain
#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// All entries in index order
    async fn load_audit_entries(&self) -> StorageResult<Vec<AuditEntry>>;

    /// Append one entry; an existing index is a conflict
    async fn append_audit_entry(&self, entry: &AuditEntry) -> StorageResult<()>;
}

/// Storage for runtime settings (singleton)
#[async_trait]
pub trait SettingsStorage: Send + Sync {
    async fn load_settings(&self) -> StorageResult<Option<Settings>>;

    async fn save_settings(&self, settings: &Settings) -> StorageResult<()>;
}
