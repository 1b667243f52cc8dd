//! PostgreSQL storage implementation
//!
//! Records are stored as JSONB documents next to the columns used for
//! lookups, uniqueness and version checks.

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use oversight_types::{
    normalize_email, Activity, ActivityId, ApprovalStatus, Attachment, AttachmentId,
    AttachmentOwner, AuditEntry, BudgetRevision, InvestmentObjective, ObjectiveId, RevisionId,
    Settings, SpendEntry, SpendId, User, UserId,
};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

/// PostgreSQL-backed storage
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to PostgreSQL and initialize schema
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS objectives (
                id UUID PRIMARY KEY,
                code TEXT NOT NULL UNIQUE,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS activities (
                id UUID PRIMARY KEY,
                objective_id UUID NOT NULL,
                version BIGINT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS activities_objective_id ON activities(objective_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS spend_entries (
                id UUID PRIMARY KEY,
                activity_id UUID NOT NULL,
                spent_on DATE NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS spend_entries_activity_id ON spend_entries(activity_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id UUID PRIMARY KEY,
                owner_kind TEXT NOT NULL,
                owner_id UUID NOT NULL,
                storage_key TEXT NOT NULL,
                data JSONB NOT NULL,
                uploaded_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS attachments_owner ON attachments(owner_kind, owner_id);"#,
            r#"CREATE INDEX IF NOT EXISTS attachments_storage_key ON attachments(storage_key);"#,
            r#"
            CREATE TABLE IF NOT EXISTS budget_revisions (
                id UUID PRIMARY KEY,
                activity_id UUID NOT NULL,
                status TEXT NOT NULL,
                data JSONB NOT NULL,
                submitted_at TIMESTAMPTZ NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS budget_revisions_activity_id ON budget_revisions(activity_id);"#,
            r#"CREATE INDEX IF NOT EXISTS budget_revisions_status ON budget_revisions(status);"#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS budget_revisions_one_open
                ON budget_revisions(activity_id)
                WHERE status IN ('submitted', 'finance_approved');
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                entry_index BIGINT PRIMARY KEY,
                actor TEXT NOT NULL,
                action TEXT NOT NULL,
                entity TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                entry_timestamp TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL,
                previous_hash TEXT NULL,
                entry_hash TEXT NOT NULL
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS audit_entries_entity ON audit_entries(entity, entity_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
        serde_json::to_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json serialize error: {}", e)))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
        serde_json::from_value(value)
            .map_err(|e| StorageError::InvalidData(format!("json deserialize error: {}", e)))
    }

    fn version_param(version: u64) -> Result<i64, StorageError> {
        i64::try_from(version)
            .map_err(|_| StorageError::InvalidData(format!("version {version} out of range")))
    }

    async fn fetch_one_data<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        id: uuid::Uuid,
    ) -> StorageResult<Option<T>> {
        let row = sqlx::query(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(record) => {
                let data: Value = record.try_get("data").map_err(query_error)?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    fn decode_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<sqlx::postgres::PgRow>,
    ) -> StorageResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                let data: Value = row.try_get("data").map_err(query_error)?;
                Self::from_json(data)
            })
            .collect()
    }

    /// Distinguish a missing row from a version mismatch after a failed CAS.
    async fn cas_failure(&self, table: &str, id: uuid::Uuid, expected: u64) -> StorageError {
        let sql = format!("SELECT version FROM {table} WHERE id = $1");
        match sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await {
            Ok(Some(row)) => {
                let found: i64 = row.try_get("version").unwrap_or_default();
                StorageError::Conflict(format!(
                    "{table} version mismatch: expected {expected}, found {found}"
                ))
            }
            Ok(None) => StorageError::NotFound(format!("{table} {id}")),
            Err(e) => query_error(e),
        }
    }
}

fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::Query(e.to_string())
}

/// Unique-key violations become conflicts, everything else a query error
fn write_error(e: sqlx::Error, what: &str) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(format!("{what} already exists"))
        }
        _ => query_error(e),
    }
}

fn owner_columns(owner: &AttachmentOwner) -> (&'static str, uuid::Uuid) {
    match owner {
        AttachmentOwner::Activity(id) => ("activity", *id.as_uuid()),
        AttachmentOwner::Spend(id) => ("spend", *id.as_uuid()),
    }
}

impl Storage for PostgresStorage {
    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl UserStorage for PostgresStorage {
    async fn get_user(&self, id: &UserId) -> StorageResult<Option<User>> {
        self.fetch_one_data("SELECT data FROM users WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn get_user_by_email(&self, email: &str) -> StorageResult<Option<User>> {
        let row = sqlx::query("SELECT data FROM users WHERE email = $1")
            .bind(normalize_email(email))
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(record) => {
                let data: Value = record.try_get("data").map_err(query_error)?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> StorageResult<Vec<User>> {
        let rows = sqlx::query("SELECT data FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn insert_user(&self, user: User) -> StorageResult<()> {
        let data = Self::to_json(&user)?;
        sqlx::query("INSERT INTO users (id, email, data, updated_at) VALUES ($1, $2, $3, $4)")
            .bind(*user.id.as_uuid())
            .bind(&user.email)
            .bind(data)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, &format!("user with email {}", user.email)))?;
        Ok(())
    }

    async fn update_user(&self, user: User) -> StorageResult<()> {
        let data = Self::to_json(&user)?;
        let result =
            sqlx::query("UPDATE users SET email = $2, data = $3, updated_at = $4 WHERE id = $1")
                .bind(*user.id.as_uuid())
                .bind(&user.email)
                .bind(data)
                .bind(user.updated_at)
                .execute(&self.pool)
                .await
                .map_err(|e| write_error(e, &format!("user with email {}", user.email)))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("user {}", user.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectiveStorage for PostgresStorage {
    async fn get_objective(&self, id: &ObjectiveId) -> StorageResult<Option<InvestmentObjective>> {
        self.fetch_one_data("SELECT data FROM objectives WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn list_objectives(&self) -> StorageResult<Vec<InvestmentObjective>> {
        let rows = sqlx::query("SELECT data FROM objectives ORDER BY code")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn insert_objective(&self, objective: InvestmentObjective) -> StorageResult<()> {
        let data = Self::to_json(&objective)?;
        sqlx::query(
            r#"
            INSERT INTO objectives (id, code, version, data, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*objective.id.as_uuid())
        .bind(&objective.code)
        .bind(Self::version_param(objective.version)?)
        .bind(data)
        .bind(objective.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("objective code {}", objective.code)))?;
        Ok(())
    }

    async fn update_objective(
        &self,
        objective: InvestmentObjective,
        expected_version: u64,
    ) -> StorageResult<()> {
        let data = Self::to_json(&objective)?;
        let result = sqlx::query(
            r#"
            UPDATE objectives
            SET code = $2, version = $3, data = $4, updated_at = $5
            WHERE id = $1 AND version = $6
            "#,
        )
        .bind(*objective.id.as_uuid())
        .bind(&objective.code)
        .bind(Self::version_param(objective.version)?)
        .bind(data)
        .bind(objective.updated_at)
        .bind(Self::version_param(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("objective code {}", objective.code)))?;

        if result.rows_affected() == 0 {
            return Err(self
                .cas_failure("objectives", *objective.id.as_uuid(), expected_version)
                .await);
        }
        Ok(())
    }

    async fn delete_objective(&self, id: &ObjectiveId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM objectives WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ActivityStorage for PostgresStorage {
    async fn get_activity(&self, id: &ActivityId) -> StorageResult<Option<Activity>> {
        self.fetch_one_data("SELECT data FROM activities WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn list_activities(&self) -> StorageResult<Vec<Activity>> {
        let rows = sqlx::query("SELECT data FROM activities ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn list_activities_for_objective(
        &self,
        objective_id: &ObjectiveId,
    ) -> StorageResult<Vec<Activity>> {
        let rows =
            sqlx::query("SELECT data FROM activities WHERE objective_id = $1 ORDER BY created_at")
                .bind(*objective_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn insert_activity(&self, activity: Activity) -> StorageResult<()> {
        let data = Self::to_json(&activity)?;
        sqlx::query(
            r#"
            INSERT INTO activities (id, objective_id, version, data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*activity.id.as_uuid())
        .bind(*activity.objective_id.as_uuid())
        .bind(Self::version_param(activity.version)?)
        .bind(data)
        .bind(activity.created_at)
        .bind(activity.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("activity {}", activity.id)))?;
        Ok(())
    }

    async fn update_activity(&self, activity: Activity, expected_version: u64) -> StorageResult<()> {
        let data = Self::to_json(&activity)?;
        let result = sqlx::query(
            r#"
            UPDATE activities
            SET version = $2, data = $3, updated_at = $4
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(*activity.id.as_uuid())
        .bind(Self::version_param(activity.version)?)
        .bind(data)
        .bind(activity.updated_at)
        .bind(Self::version_param(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(query_error)?;

        if result.rows_affected() == 0 {
            return Err(self
                .cas_failure("activities", *activity.id.as_uuid(), expected_version)
                .await);
        }
        Ok(())
    }

    async fn delete_activity(&self, id: &ActivityId, expected_version: u64) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM activities WHERE id = $1 AND version = $2")
            .bind(*id.as_uuid())
            .bind(Self::version_param(expected_version)?)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self
            .cas_failure("activities", *id.as_uuid(), expected_version)
            .await
        {
            StorageError::NotFound(_) => Ok(false),
            other => Err(other),
        }
    }
}

#[async_trait]
impl SpendStorage for PostgresStorage {
    async fn get_spend(&self, id: &SpendId) -> StorageResult<Option<SpendEntry>> {
        self.fetch_one_data("SELECT data FROM spend_entries WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn list_spend(&self) -> StorageResult<Vec<SpendEntry>> {
        let rows = sqlx::query("SELECT data FROM spend_entries ORDER BY spent_on, created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn list_spend_for_activity(
        &self,
        activity_id: &ActivityId,
    ) -> StorageResult<Vec<SpendEntry>> {
        let rows = sqlx::query(
            "SELECT data FROM spend_entries WHERE activity_id = $1 ORDER BY spent_on, created_at",
        )
        .bind(*activity_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn insert_spend(&self, entry: SpendEntry) -> StorageResult<()> {
        let data = Self::to_json(&entry)?;
        sqlx::query(
            r#"
            INSERT INTO spend_entries (id, activity_id, spent_on, data, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*entry.id.as_uuid())
        .bind(*entry.activity_id.as_uuid())
        .bind(entry.spent_on)
        .bind(data)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("spend entry {}", entry.id)))?;
        Ok(())
    }

    async fn delete_spend(&self, id: &SpendId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM spend_entries WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AttachmentStorage for PostgresStorage {
    async fn get_attachment(&self, id: &AttachmentId) -> StorageResult<Option<Attachment>> {
        self.fetch_one_data("SELECT data FROM attachments WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn list_attachments_for_owner(
        &self,
        owner: &AttachmentOwner,
    ) -> StorageResult<Vec<Attachment>> {
        let (kind, owner_id) = owner_columns(owner);
        let rows = sqlx::query(
            r#"
            SELECT data FROM attachments
            WHERE owner_kind = $1 AND owner_id = $2
            ORDER BY uploaded_at
            "#,
        )
        .bind(kind)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn count_attachments_with_key(&self, storage_key: &str) -> StorageResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM attachments WHERE storage_key = $1")
            .bind(storage_key)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        let total: i64 = row.try_get("total").map_err(query_error)?;
        Ok(total.max(0) as usize)
    }

    async fn insert_attachment(&self, attachment: Attachment) -> StorageResult<()> {
        let (kind, owner_id) = owner_columns(&attachment.owner);
        let data = Self::to_json(&attachment)?;
        sqlx::query(
            r#"
            INSERT INTO attachments (id, owner_kind, owner_id, storage_key, data, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(*attachment.id.as_uuid())
        .bind(kind)
        .bind(owner_id)
        .bind(&attachment.storage_key)
        .bind(data)
        .bind(attachment.uploaded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("attachment {}", attachment.id)))?;
        Ok(())
    }

    async fn delete_attachment(&self, id: &AttachmentId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM attachments WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevisionStorage for PostgresStorage {
    async fn get_revision(&self, id: &RevisionId) -> StorageResult<Option<BudgetRevision>> {
        self.fetch_one_data("SELECT data FROM budget_revisions WHERE id = $1", *id.as_uuid())
            .await
    }

    async fn list_revisions(&self, filter: &RevisionFilter) -> StorageResult<Vec<BudgetRevision>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM budget_revisions
            WHERE ($1::TEXT IS NULL OR status = $1)
              AND ($2::UUID IS NULL OR activity_id = $2)
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(filter.status.map(|s| s.name()))
        .bind(filter.activity_id.map(|a| *a.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;
        Self::decode_rows(rows)
    }

    async fn insert_revision(&self, revision: BudgetRevision) -> StorageResult<()> {
        let data = Self::to_json(&revision)?;
        sqlx::query(
            r#"
            INSERT INTO budget_revisions (id, activity_id, status, data, submitted_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*revision.id.as_uuid())
        .bind(*revision.activity_id.as_uuid())
        .bind(revision.status.name())
        .bind(data)
        .bind(revision.submitted_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(e, &format!("open revision for activity {}", revision.activity_id))
        })?;
        Ok(())
    }

    async fn update_revision(
        &self,
        revision: BudgetRevision,
        expected_status: ApprovalStatus,
    ) -> StorageResult<()> {
        let data = Self::to_json(&revision)?;
        let result = sqlx::query(
            "UPDATE budget_revisions SET status = $2, data = $3 WHERE id = $1 AND status = $4",
        )
        .bind(*revision.id.as_uuid())
        .bind(revision.status.name())
        .bind(data)
        .bind(expected_status.name())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            write_error(e, &format!("open revision for activity {}", revision.activity_id))
        })?;

        if result.rows_affected() == 0 {
            let found = sqlx::query("SELECT status FROM budget_revisions WHERE id = $1")
                .bind(*revision.id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;
            return Err(match found {
                Some(row) => {
                    let status: String = row.try_get("status").map_err(query_error)?;
                    StorageError::Conflict(format!(
                        "revision {} status mismatch: expected {}, found {}",
                        revision.id, expected_status, status
                    ))
                }
                None => StorageError::NotFound(format!("revision {}", revision.id)),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStorage for PostgresStorage {
    async fn load_audit_entries(&self) -> StorageResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT
                entry_index,
                actor,
                action,
                entity,
                entity_id,
                entry_timestamp,
                data,
                previous_hash,
                entry_hash
            FROM audit_entries
            ORDER BY entry_index ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let index: i64 = row.try_get("entry_index").map_err(query_error)?;
            let entity: String = row.try_get("entity").map_err(query_error)?;

            entries.push(AuditEntry {
                index: index
                    .try_into()
                    .map_err(|_| StorageError::InvalidData("negative audit index".to_string()))?,
                actor: row.try_get("actor").map_err(query_error)?,
                action: row.try_get("action").map_err(query_error)?,
                entity: entity.parse().map_err(StorageError::InvalidData)?,
                entity_id: row.try_get("entity_id").map_err(query_error)?,
                detail: row.try_get("data").map_err(query_error)?,
                timestamp: row.try_get("entry_timestamp").map_err(query_error)?,
                previous_hash: row.try_get("previous_hash").map_err(query_error)?,
                entry_hash: row.try_get("entry_hash").map_err(query_error)?,
            });
        }

        Ok(entries)
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> StorageResult<()> {
        let index = i64::try_from(entry.index)
            .map_err(|_| StorageError::InvalidData("audit index out of range".to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO audit_entries (
                entry_index, actor, action, entity, entity_id,
                entry_timestamp, data, previous_hash, entry_hash
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(index)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(entry.entity.name())
        .bind(&entry.entity_id)
        .bind(entry.timestamp)
        .bind(&entry.detail)
        .bind(&entry.previous_hash)
        .bind(&entry.entry_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("audit entry {}", entry.index)))?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStorage for PostgresStorage {
    async fn load_settings(&self) -> StorageResult<Option<Settings>> {
        let row = sqlx::query("SELECT data FROM settings WHERE id = 'global'")
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        match row {
            Some(record) => {
                let data: Value = record.try_get("data").map_err(query_error)?;
                Ok(Some(Self::from_json(data)?))
            }
            None => Ok(None),
        }
    }

    async fn save_settings(&self, settings: &Settings) -> StorageResult<()> {
        let data = Self::to_json(settings)?;
        sqlx::query(
            r#"
            INSERT INTO settings (id, data, updated_at)
            VALUES ('global', $1, $2)
            ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await
        .map_err(query_error)?;
        Ok(())
    }
}
