use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::models::{MappingRecord, MappingRow, StoreStatus, SyncKey};

const SELECT_MAPPING: &str = r#"
    SELECT
        parent_id,
        record_id,
        target_task_id,
        previous_target_task_id,
        completion_state,
        due_date,
        title,
        last_synced_at,
        created_at,
        archived
    FROM sync_mappings
"#;

/// Durable source-to-target correspondence backed by SQLite.
///
/// Every write is a single transaction. The store assumes one writer (one
/// reconciliation run) at a time; readers may overlap.
#[derive(Clone)]
pub struct MappingStore {
    db: SqlitePool,
}

impl MappingStore {
    /// Opens (creating if needed) the database file and applies pending migrations.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(sqlx::Error::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self::from_pool(pool).await?;
        info!("Mapping store initialized at {}", path.display());
        Ok(store)
    }

    /// Single-connection in-memory store; the database lives as long as the pool.
    pub async fn in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Runs the forward-only migration check against an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { db: pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn get(&self, key: SyncKey) -> Result<Option<MappingRecord>, sqlx::Error> {
        let sql = format!("{SELECT_MAPPING} WHERE parent_id = ?1 AND record_id = ?2");
        sqlx::query_as::<_, MappingRow>(&sql)
            .bind(key.parent_id)
            .bind(key.record_id)
            .fetch_optional(&self.db)
            .await?
            .map(MappingRecord::try_from)
            .transpose()
    }

    pub async fn get_by_target_id(
        &self,
        target_task_id: &str,
    ) -> Result<Option<MappingRecord>, sqlx::Error> {
        let sql = format!("{SELECT_MAPPING} WHERE target_task_id = ?1");
        sqlx::query_as::<_, MappingRow>(&sql)
            .bind(target_task_id)
            .fetch_optional(&self.db)
            .await?
            .map(MappingRecord::try_from)
            .transpose()
    }

    /// All mappings ordered by key.
    pub async fn list(&self, include_archived: bool) -> Result<Vec<MappingRecord>, sqlx::Error> {
        let filter = if include_archived { "" } else { "WHERE archived = 0" };
        let sql = format!("{SELECT_MAPPING} {filter} ORDER BY parent_id, record_id");

        sqlx::query_as::<_, MappingRow>(&sql)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(MappingRecord::try_from)
            .collect()
    }

    /// Upserts a mapping and returns the stored row.
    ///
    /// `last_synced_at` is always set to now. `created_at` is set on first insert
    /// only; the values carried by `record` for both timestamps are ignored.
    pub async fn save(&self, record: &MappingRecord) -> Result<MappingRecord, sqlx::Error> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sync_mappings
                (parent_id, record_id, target_task_id, previous_target_task_id,
                completion_state, due_date, title, last_synced_at, created_at, archived)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(parent_id, record_id) DO UPDATE SET
                target_task_id = excluded.target_task_id,
                previous_target_task_id = excluded.previous_target_task_id,
                completion_state = excluded.completion_state,
                due_date = excluded.due_date,
                title = excluded.title,
                last_synced_at = excluded.last_synced_at,
                archived = excluded.archived
            "#,
        )
        .bind(record.parent_id)
        .bind(record.record_id)
        .bind(&record.target_task_id)
        .bind(&record.previous_target_task_id)
        .bind(record.completion_state.as_str())
        .bind(record.due_date)
        .bind(&record.title)
        .bind(now)
        .bind(now)
        .bind(record.archived)
        .execute(&mut *tx)
        .await?;

        let sql = format!("{SELECT_MAPPING} WHERE parent_id = ?1 AND record_id = ?2");
        let row = sqlx::query_as::<_, MappingRow>(&sql)
            .bind(record.parent_id)
            .bind(record.record_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("Saved mapping {}", record.key());
        MappingRecord::try_from(row)
    }

    /// Soft-deletes a mapping. Returns false, touching nothing, for unknown keys.
    pub async fn archive(&self, key: SyncKey) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE sync_mappings
            SET archived = 1,
                last_synced_at = ?1
            WHERE parent_id = ?2 AND record_id = ?3
            "#,
        )
        .bind(now)
        .bind(key.parent_id)
        .bind(key.record_id)
        .execute(&self.db)
        .await?
        .rows_affected();

        if result > 0 {
            info!("Archived mapping {}", key);
        }
        Ok(result > 0)
    }

    /// Keys that have a downstream task and are not archived.
    pub async fn active_synced_keys(&self) -> Result<BTreeSet<SyncKey>, sqlx::Error> {
        let rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT parent_id, record_id
            FROM sync_mappings
            WHERE target_task_id IS NOT NULL AND archived = 0
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(parent_id, record_id)| SyncKey::new(parent_id, record_id))
            .collect())
    }

    pub async fn count(&self, include_archived: bool) -> Result<i64, sqlx::Error> {
        let sql = if include_archived {
            "SELECT COUNT(*) FROM sync_mappings"
        } else {
            "SELECT COUNT(*) FROM sync_mappings WHERE archived = 0"
        };
        sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.db).await
    }

    pub async fn status(&self) -> Result<StoreStatus, sqlx::Error> {
        let (total, active, completed) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN archived = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN archived = 0 AND completion_state = 'done' THEN 1 ELSE 0 END), 0)
            FROM sync_mappings
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        Ok(StoreStatus {
            total,
            active,
            archived: total - active,
            completed,
            pending: active - completed,
        })
    }

    /// Deletes every mapping. Reset/test use only.
    pub async fn clear(&self) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sync_mappings")
            .execute(&self.db)
            .await?;
        warn!("All sync mappings cleared");
        Ok(())
    }
}
