use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::SyncKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionState {
    #[default]
    NotDone,
    Done,
}

impl CompletionState {
    pub fn from_completed(completed: bool) -> Self {
        if completed { Self::Done } else { Self::NotDone }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDone => "not_done",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_done" => Ok(Self::NotDone),
            "done" => Ok(Self::Done),
            other => Err(format!("unknown completion state: {other}")),
        }
    }
}

/// Persisted correspondence between an upstream key and its downstream task,
/// plus the field snapshot last written downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub parent_id: i64,
    pub record_id: i64,
    pub target_task_id: Option<String>,
    /// Task this mapping pointed at before the record was archived and came back.
    pub previous_target_task_id: Option<String>,
    pub completion_state: CompletionState,
    pub due_date: Option<NaiveDate>,
    pub title: String,
    /// Assigned by the store on every save/archive.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Assigned by the store on first insert and never changed afterwards.
    pub created_at: Option<DateTime<Utc>>,
    pub archived: bool,
}

impl MappingRecord {
    pub fn new(key: SyncKey, target_task_id: impl Into<String>) -> Self {
        Self {
            parent_id: key.parent_id,
            record_id: key.record_id,
            target_task_id: Some(target_task_id.into()),
            previous_target_task_id: None,
            completion_state: CompletionState::NotDone,
            due_date: None,
            title: String::new(),
            last_synced_at: None,
            created_at: None,
            archived: false,
        }
    }

    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.parent_id, self.record_id)
    }

    pub fn is_synced(&self) -> bool {
        self.target_task_id.is_some()
    }
}

/// Raw row shape of `sync_mappings`.
#[derive(Debug, FromRow)]
pub struct MappingRow {
    pub parent_id: i64,
    pub record_id: i64,
    pub target_task_id: Option<String>,
    pub previous_target_task_id: Option<String>,
    pub completion_state: String,
    pub due_date: Option<NaiveDate>,
    pub title: String,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub archived: bool,
}

impl TryFrom<MappingRow> for MappingRecord {
    type Error = sqlx::Error;

    fn try_from(row: MappingRow) -> Result<Self, Self::Error> {
        let completion_state = row
            .completion_state
            .parse::<CompletionState>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;

        Ok(Self {
            parent_id: row.parent_id,
            record_id: row.record_id,
            target_task_id: row.target_task_id,
            previous_target_task_id: row.previous_target_task_id,
            completion_state,
            due_date: row.due_date,
            title: row.title,
            last_synced_at: Some(row.last_synced_at),
            created_at: Some(row.created_at),
            archived: row.archived,
        })
    }
}

/// Aggregate counts over the store, used by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStatus {
    pub total: i64,
    pub active: i64,
    pub archived: i64,
    pub completed: i64,
    pub pending: i64,
}
