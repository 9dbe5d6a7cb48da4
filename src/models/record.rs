use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// External identity of an upstream item: (course id, assignment id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SyncKey {
    pub parent_id: i64,
    pub record_id: i64,
}

impl SyncKey {
    pub fn new(parent_id: i64, record_id: i64) -> Self {
        Self { parent_id, record_id }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.parent_id, self.record_id)
    }
}

/// An assignment as listed by the upstream system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: i64,
    pub parent_id: i64,
    pub parent_name: String,
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub html_url: Option<String>,
    pub completed: bool,
}

impl SourceRecord {
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.parent_id, self.id)
    }

    /// Title written downstream, prefixed with the course label.
    pub fn display_title(&self) -> String {
        format!("[{}] {}", self.parent_name, self.title)
    }

    /// Due comparisons are date-granular; the time of day is dropped.
    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_at.map(|due| due.date_naive())
    }
}
