use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{CompletionState, SourceRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "notStarted")]
    NotStarted,
    #[serde(rename = "inProgress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "waitingOnOthers")]
    WaitingOnOthers,
    #[serde(rename = "deferred")]
    Deferred,
}

impl From<CompletionState> for TaskStatus {
    fn from(state: CompletionState) -> Self {
        match state {
            CompletionState::Done => TaskStatus::Completed,
            CompletionState::NotDone => TaskStatus::NotStarted,
        }
    }
}

/// A downstream container (task list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContainer {
    pub id: String,
    pub display_name: String,
}

/// A downstream task as returned by create/update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTask {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
}

/// Everything needed to create a downstream task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDraft {
    pub title: String,
    pub body: String,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
}

impl TaskDraft {
    pub fn for_record(
        record: &SourceRecord,
        title: String,
        due_date: Option<NaiveDate>,
        completion: CompletionState,
    ) -> Self {
        let body = format!(
            "Canvas Assignment\n\
             ================\n\
             Course ID: {}\n\
             Assignment ID: {}\n\
             URL: {}\n\
             \n\
             ---\n\
             Synced from Canvas LMS",
            record.parent_id,
            record.id,
            record.html_url.as_deref().unwrap_or(""),
        );

        Self {
            title,
            body,
            due_date,
            status: completion.into(),
        }
    }
}

/// One tracked field that changed since the last sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Status(TaskStatus),
    /// `None` clears the downstream due date.
    DueDate(Option<NaiveDate>),
    Title(String),
}

/// Partial update carrying only the fields that actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldChangeSet {
    changes: Vec<FieldChange>,
}

impl FieldChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a change, replacing an earlier change of the same field.
    pub fn push(&mut self, change: FieldChange) {
        self.changes
            .retain(|existing| std::mem::discriminant(existing) != std::mem::discriminant(&change));
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.changes
            .iter()
            .map(|change| match change {
                FieldChange::Status(_) => "status",
                FieldChange::DueDate(_) => "due_date",
                FieldChange::Title(_) => "title",
            })
            .collect()
    }
}
