use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::models::{FieldChange, FieldChangeSet, TargetTask, TaskContainer, TaskDraft, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTaskList {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

impl From<TodoTaskList> for TaskContainer {
    fn from(list: TodoTaskList) -> Self {
        TaskContainer {
            id: list.id,
            display_name: list.display_name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeTimeZone {
    pub date_time: String,
    pub time_zone: String,
}

impl DateTimeTimeZone {
    /// Due dates are sent as midnight UTC of the calendar date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            date_time: format!("{}T00:00:00", date.format("%Y-%m-%d")),
            time_zone: "UTC".to_string(),
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        let day = self.date_time.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub due_date_time: Option<DateTimeTimeZone>,
}

impl From<TodoTask> for TargetTask {
    fn from(task: TodoTask) -> Self {
        TargetTask {
            due_date: task.due_date_time.as_ref().and_then(DateTimeTimeZone::date),
            id: task.id,
            title: task.title,
            status: task.status,
        }
    }
}

pub fn create_payload(draft: &TaskDraft) -> Value {
    let mut payload = json!({
        "title": draft.title,
        "status": draft.status,
        "importance": "normal",
    });

    if !draft.body.is_empty() {
        payload["body"] = json!({
            "content": draft.body,
            "contentType": "text",
        });
    }
    if let Some(due) = draft.due_date {
        payload["dueDateTime"] = json!(DateTimeTimeZone::from_date(due));
    }

    payload
}

/// PATCH body containing exactly the changed fields.
pub fn update_payload(changes: &FieldChangeSet) -> Value {
    let mut payload = Map::new();

    for change in changes.iter() {
        match change {
            FieldChange::Status(status) => {
                payload.insert("status".to_string(), json!(status));
            }
            FieldChange::DueDate(Some(due)) => {
                payload.insert("dueDateTime".to_string(), json!(DateTimeTimeZone::from_date(*due)));
            }
            FieldChange::DueDate(None) => {
                payload.insert("dueDateTime".to_string(), Value::Null);
            }
            FieldChange::Title(title) => {
                payload.insert("title".to_string(), json!(title));
            }
        }
    }

    Value::Object(payload)
}
