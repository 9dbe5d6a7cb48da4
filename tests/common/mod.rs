#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use lmssync::canvas::SourceReader;
use lmssync::db::MappingStore;
use lmssync::error::AppError;
use lmssync::models::{
    FieldChange, FieldChangeSet, SourceRecord, TargetTask, TaskContainer, TaskDraft,
};
use lmssync::outlook::{TargetContainerResolver, TargetTaskClient};
use lmssync::services::{SyncOptions, SyncService};
use lmssync::sync::RetryPolicy;

pub const LIST_NAME: &str = "Canvas Assignments";

pub fn homework(id: i64, title: &str, due: Option<(i32, u32, u32)>, completed: bool) -> SourceRecord {
    SourceRecord {
        id,
        parent_id: 12345,
        parent_name: "CS101".to_string(),
        title: title.to_string(),
        due_at: due.map(|(y, m, d)| {
            Utc.with_ymd_and_hms(y, m, d, 23, 59, 0)
                .single()
                .expect("valid due date")
        }),
        html_url: Some(format!("https://canvas.example.edu/courses/12345/assignments/{}", id)),
        completed,
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// In-memory upstream listing.
#[derive(Default)]
pub struct FakeSource {
    records: Mutex<Vec<SourceRecord>>,
    unavailable: AtomicBool,
}

impl FakeSource {
    pub fn new(records: Vec<SourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
            unavailable: AtomicBool::new(false),
        })
    }

    pub fn set_records(&self, records: Vec<SourceRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_active_records(&self) -> Result<Vec<SourceRecord>, AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::SourceUnavailable("canvas is down".to_string()));
        }
        Ok(self.records.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Unavailable,
    Auth,
}

impl Failure {
    fn to_error(self) -> AppError {
        match self {
            Failure::Unavailable => AppError::TargetUnavailable("503 Service Unavailable".to_string()),
            Failure::Auth => AppError::TargetAuth("401 Unauthorized".to_string()),
        }
    }
}

struct Injected {
    title: String,
    failure: Failure,
    remaining: u32,
}

/// In-memory task lists and tasks with call counters and injectable failures.
#[derive(Default)]
pub struct FakeTarget {
    containers: Mutex<Vec<TaskContainer>>,
    tasks: Mutex<BTreeMap<String, TargetTask>>,
    updates: Mutex<Vec<(String, FieldChangeSet)>>,
    created_titles: Mutex<Vec<String>>,
    injected: Mutex<Vec<Injected>>,
    container_unavailable: AtomicBool,
    next_id: AtomicU32,
    pub resolve_calls: AtomicU32,
    pub create_calls: AtomicU32,
    pub update_calls: AtomicU32,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fails the next `times` writes whose task title equals `title`.
    pub fn fail_writes(&self, title: &str, failure: Failure, times: u32) {
        self.injected.lock().unwrap().push(Injected {
            title: title.to_string(),
            failure,
            remaining: times,
        });
    }

    pub fn set_container_unavailable(&self, unavailable: bool) {
        self.container_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn containers(&self) -> Vec<TaskContainer> {
        self.containers.lock().unwrap().clone()
    }

    pub fn task(&self, id: &str) -> Option<TargetTask> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Titles of successfully created tasks, in call order.
    pub fn created_titles(&self) -> Vec<String> {
        self.created_titles.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, FieldChangeSet)> {
        self.updates.lock().unwrap().clone()
    }

    fn take_failure(&self, title: &str) -> Option<AppError> {
        let mut injected = self.injected.lock().unwrap();
        let entry = injected
            .iter_mut()
            .find(|i| i.title == title && i.remaining > 0)?;
        entry.remaining -= 1;
        Some(entry.failure.to_error())
    }
}

#[async_trait]
impl TargetContainerResolver for FakeTarget {
    async fn get_or_create_container(&self, name: &str) -> Result<String, AppError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.container_unavailable.load(Ordering::SeqCst) {
            return Err(AppError::TargetUnavailable("graph is down".to_string()));
        }

        let mut containers = self.containers.lock().unwrap();
        if let Some(existing) = containers.iter().find(|c| c.display_name == name) {
            return Ok(existing.id.clone());
        }
        let container = TaskContainer {
            id: format!("list-{}", containers.len() + 1),
            display_name: name.to_string(),
        };
        containers.push(container.clone());
        Ok(container.id)
    }
}

#[async_trait]
impl TargetTaskClient for FakeTarget {
    async fn create(&self, _container_id: &str, draft: &TaskDraft) -> Result<TargetTask, AppError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(&draft.title) {
            return Err(err);
        }

        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let task = TargetTask {
            id: id.clone(),
            title: draft.title.clone(),
            status: draft.status,
            due_date: draft.due_date,
        };
        self.tasks.lock().unwrap().insert(id, task.clone());
        self.created_titles.lock().unwrap().push(task.title.clone());
        Ok(task)
    }

    async fn update(
        &self,
        _container_id: &str,
        task_id: &str,
        changes: &FieldChangeSet,
    ) -> Result<TargetTask, AppError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let title = self
            .task(task_id)
            .map(|t| t.title)
            .ok_or_else(|| AppError::TargetUnavailable(format!("404 task {}", task_id)))?;
        if let Some(err) = self.take_failure(&title) {
            return Err(err);
        }

        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| AppError::TargetUnavailable(format!("404 task {}", task_id)))?;
        for change in changes.iter() {
            match change {
                FieldChange::Status(status) => task.status = *status,
                FieldChange::DueDate(due) => task.due_date = *due,
                FieldChange::Title(title) => task.title = title.clone(),
            }
        }
        self.updates
            .lock()
            .unwrap()
            .push((task_id.to_string(), changes.clone()));
        Ok(task.clone())
    }
}

pub fn options(dry_run: bool) -> SyncOptions {
    SyncOptions {
        container_name: LIST_NAME.to_string(),
        dry_run,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        },
    }
}

pub fn service(
    store: &MappingStore,
    source: &Arc<FakeSource>,
    target: &Arc<FakeTarget>,
    dry_run: bool,
) -> SyncService {
    SyncService::new(
        store.clone(),
        source.clone(),
        target.clone(),
        target.clone(),
        options(dry_run),
    )
}
