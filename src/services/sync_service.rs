use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::canvas::SourceReader;
use crate::db::MappingStore;
use crate::error::{AppError, RecordFailure};
use crate::models::{FieldChange, FieldChangeSet, MappingRecord, SourceRecord, TaskDraft};
use crate::outlook::{TargetContainerResolver, TargetTaskClient};
use crate::sync::{ChangeKind, Diff, RetryPolicy, compute_deleted, compute_diff, retry};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub container_name: String,
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub completed: usize,
    pub reopened: usize,
    pub archived: usize,
    pub skipped: usize,
    pub errors: usize,
    pub failures: Vec<RecordFailure>,
}

impl RunSummary {
    fn record(&mut self, diff: &Diff) {
        if diff.is_no_change() {
            self.skipped += 1;
            return;
        }
        if diff.is_new() {
            self.created += 1;
            return;
        }
        if diff.has(ChangeKind::Submitted) {
            self.completed += 1;
        }
        if diff.has(ChangeKind::Unsubmitted) {
            self.reopened += 1;
        }
        if diff.has(ChangeKind::DueChanged) || diff.has(ChangeKind::TitleChanged) {
            self.updated += 1;
        }
    }

    fn fail(&mut self, failure: RecordFailure) {
        self.errors += 1;
        self.failures.push(failure);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} created={} updated={} completed={} reopened={} archived={} skipped={} errors={}",
            self.processed,
            self.created,
            self.updated,
            self.completed,
            self.reopened,
            self.archived,
            self.skipped,
            self.errors
        )
    }
}

pub struct SyncService {
    store: MappingStore,
    source: Arc<dyn SourceReader>,
    resolver: Arc<dyn TargetContainerResolver>,
    tasks: Arc<dyn TargetTaskClient>,
    options: SyncOptions,
}

impl SyncService {
    pub fn new(
        store: MappingStore,
        source: Arc<dyn SourceReader>,
        resolver: Arc<dyn TargetContainerResolver>,
        tasks: Arc<dyn TargetTaskClient>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            source,
            resolver,
            tasks,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn run(&self) -> Result<RunSummary, AppError> {
        self.run_with(self.options.dry_run).await
    }

    /// Runs once, overriding the configured dry-run flag.
    pub async fn run_with(&self, dry_run: bool) -> Result<RunSummary, AppError> {
        let span = info_span!("sync_run", run_id = %Uuid::new_v4(), dry_run);
        self.reconcile(dry_run).instrument(span).await
    }

    async fn reconcile(&self, dry_run: bool) -> Result<RunSummary, AppError> {
        info!("Starting sync...");

        info!("Step 1: Fetching active records from Canvas");
        let records = self.source.list_active_records().await?;
        info!("Fetched {} records", records.len());

        info!("Step 2: Resolving task list '{}'", self.options.container_name);
        let resolver = &self.resolver;
        let name = self.options.container_name.as_str();
        let container_id = retry(&self.options.retry, "resolve task list", move || {
            resolver.get_or_create_container(name)
        })
        .await?;

        info!("Step 3: Reconciling records");
        let mut summary = RunSummary {
            processed: records.len(),
            ..RunSummary::default()
        };
        let mut observed = BTreeSet::new();

        for record in &records {
            observed.insert(record.key());
            match self.process_record(&container_id, record, dry_run).await {
                Ok(diff) => summary.record(&diff),
                Err(err) if err.is_fatal() => {
                    error!("Aborting sync at {}: {}", record.key(), err);
                    return Err(err);
                }
                Err(err) => {
                    warn!("Failed to sync {} ({}): {}", record.key(), record.title, err);
                    summary.fail(RecordFailure::new(record.key(), &err));
                }
            }
        }

        info!("Step 4: Archiving mappings for removed records");
        let active = self.store.active_synced_keys().await?;
        let deleted = compute_deleted(&observed, &active);
        for key in deleted {
            if dry_run {
                info!("[dry-run] Would archive {}", key);
                continue;
            }
            if self.store.archive(key).await? {
                summary.archived += 1;
            }
        }

        for failure in &summary.failures {
            error!("{} failed [{}]: {}", failure.key, failure.kind, failure.message);
        }
        info!("Sync completed: {}", summary);
        Ok(summary)
    }

    async fn process_record(
        &self,
        container_id: &str,
        record: &SourceRecord,
        dry_run: bool,
    ) -> Result<Diff, AppError> {
        let key = record.key();
        let stored = self.store.get(key).await?;

        let (mapping, previous_task_id) = match stored {
            Some(old) if old.archived => {
                info!(
                    "{} reappeared after archival (previous task {:?}), syncing as new",
                    key, old.target_task_id
                );
                (None, old.target_task_id)
            }
            stored => {
                let previous = stored.as_ref().and_then(|m| m.previous_target_task_id.clone());
                (stored, previous)
            }
        };
        let diff = compute_diff(record, mapping.as_ref());

        if diff.is_no_change() {
            debug!("No change for {}", key);
            return Ok(diff);
        }
        if dry_run {
            info!("[dry-run] Would apply {:?} to {} ({})", diff.changes, key, record.title);
            return Ok(diff);
        }

        match mapping.and_then(|m| m.target_task_id.clone().map(|task_id| (task_id, m))) {
            Some((task_id, mapping)) => {
                self.update_task(container_id, &task_id, mapping, &diff).await?
            }
            None => {
                self.create_task(container_id, record, previous_task_id, &diff)
                    .await?
            }
        }

        Ok(diff)
    }

    async fn create_task(
        &self,
        container_id: &str,
        record: &SourceRecord,
        previous_task_id: Option<String>,
        diff: &Diff,
    ) -> Result<(), AppError> {
        let key = record.key();
        let completion = diff.completion.unwrap_or_default();
        let title = diff.title.clone().unwrap_or_else(|| record.display_title());
        let due_date = diff.due_date.unwrap_or_else(|| record.due_date());
        let draft = TaskDraft::for_record(record, title, due_date, completion);

        let tasks = &self.tasks;
        let payload = &draft;
        let task = retry(&self.options.retry, &format!("create task for {}", key), move || {
            tasks.create(container_id, payload)
        })
        .await?;

        let mut mapping = MappingRecord::new(key, task.id.clone());
        mapping.previous_target_task_id = previous_task_id;
        mapping.completion_state = completion;
        mapping.due_date = draft.due_date;
        mapping.title = draft.title;

        if let Err(err) = self.store.save(&mapping).await {
            error!("Created task {} for {} but could not record it: {}", task.id, key, err);
            return Err(err.into());
        }

        info!("Created task {} for {}", task.id, key);
        Ok(())
    }

    async fn update_task(
        &self,
        container_id: &str,
        task_id: &str,
        mut mapping: MappingRecord,
        diff: &Diff,
    ) -> Result<(), AppError> {
        let mut changes = FieldChangeSet::new();
        if let Some(completion) = diff.completion {
            changes.push(FieldChange::Status(completion.into()));
            mapping.completion_state = completion;
        }
        if let Some(due_date) = diff.due_date {
            changes.push(FieldChange::DueDate(due_date));
            mapping.due_date = due_date;
        }
        if let Some(title) = &diff.title {
            changes.push(FieldChange::Title(title.clone()));
            mapping.title = title.clone();
        }

        if changes.is_empty() {
            return Ok(());
        }

        let tasks = &self.tasks;
        let payload = &changes;
        retry(&self.options.retry, &format!("update task {}", task_id), move || {
            tasks.update(container_id, task_id, payload)
        })
        .await?;

        self.store.save(&mapping).await?;
        info!("Updated task {} for {}: {:?}", task_id, diff.key, changes.field_names());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncKey;

    fn diff_of(kinds: &[ChangeKind]) -> Diff {
        Diff {
            key: SyncKey::new(1, 2),
            changes: kinds.iter().copied().collect(),
            completion: None,
            due_date: None,
            title: None,
        }
    }

    #[test]
    fn test_summary_counts_per_classification() {
        let mut summary = RunSummary::default();
        summary.record(&diff_of(&[ChangeKind::NoChange]));
        summary.record(&diff_of(&[ChangeKind::New]));
        summary.record(&diff_of(&[ChangeKind::Submitted, ChangeKind::DueChanged]));
        summary.record(&diff_of(&[ChangeKind::Unsubmitted]));
        summary.record(&diff_of(&[ChangeKind::DueChanged, ChangeKind::TitleChanged]));

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.reopened, 1);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            processed: 3,
            created: 1,
            skipped: 2,
            ..RunSummary::default()
        };
        assert_eq!(
            summary.to_string(),
            "processed=3 created=1 updated=0 completed=0 reopened=0 archived=0 skipped=2 errors=0"
        );
    }
}
