use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::{CompletionState, MappingRecord, SourceRecord, SyncKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    New,
    Submitted,
    Unsubmitted,
    DueChanged,
    TitleChanged,
    NoChange,
}

/// Classification of one source record against its stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub key: SyncKey,
    pub changes: BTreeSet<ChangeKind>,
    pub completion: Option<CompletionState>,
    /// `Some(None)` means the due date was removed upstream.
    pub due_date: Option<Option<NaiveDate>>,
    pub title: Option<String>,
}

impl Diff {
    fn empty(key: SyncKey) -> Self {
        Self {
            key,
            changes: BTreeSet::new(),
            completion: None,
            due_date: None,
            title: None,
        }
    }

    pub fn has(&self, kind: ChangeKind) -> bool {
        self.changes.contains(&kind)
    }

    pub fn is_new(&self) -> bool {
        self.has(ChangeKind::New)
    }

    pub fn is_no_change(&self) -> bool {
        self.has(ChangeKind::NoChange)
    }
}

/// Compares a source record with its stored mapping.
///
/// An absent mapping, or one that never received a target id, yields exactly
/// `{New}` with every proposed value filled. Otherwise each tracked field is
/// checked independently and `{NoChange}` is returned when none differ.
pub fn compute_diff(record: &SourceRecord, mapping: Option<&MappingRecord>) -> Diff {
    let mut diff = Diff::empty(record.key());
    let current_title = record.display_title();
    let current_due = record.due_date();
    let current_state = CompletionState::from_completed(record.completed);

    let Some(mapping) = mapping.filter(|m| m.is_synced()) else {
        diff.changes.insert(ChangeKind::New);
        diff.completion = Some(current_state);
        diff.due_date = Some(current_due);
        diff.title = Some(current_title);
        return diff;
    };

    match (mapping.completion_state, current_state) {
        (CompletionState::NotDone, CompletionState::Done) => {
            diff.changes.insert(ChangeKind::Submitted);
            diff.completion = Some(CompletionState::Done);
        }
        (CompletionState::Done, CompletionState::NotDone) => {
            diff.changes.insert(ChangeKind::Unsubmitted);
            diff.completion = Some(CompletionState::NotDone);
        }
        _ => {}
    }

    if current_due != mapping.due_date {
        diff.changes.insert(ChangeKind::DueChanged);
        diff.due_date = Some(current_due);
    }

    if current_title != mapping.title {
        diff.changes.insert(ChangeKind::TitleChanged);
        diff.title = Some(current_title);
    }

    if diff.changes.is_empty() {
        diff.changes.insert(ChangeKind::NoChange);
    }

    diff
}

/// Keys previously synced that no longer appear in a full listing.
pub fn compute_deleted(
    current_keys: &BTreeSet<SyncKey>,
    active_synced_keys: &BTreeSet<SyncKey>,
) -> BTreeSet<SyncKey> {
    active_synced_keys.difference(current_keys).copied().collect()
}
