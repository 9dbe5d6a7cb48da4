pub mod mapping;
pub mod record;
pub mod task;

pub use mapping::{CompletionState, MappingRecord, MappingRow, StoreStatus};
pub use record::{SourceRecord, SyncKey};
pub use task::{FieldChange, FieldChangeSet, TargetTask, TaskContainer, TaskDraft, TaskStatus};
