pub mod sync_service;

pub use sync_service::{RunSummary, SyncOptions, SyncService};
