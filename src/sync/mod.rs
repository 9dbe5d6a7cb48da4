pub mod diff;
pub mod retry;

pub use diff::{ChangeKind, Diff, compute_deleted, compute_diff};
pub use retry::{RetryPolicy, Retryable, retry, retry_after_header};
