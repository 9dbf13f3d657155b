//! Shared domain types for the game-server fleet admin client.
//!
//! Everything the channel manager and the job tracker agree on lives
//! here: job identifiers, statuses, progress reports, the reconciled
//! job value shown to the UI, and the push-channel event names.

pub mod error;
pub mod job;
pub mod job_events;
pub mod types;

pub use error::CoreError;
pub use job::{JobKind, JobStatus, ProgressReport, ReconciledJob, ReportSource};
pub use types::{JobId, Timestamp};
