//! Job-progress tracking for long-running backend operations.
//!
//! A tracked job is fed by two independent channels: the push channel's
//! `job-progress` topic and a fallback poll loop against
//! `GET /jobs/{id}`. [`JobTracker`] merges both into one
//! [`ReconciledJob`](gsadmin_core::ReconciledJob) that only moves
//! forward, stops both feeds once the job is terminal, and reports the
//! outcome exactly once.

pub mod api;
pub mod config;
pub mod events;
pub mod poller;
pub mod reconcile;
pub mod tracker;

pub use api::{ApiError, JobRecord, JobStatusSource, JobsApi, ProgressEntry};
pub use config::TrackerConfig;
pub use events::{JobNotification, TrackerEvent};
pub use poller::PollError;
pub use reconcile::{reconcile, DiscardReason, Reconciled};
pub use tracker::JobTracker;
