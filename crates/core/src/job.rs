//! Job status model shared by the push channel, the poll loop and the
//! tracker.
//!
//! A [`ProgressReport`] is what either channel delivers; a
//! [`ReconciledJob`] is the single value the UI layer observes after
//! the tracker has merged those reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a background job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal: once a job
/// reaches one of them no further status may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[serde(alias = "pending", alias = "queued")]
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// Category of background job.
///
/// The status endpoint returns an append-only log of steps rather than
/// a percentage, so the poll loop estimates progress against the number
/// of steps a job of this kind normally goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    ClusterProvision,
    ServerDeploy,
    BackupRestore,
    #[default]
    Generic,
}

impl JobKind {
    /// Number of progress entries a job of this kind emits before it
    /// finishes.
    pub fn expected_steps(self) -> u32 {
        match self {
            JobKind::ClusterProvision => 5,
            JobKind::ServerDeploy => 4,
            JobKind::BackupRestore => 3,
            JobKind::Generic => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ClusterProvision => "cluster-provision",
            JobKind::ServerDeploy => "server-deploy",
            JobKind::BackupRestore => "backup-restore",
            JobKind::Generic => "generic",
        }
    }

    /// Human-readable name used in progress lines and notifications.
    pub fn label(self) -> &'static str {
        match self {
            JobKind::ClusterProvision => "Cluster provisioning",
            JobKind::ServerDeploy => "Server deployment",
            JobKind::BackupRestore => "Backup restore",
            JobKind::Generic => "Job",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cluster-provision" => Ok(JobKind::ClusterProvision),
            "server-deploy" => Ok(JobKind::ServerDeploy),
            "backup-restore" => Ok(JobKind::BackupRestore),
            "generic" => Ok(JobKind::Generic),
            other => Err(CoreError::UnknownJobKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ReportSource
// ---------------------------------------------------------------------------

/// Which channel delivered a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    Push,
    Poll,
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSource::Push => f.write_str("push"),
            ReportSource::Poll => f.write_str("poll"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProgressReport
// ---------------------------------------------------------------------------

/// One observation of a job's state from either channel.
///
/// This is also the payload shape of the `job-progress` push event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Completion percentage, 0-100.
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressReport {
    pub fn running(job_id: JobId, progress: u8, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            progress,
            message: message.into(),
            step: None,
            error: None,
        }
    }

    pub fn completed(job_id: JobId, message: impl Into<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            progress: 100,
            message: message.into(),
            step: None,
            error: None,
        }
    }

    pub fn failed(job_id: JobId, progress: u8, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            job_id,
            status: JobStatus::Failed,
            progress,
            message: error.clone(),
            step: None,
            error: Some(error),
        }
    }

    pub fn cancelled(job_id: JobId, progress: u8) -> Self {
        Self {
            job_id,
            status: JobStatus::Cancelled,
            progress,
            message: "Cancelled".to_string(),
            step: None,
            error: None,
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }
}

// ---------------------------------------------------------------------------
// ReconciledJob
// ---------------------------------------------------------------------------

/// The single externally observed state of a tracked job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledJob {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub step: Option<u32>,
    pub error: Option<String>,
    /// Channel that produced the last applied report. `None` until the
    /// first report arrives.
    pub last_source: Option<ReportSource>,
    pub updated_at: Timestamp,
}

impl ReconciledJob {
    /// Fresh `Running` value at 0% for a job that has just started.
    pub fn new(job_id: JobId, kind: JobKind) -> Self {
        Self {
            job_id,
            kind,
            status: JobStatus::Running,
            progress: 0,
            message: String::new(),
            step: None,
            error: None,
            last_source: None,
            updated_at: chrono::Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// One-line progress text for display, e.g.
    /// `[60%] Configuring nodes (step 3)`.
    pub fn describe(&self) -> String {
        match self.status {
            JobStatus::Running => {
                let message = if self.message.is_empty() {
                    format!("{} in progress", self.kind.label())
                } else {
                    self.message.clone()
                };
                match self.step {
                    Some(step) => format!("[{:>3}%] {message} (step {step})", self.progress),
                    None => format!("[{:>3}%] {message}", self.progress),
                }
            }
            JobStatus::Completed => format!("{} completed", self.kind.label()),
            JobStatus::Failed => {
                let reason = self.error.as_deref().unwrap_or(self.message.as_str());
                if reason.is_empty() {
                    format!("{} failed", self.kind.label())
                } else {
                    format!("{} failed: {reason}", self.kind.label())
                }
            }
            JobStatus::Cancelled => format!("{} cancelled", self.kind.label()),
        }
    }
}
