//! Events broadcast by the [`JobTracker`](crate::JobTracker).

use gsadmin_core::{JobId, ReconciledJob};

/// Something observable happened to a tracked job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A running job's reconciled value changed.
    Updated(ReconciledJob),
    /// The job reached a terminal status. Sent exactly once per job.
    Finished(JobNotification),
}

impl TrackerEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            TrackerEvent::Updated(job) => &job.job_id,
            TrackerEvent::Finished(notification) => &notification.job().job_id,
        }
    }
}

/// Terminal side effect of a job, shown to the user once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobNotification {
    Succeeded(ReconciledJob),
    Failed { job: ReconciledJob, error: String },
    Cancelled(ReconciledJob),
}

impl JobNotification {
    /// Build the notification for a job that has just become terminal.
    /// Returns `None` while the job is still running.
    pub fn for_job(job: &ReconciledJob) -> Option<Self> {
        use gsadmin_core::JobStatus;

        match job.status {
            JobStatus::Running => None,
            JobStatus::Completed => Some(JobNotification::Succeeded(job.clone())),
            JobStatus::Failed => Some(JobNotification::Failed {
                job: job.clone(),
                error: job.error.clone().unwrap_or_else(|| job.message.clone()),
            }),
            JobStatus::Cancelled => Some(JobNotification::Cancelled(job.clone())),
        }
    }

    pub fn job(&self) -> &ReconciledJob {
        match self {
            JobNotification::Succeeded(job)
            | JobNotification::Failed { job, .. }
            | JobNotification::Cancelled(job) => job,
        }
    }

    /// User-facing text, e.g. `Cluster provisioning failed: quota exceeded`.
    pub fn message(&self) -> String {
        self.job().describe()
    }
}
