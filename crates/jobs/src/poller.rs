//! Fallback polling loop.
//!
//! Queries a [`JobStatusSource`] at a fixed interval and turns the
//! returned step log into a [`ProgressReport`]. The status endpoint has
//! no percentage, so progress is estimated as completed steps over the
//! steps a job of that kind normally takes, capped at 99 until the job
//! is actually done.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use gsadmin_core::{JobId, JobKind, JobStatus, ProgressReport};

use crate::api::{ApiError, JobRecord, JobStatusSource};
use crate::config::MIN_POLL_INTERVAL;

/// Highest progress a job may show before it reports completion.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// A single failed poll cycle. Logged and otherwise ignored.
#[derive(Debug, thiserror::Error)]
#[error("Status poll for job {job_id} failed: {source}")]
pub struct PollError {
    pub job_id: JobId,
    pub source: ApiError,
}

/// Estimate completion from the number of recorded steps.
pub fn estimate_progress(completed_steps: usize, kind: JobKind) -> u8 {
    let expected = kind.expected_steps().max(1) as usize;
    let pct = completed_steps.saturating_mul(100) / expected;
    pct.min(MAX_RUNNING_PROGRESS as usize) as u8
}

/// Convert a status record into the report the tracker reconciles.
///
/// The latest step's text becomes the message and the number of steps
/// the `step`. `Completed` reports 100%; every other status carries the
/// capped estimate.
pub fn report_from_record(record: &JobRecord, kind: JobKind) -> ProgressReport {
    let steps = record.progress.len();
    let estimate = estimate_progress(steps, kind);
    let message = record
        .progress
        .last()
        .map(|entry| entry.message.clone())
        .unwrap_or_default();

    let report = match record.status {
        JobStatus::Running => ProgressReport::running(record.id.clone(), estimate, message),
        JobStatus::Completed => ProgressReport::completed(record.id.clone(), message),
        JobStatus::Failed => {
            let reason = record
                .error
                .clone()
                .filter(|e| !e.is_empty())
                .unwrap_or(message);
            ProgressReport::failed(record.id.clone(), estimate, reason)
        }
        JobStatus::Cancelled => ProgressReport::cancelled(record.id.clone(), estimate),
    };

    match u32::try_from(steps) {
        Ok(step) if step > 0 => report.with_step(step),
        _ => report,
    }
}

/// Spawn the poll loop for one job.
///
/// The first query runs one `interval` after the call. Every report is
/// handed to `on_report`; the loop ends when `cancel` fires or
/// `on_report` returns `false`. Intervals shorter than
/// [`MIN_POLL_INTERVAL`] are raised to it.
pub fn spawn_poll_loop<F>(
    source: Arc<dyn JobStatusSource>,
    job_id: JobId,
    kind: JobKind,
    interval: Duration,
    cancel: CancellationToken,
    on_report: F,
) -> JoinHandle<()>
where
    F: Fn(ProgressReport) -> bool + Send + 'static,
{
    let interval = interval.max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(job_id = %job_id, interval_ms = interval.as_millis() as u64, "Poll loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = source.job_status(&job_id) => result,
            };

            match result {
                Ok(record) => {
                    let report = report_from_record(&record, kind);
                    tracing::debug!(
                        job_id = %job_id,
                        status = %report.status,
                        progress = report.progress,
                        "Poll result",
                    );
                    if !on_report(report) {
                        break;
                    }
                }
                Err(source) => {
                    let e = PollError {
                        job_id: job_id.clone(),
                        source,
                    };
                    tracing::warn!(error = %e, "Ignoring failed status poll");
                }
            }
        }

        tracing::debug!(job_id = %job_id, "Poll loop stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProgressEntry;

    fn record(status: JobStatus, steps: &[&str]) -> JobRecord {
        JobRecord {
            id: JobId::parse("J1").unwrap(),
            status,
            progress: steps
                .iter()
                .map(|m| ProgressEntry {
                    message: m.to_string(),
                    timestamp: None,
                })
                .collect(),
            error: None,
        }
    }

    #[test]
    fn two_of_five_steps_is_forty_percent() {
        assert_eq!(estimate_progress(2, JobKind::ClusterProvision), 40);
    }

    #[test]
    fn estimate_is_capped_while_running() {
        assert_eq!(estimate_progress(5, JobKind::ClusterProvision), 99);
        assert_eq!(estimate_progress(12, JobKind::BackupRestore), 99);
        assert_eq!(estimate_progress(0, JobKind::Generic), 0);
    }

    #[test]
    fn running_record_uses_latest_step() {
        let report = report_from_record(
            &record(JobStatus::Running, &["Allocating nodes", "Installing runtime"]),
            JobKind::ClusterProvision,
        );
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.progress, 40);
        assert_eq!(report.message, "Installing runtime");
        assert_eq!(report.step, Some(2));
    }

    #[test]
    fn completed_record_reports_full_progress() {
        let report = report_from_record(
            &record(JobStatus::Completed, &["a", "b", "c"]),
            JobKind::ClusterProvision,
        );
        assert_eq!(report.progress, 100);
        assert_eq!(report.step, Some(3));
    }

    #[test]
    fn failed_record_prefers_error_field() {
        let mut rec = record(JobStatus::Failed, &["Allocating nodes"]);
        rec.error = Some("quota exceeded".into());

        let report = report_from_record(&rec, JobKind::ClusterProvision);

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.progress, 20);
        assert_eq!(report.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn empty_log_has_no_step() {
        let report = report_from_record(&record(JobStatus::Running, &[]), JobKind::ServerDeploy);
        assert_eq!(report.progress, 0);
        assert!(report.step.is_none());
        assert!(report.message.is_empty());
    }
}
