//! Merge of progress reports from the push channel and the poll loop.
//!
//! [`reconcile`] is pure: it mutates the given [`ReconciledJob`] and
//! returns what happened, leaving side effects (stopping feeds,
//! notifying listeners) to the tracker.

use gsadmin_core::{JobStatus, ProgressReport, ReconciledJob, ReportSource, Timestamp};

/// Outcome of applying one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Progress, message or step advanced.
    Progressed,
    /// Progress was lower than the current value but the message
    /// changed; only `last_source` and `updated_at` moved.
    Touched,
    /// The job reached a terminal status with this report.
    Finished,
    /// The report repeated what is already known.
    Unchanged,
    /// The report was ignored.
    Discarded(DiscardReason),
}

impl Reconciled {
    /// `true` if the job value changed and listeners must be told.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Reconciled::Progressed | Reconciled::Touched | Reconciled::Finished
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The job already reached a terminal status.
    AlreadyTerminal,
    /// A running report with lower progress and nothing new to say.
    StaleProgress,
    /// The report is for a different (or untracked) job.
    WrongJob,
}

/// Apply `report` from `source` to `job`.
///
/// * A terminal job is never modified again.
/// * A terminal report is adopted as is, except that `Completed` forces
///   100% and `Failed`/`Cancelled` never move progress backwards.
/// * A running report is adopted if its progress is not lower than the
///   current value. Empty messages and missing steps keep the previous
///   ones.
pub fn reconcile(
    job: &mut ReconciledJob,
    report: &ProgressReport,
    source: ReportSource,
    now: Timestamp,
) -> Reconciled {
    if report.job_id != job.job_id {
        return Reconciled::Discarded(DiscardReason::WrongJob);
    }
    if job.is_terminal() {
        return Reconciled::Discarded(DiscardReason::AlreadyTerminal);
    }

    let progress = report.progress.min(100);

    if report.status.is_terminal() {
        job.status = report.status;
        job.progress = match report.status {
            JobStatus::Completed => 100,
            _ => job.progress.max(progress),
        };
        if !report.message.is_empty() {
            job.message = report.message.clone();
        }
        if report.step.is_some() {
            job.step = report.step;
        }
        job.error = match report.status {
            JobStatus::Failed => Some(failure_reason(report)),
            _ => None,
        };
        job.last_source = Some(source);
        job.updated_at = now;
        return Reconciled::Finished;
    }

    if progress < job.progress {
        if !report.message.is_empty() && report.message != job.message {
            job.last_source = Some(source);
            job.updated_at = now;
            return Reconciled::Touched;
        }
        return Reconciled::Discarded(DiscardReason::StaleProgress);
    }

    let message_changed = !report.message.is_empty() && report.message != job.message;
    let step_changed = report.step.is_some() && report.step != job.step;
    if progress == job.progress && !message_changed && !step_changed {
        return Reconciled::Unchanged;
    }

    job.progress = progress;
    if message_changed {
        job.message = report.message.clone();
    }
    if step_changed {
        job.step = report.step;
    }
    job.last_source = Some(source);
    job.updated_at = now;
    Reconciled::Progressed
}

fn failure_reason(report: &ProgressReport) -> String {
    report
        .error
        .clone()
        .filter(|e| !e.is_empty())
        .or_else(|| Some(report.message.clone()).filter(|m| !m.is_empty()))
        .unwrap_or_else(|| "Job failed".to_string())
}
