//! Follow one tracked job until it finishes or the user interrupts.

use std::future::Future;
use std::io::Write;

use tokio::sync::broadcast::error::RecvError;

use gsadmin_core::{JobId, JobKind};
use gsadmin_jobs::{JobNotification, JobTracker, TrackerEvent};

use crate::exit_codes;

/// Exit code for a terminal notification.
pub fn exit_code(notification: &JobNotification) -> i32 {
    match notification {
        JobNotification::Succeeded(_) => exit_codes::SUCCESS,
        JobNotification::Failed { .. } => exit_codes::FAILED,
        JobNotification::Cancelled(_) => exit_codes::CANCELLED,
    }
}

/// Track `job_id` and print each new progress line to `out`.
///
/// Returns when the job reaches a terminal status or `interrupt`
/// resolves, in which case the job is cancelled locally.
pub async fn follow<W, I>(
    tracker: &JobTracker,
    job_id: JobId,
    kind: JobKind,
    interrupt: I,
    out: &mut W,
) -> anyhow::Result<i32>
where
    W: Write,
    I: Future<Output = ()>,
{
    let mut events = tracker.subscribe();
    let initial = tracker.track(job_id.clone(), kind);
    if tracker.snapshot(&job_id).is_none() {
        anyhow::bail!("job tracker is shut down; cannot follow {job_id}");
    }

    if let Some(notification) = JobNotification::for_job(&initial) {
        writeln!(out, "{}", notification.message())?;
        return Ok(exit_code(&notification));
    }

    let mut last_line = initial.describe();
    writeln!(out, "{last_line}")?;

    tokio::pin!(interrupt);
    loop {
        let event = tokio::select! {
            _ = &mut interrupt => {
                tracker.cancel(&job_id);
                writeln!(out, "Interrupted, stopped following {job_id}")?;
                return Ok(exit_codes::CANCELLED);
            }
            event = events.recv() => event,
        };

        match event {
            Ok(event) if event.job_id() != &job_id => {}
            Ok(TrackerEvent::Updated(job)) => {
                let line = job.describe();
                if line != last_line {
                    writeln!(out, "{line}")?;
                    last_line = line;
                }
            }
            Ok(TrackerEvent::Finished(notification)) => {
                writeln!(out, "{}", notification.message())?;
                return Ok(exit_code(&notification));
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress output fell behind");
                let Some(job) = tracker.snapshot(&job_id) else {
                    anyhow::bail!("job {job_id} is no longer tracked");
                };
                if let Some(notification) = JobNotification::for_job(&job) {
                    writeln!(out, "{}", notification.message())?;
                    return Ok(exit_code(&notification));
                }
            }
            Err(RecvError::Closed) => {
                anyhow::bail!("job tracker stopped while following {job_id}");
            }
        }
    }
}
