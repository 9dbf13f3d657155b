//! Job tracker.
//!
//! [`JobTracker`] follows background jobs through two unreliable
//! channels at once: a `job-progress:<id>` push topic on the shared
//! [`ChannelManager`] and an independent poll loop. Both feed the same
//! [`reconcile`] function, so each tracked job has exactly one
//! [`ReconciledJob`] that only moves forward and becomes terminal once.
//!
//! Reconciled values are broadcast as [`TrackerEvent`]s. Call
//! [`JobTracker::subscribe`] to receive them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use gsadmin_channel::{ChannelManager, ConnectionState, Topic, TopicMessage};
use gsadmin_core::{JobId, JobKind, JobStatus, ProgressReport, ReconciledJob, ReportSource};

use crate::api::JobStatusSource;
use crate::config::TrackerConfig;
use crate::events::{JobNotification, TrackerEvent};
use crate::poller::spawn_poll_loop;
use crate::reconcile::{reconcile, DiscardReason, Reconciled};

/// Tracks background jobs and publishes their reconciled state.
///
/// Cheap to clone; every clone shares the same jobs. Must be created
/// inside a tokio runtime.
#[derive(Clone)]
pub struct JobTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    channel: ChannelManager,
    source: Arc<dyn JobStatusSource>,
    config: TrackerConfig,
    jobs: Mutex<HashMap<JobId, TrackedJob>>,
    event_tx: broadcast::Sender<TrackerEvent>,
    /// Master cancellation token; poll loops run under child tokens.
    cancel: CancellationToken,
}

/// Bookkeeping for one job id. `feeds` is `None` once the job is
/// terminal, cancelled or the tracker was shut down.
struct TrackedJob {
    job: ReconciledJob,
    feeds: Option<Feeds>,
}

struct Feeds {
    poll_cancel: CancellationToken,
    poll_task: JoinHandle<()>,
    push_subscribed: bool,
}

impl JobTracker {
    pub fn new(
        channel: ChannelManager,
        source: Arc<dyn JobStatusSource>,
        config: TrackerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = Arc::new(TrackerInner {
            channel,
            source,
            config,
            jobs: Mutex::new(HashMap::new()),
            event_tx,
            cancel: CancellationToken::new(),
        });

        spawn_resubscriber(
            Arc::downgrade(&inner),
            inner.channel.watch_state(),
            inner.cancel.child_token(),
        );

        Self { inner }
    }

    /// Start tracking `job_id`.
    ///
    /// Starts the poll loop and, unless the push channel is down,
    /// subscribes the job's progress topic. Tracking an id that is
    /// already known returns its current value without restarting
    /// anything. After [`shutdown`](Self::shutdown) nothing is started
    /// and an unknown id comes back as a fresh, untracked value.
    pub fn track(&self, job_id: JobId, kind: JobKind) -> ReconciledJob {
        self.inner.track(job_id, kind)
    }

    /// Stop following a running job and mark it `Cancelled` locally.
    ///
    /// The poll loop and push topic are stopped before this returns;
    /// reports arriving later are discarded. Returns the final value,
    /// or `None` for an unknown id.
    pub fn cancel(&self, job_id: &JobId) -> Option<ReconciledJob> {
        self.inner.cancel_job(job_id)
    }

    /// Current reconciled value, including finished jobs not yet
    /// forgotten.
    pub fn snapshot(&self, job_id: &JobId) -> Option<ReconciledJob> {
        self.inner.jobs.lock().get(job_id).map(|t| t.job.clone())
    }

    /// Drop a job entirely, stopping its feeds without notification if
    /// it is still running.
    pub fn forget(&self, job_id: &JobId) -> Option<ReconciledJob> {
        let tracked = self.inner.jobs.lock().remove(job_id)?;
        if let Some(feeds) = tracked.feeds {
            self.inner.stop_feeds(job_id, feeds);
        }
        Some(tracked.job)
    }

    /// Receive every [`TrackerEvent`] from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Feed one report into reconciliation, as either channel does.
    pub fn apply(&self, report: &ProgressReport, source: ReportSource) -> Reconciled {
        self.inner.apply(report, source)
    }

    /// Number of jobs with live feeds.
    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .lock()
            .values()
            .filter(|t| t.feeds.is_some())
            .count()
    }

    pub fn channel(&self) -> &ChannelManager {
        &self.inner.channel
    }

    /// Stop every poll loop, drop every subscription and the pending
    /// reconnect timer, and close the push connection.
    ///
    /// Snapshots stay readable. Waits for the poll tasks to exit. The
    /// tracker is single-use: later [`track`](Self::track) calls start
    /// nothing.
    pub async fn shutdown(&self) {
        let stopped: Vec<(JobId, Feeds)> = {
            let mut jobs = self.inner.jobs.lock();
            jobs.iter_mut()
                .filter_map(|(id, t)| t.feeds.take().map(|f| (id.clone(), f)))
                .collect()
        };

        self.inner.cancel.cancel();
        let mut tasks = Vec::with_capacity(stopped.len());
        for (_, feeds) in stopped {
            feeds.poll_cancel.cancel();
            tasks.push(feeds.poll_task);
        }
        self.inner.channel.disconnect();

        let count = tasks.len();
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!(jobs = count, "Job tracker shut down");
    }
}

// ---- private helpers ----

impl TrackerInner {
    fn track(self: &Arc<Self>, job_id: JobId, kind: JobKind) -> ReconciledJob {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(&job_id) {
            tracing::debug!(job_id = %job_id, "Job already tracked");
            return existing.job.clone();
        }

        let job = ReconciledJob::new(job_id.clone(), kind);
        if self.cancel.is_cancelled() {
            tracing::warn!(job_id = %job_id, "Job tracker is shut down; not tracking job");
            return job;
        }

        let poll_cancel = self.cancel.child_token();
        let weak = Arc::downgrade(self);
        let poll_task = spawn_poll_loop(
            Arc::clone(&self.source),
            job_id.clone(),
            kind,
            self.config.poll_interval,
            poll_cancel.clone(),
            move |report| match weak.upgrade() {
                Some(inner) => inner.apply(&report, ReportSource::Poll) != Reconciled::Finished,
                None => false,
            },
        );

        let push_subscribed = if self.channel.state() == ConnectionState::Disconnected {
            tracing::info!(job_id = %job_id, "Push channel down, tracking by polling only");
            false
        } else {
            self.subscribe_push(&job_id);
            true
        };

        tracing::info!(job_id = %job_id, kind = %kind, push = push_subscribed, "Tracking job");

        jobs.insert(
            job_id,
            TrackedJob {
                job: job.clone(),
                feeds: Some(Feeds {
                    poll_cancel,
                    poll_task,
                    push_subscribed,
                }),
            },
        );
        job
    }

    fn apply(&self, report: &ProgressReport, source: ReportSource) -> Reconciled {
        let mut jobs = self.jobs.lock();
        let Some(tracked) = jobs.get_mut(&report.job_id) else {
            tracing::debug!(job_id = %report.job_id, %source, "Report for untracked job");
            return Reconciled::Discarded(DiscardReason::WrongJob);
        };

        let outcome = reconcile(&mut tracked.job, report, source, Utc::now());
        match outcome {
            Reconciled::Progressed | Reconciled::Touched => {
                tracing::debug!(
                    job_id = %report.job_id,
                    %source,
                    progress = tracked.job.progress,
                    "Job progress",
                );
                let _ = self.event_tx.send(TrackerEvent::Updated(tracked.job.clone()));
            }
            Reconciled::Finished => {
                if let Some(feeds) = tracked.feeds.take() {
                    self.stop_feeds(&report.job_id, feeds);
                }
                self.notify_finished(&tracked.job, source);
            }
            Reconciled::Unchanged | Reconciled::Discarded(_) => {
                tracing::trace!(job_id = %report.job_id, %source, ?outcome, "Report ignored");
            }
        }
        outcome
    }

    fn cancel_job(&self, job_id: &JobId) -> Option<ReconciledJob> {
        let mut jobs = self.jobs.lock();
        let tracked = jobs.get_mut(job_id)?;
        if tracked.job.is_terminal() {
            return Some(tracked.job.clone());
        }

        if let Some(feeds) = tracked.feeds.take() {
            self.stop_feeds(job_id, feeds);
        }
        tracked.job.status = JobStatus::Cancelled;
        tracked.job.message = "Cancelled".to_string();
        tracked.job.updated_at = Utc::now();

        tracing::info!(job_id = %job_id, "Job cancelled");
        if let Some(notification) = JobNotification::for_job(&tracked.job) {
            let _ = self.event_tx.send(TrackerEvent::Finished(notification));
        }
        Some(tracked.job.clone())
    }

    /// Stop the poll loop and leave the push topic.
    fn stop_feeds(&self, job_id: &JobId, feeds: Feeds) {
        feeds.poll_cancel.cancel();
        if feeds.push_subscribed {
            self.channel
                .unsubscribe(&Topic::JobProgress(job_id.clone()));
        }
    }

    fn notify_finished(&self, job: &ReconciledJob, source: ReportSource) {
        let Some(notification) = JobNotification::for_job(job) else {
            return;
        };
        match &notification {
            JobNotification::Failed { error, .. } => {
                tracing::warn!(job_id = %job.job_id, %source, error = %error, "Job failed");
            }
            _ => {
                tracing::info!(job_id = %job.job_id, %source, status = %job.status, "Job finished");
            }
        }
        let _ = self.event_tx.send(TrackerEvent::Finished(notification));
    }

    fn subscribe_push(self: &Arc<Self>, job_id: &JobId) {
        let weak = Arc::downgrade(self);
        self.channel
            .subscribe(Topic::JobProgress(job_id.clone()), move |message| {
                let TopicMessage::JobProgress(report) = message else {
                    return;
                };
                if let Some(inner) = weak.upgrade() {
                    inner.apply(&report, ReportSource::Push);
                }
            });
    }

    /// Subscribe the push topic of every job that still has feeds.
    fn resubscribe_active(self: &Arc<Self>) {
        let mut jobs = self.jobs.lock();
        let mut count = 0usize;
        for (job_id, tracked) in jobs.iter_mut() {
            let Some(feeds) = tracked.feeds.as_mut() else {
                continue;
            };
            self.subscribe_push(job_id);
            feeds.push_subscribed = true;
            count += 1;
        }
        if count > 0 {
            tracing::info!(jobs = count, "Re-subscribed job progress after reconnect");
        }
    }
}

/// Re-subscribe active jobs every time the push channel becomes
/// `Connected`. The manager does not replay start frames itself.
fn spawn_resubscriber(
    inner: Weak<TrackerInner>,
    mut states: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        states.borrow_and_update();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            if *states.borrow_and_update() != ConnectionState::Connected {
                continue;
            }
            match inner.upgrade() {
                Some(inner) => inner.resubscribe_active(),
                None => break,
            }
        }
    });
}
