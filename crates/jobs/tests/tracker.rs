//! Integration tests for `JobTracker`.
//!
//! The push channel runs over the in-memory connector and the status
//! endpoint is a scripted source, with time paused so poll intervals
//! and reconnect backoff elapse instantly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;

use gsadmin_channel::memory::{MemoryConnector, ServerEnd};
use gsadmin_channel::{ChannelConfig, ChannelManager, ConnectionState};
use gsadmin_core::{JobId, JobKind, JobStatus, ProgressReport, ReportSource};
use gsadmin_jobs::{
    ApiError, DiscardReason, JobNotification, JobRecord, JobStatusSource, JobTracker,
    ProgressEntry, Reconciled, TrackerConfig, TrackerEvent,
};

const ENDPOINT: &str = "http://fleet.test:3001";

/// Status endpoint whose answers the test sets directly.
#[derive(Default)]
struct ScriptedSource {
    records: Mutex<HashMap<JobId, JobRecord>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn set(&self, id: &str, status: JobStatus, steps: &[&str]) {
        let record = JobRecord {
            id: job(id),
            status,
            progress: steps
                .iter()
                .map(|m| ProgressEntry {
                    message: m.to_string(),
                    timestamp: None,
                })
                .collect(),
            error: None,
        };
        self.records.lock().insert(job(id), record);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStatusSource for ScriptedSource {
    async fn job_status(&self, job_id: &JobId) -> Result<JobRecord, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| ApiError::Rejected(format!("job {job_id} not found")))
    }
}

struct Harness {
    tracker: JobTracker,
    channel: ChannelManager,
    connector: Arc<MemoryConnector>,
    server: Option<ServerEnd>,
    source: Arc<ScriptedSource>,
    events: broadcast::Receiver<TrackerEvent>,
}

fn job(id: &str) -> JobId {
    JobId::parse(id).unwrap()
}

async fn harness(reachable: bool) -> Harness {
    let connector = MemoryConnector::new();
    connector.set_reachable(reachable);
    let channel = ChannelManager::new(connector.clone(), ChannelConfig::default());
    channel.connect(ENDPOINT, "secret").await;
    let server = connector.take_server();

    let source = Arc::new(ScriptedSource::default());
    let tracker = JobTracker::new(
        channel.clone(),
        source.clone(),
        TrackerConfig::default().with_poll_interval(Duration::from_secs(1)),
    );
    let events = tracker.subscribe();

    Harness {
        tracker,
        channel,
        connector,
        server,
        source,
        events,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn drain_events(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn finished(events: &[TrackerEvent]) -> Vec<&JobNotification> {
    events
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::Finished(n) => Some(n),
            TrackerEvent::Updated(_) => None,
        })
        .collect()
}

fn event_names(server: &mut ServerEnd) -> Vec<String> {
    server
        .drain_frames()
        .into_iter()
        .map(|f| f["event"].as_str().unwrap_or_default().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Test: poll at 40%, push at 60%, poll completion stops both feeds
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_and_poll_reconcile_to_completion() {
    let mut h = harness(true).await;
    let mut server = h.server.take().unwrap();

    h.tracker.track(job("J1"), JobKind::ClusterProvision);
    assert_eq!(
        server.drain_frames(),
        vec![json!({ "event": "start-job-progress", "data": { "jobId": "J1" } })]
    );

    h.source.set(
        "J1",
        JobStatus::Running,
        &["Allocating nodes", "Installing runtime"],
    );
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.progress, 40);
    assert_eq!(snap.last_source, Some(ReportSource::Poll));

    server.send_event(
        "job-progress",
        json!({ "jobId": "J1", "status": "running", "progress": 60, "message": "Configuring nodes", "step": 3 }),
    );
    settle().await;

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.progress, 60);
    assert_eq!(snap.last_source, Some(ReportSource::Push));
    assert_eq!(snap.describe(), "[ 60%] Configuring nodes (step 3)");

    h.source.set(
        "J1",
        JobStatus::Completed,
        &["Allocating nodes", "Installing runtime", "Configuring nodes"],
    );
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.status, JobStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(h.tracker.active_count(), 0);
    assert_eq!(h.channel.subscription_count(), 0);
    assert_eq!(event_names(&mut server), vec!["stop-job-progress"]);

    let events = drain_events(&mut h.events);
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TrackerEvent::Updated(j) => Some(j.progress),
            TrackerEvent::Finished(_) => None,
        })
        .collect();
    assert_eq!(progress, vec![40, 60]);
    assert_matches!(finished(&events).as_slice(), [JobNotification::Succeeded(j)] if j.progress == 100);

    let calls = h.source.calls();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.source.calls(), calls);
}

// ---------------------------------------------------------------------------
// Test: the same terminal report twice notifies once
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_terminal_report_notifies_once() {
    let mut h = harness(true).await;
    h.tracker.track(job("J1"), JobKind::ServerDeploy);

    let done = ProgressReport::completed(job("J1"), "Server online");
    assert_eq!(h.tracker.apply(&done, ReportSource::Push), Reconciled::Finished);
    let after_first = h.tracker.snapshot(&job("J1")).unwrap();

    assert_eq!(
        h.tracker.apply(&done, ReportSource::Poll),
        Reconciled::Discarded(DiscardReason::AlreadyTerminal)
    );
    assert_eq!(h.tracker.snapshot(&job("J1")).unwrap(), after_first);

    let events = drain_events(&mut h.events);
    assert_eq!(finished(&events).len(), 1);
}

// ---------------------------------------------------------------------------
// Test: a failure seen first is not overturned by a later completion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn first_terminal_status_wins() {
    let mut h = harness(true).await;
    h.tracker.track(job("J1"), JobKind::ClusterProvision);

    h.tracker.apply(
        &ProgressReport::failed(job("J1"), 40, "node lost"),
        ReportSource::Poll,
    );
    h.tracker
        .apply(&ProgressReport::completed(job("J1"), ""), ReportSource::Push);

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.status, JobStatus::Failed);

    let events = drain_events(&mut h.events);
    assert_matches!(
        finished(&events).as_slice(),
        [JobNotification::Failed { error, .. }] if error == "node lost"
    );
}

// ---------------------------------------------------------------------------
// Test: a terminal push event stops the poll loop
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_failure_stops_polling() {
    let mut h = harness(true).await;
    let mut server = h.server.take().unwrap();
    h.source.set("J1", JobStatus::Running, &["Restoring volume"]);
    h.tracker.track(job("J1"), JobKind::BackupRestore);
    server.drain_frames();

    server.send_event(
        "job-progress",
        json!({ "jobId": "J1", "status": "failed", "progress": 10, "error": "checksum mismatch" }),
    );
    settle().await;

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.status, JobStatus::Failed);
    assert_eq!(snap.describe(), "Backup restore failed: checksum mismatch");
    assert_eq!(event_names(&mut server), vec!["stop-job-progress"]);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.source.calls(), 0);
    assert_eq!(finished(&drain_events(&mut h.events)).len(), 1);
}

// ---------------------------------------------------------------------------
// Test: with the probe down, tracking relies on polling alone
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn unreachable_push_channel_falls_back_to_polling() {
    let mut h = harness(false).await;
    assert_eq!(h.channel.state(), ConnectionState::Disconnected);
    assert!(h.server.is_none());

    h.tracker.track(job("J1"), JobKind::ServerDeploy);
    assert_eq!(h.channel.subscription_count(), 0);

    h.source.set("J1", JobStatus::Running, &["Pulling image"]);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(h.tracker.snapshot(&job("J1")).unwrap().progress, 25);

    h.source.set("J1", JobStatus::Completed, &["Pulling image", "Starting"]);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    let snap = h.tracker.snapshot(&job("J1")).unwrap();
    assert_eq!(snap.status, JobStatus::Completed);
    assert_eq!(snap.progress, 100);
    assert_eq!(h.connector.open_count(), 0);
    assert_matches!(
        finished(&drain_events(&mut h.events)).as_slice(),
        [JobNotification::Succeeded(_)]
    );
}

// ---------------------------------------------------------------------------
// Test: failed polls are ignored and the loop keeps going
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_polls_are_ignored() {
    let h = harness(false).await;
    h.tracker.track(job("J1"), JobKind::ClusterProvision);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    assert_eq!(h.source.calls(), 2);
    assert_eq!(h.tracker.snapshot(&job("J1")).unwrap().progress, 0);

    h.source.set("J1", JobStatus::Running, &["Allocating nodes"]);
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    assert_eq!(h.source.calls(), 3);
    assert_eq!(h.tracker.snapshot(&job("J1")).unwrap().progress, 20);
    assert_eq!(h.tracker.active_count(), 1);
}

// ---------------------------------------------------------------------------
// Test: cancel stops both feeds and discards late reports
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn cancel_stops_feeds() {
    let mut h = harness(true).await;
    let mut server = h.server.take().unwrap();
    h.source.set("J1", JobStatus::Running, &["Allocating nodes"]);
    h.tracker.track(job("J1"), JobKind::ClusterProvision);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    server.drain_frames();

    let cancelled = h.tracker.cancel(&job("J1")).unwrap();

    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.progress, 20);
    assert_eq!(event_names(&mut server), vec!["stop-job-progress"]);
    assert_eq!(h.tracker.active_count(), 0);

    assert_eq!(
        h.tracker.apply(
            &ProgressReport::running(job("J1"), 80, "late"),
            ReportSource::Push
        ),
        Reconciled::Discarded(DiscardReason::AlreadyTerminal)
    );

    let calls = h.source.calls();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.source.calls(), calls);

    assert_matches!(
        finished(&drain_events(&mut h.events)).as_slice(),
        [JobNotification::Cancelled(_)]
    );
    assert!(h.tracker.cancel(&job("unknown")).is_none());
}

// ---------------------------------------------------------------------------
// Test: shutdown mid-flight leaves no timers and no subscriptions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn shutdown_clears_everything() {
    let mut h = harness(true).await;
    let server = h.server.take().unwrap();
    h.source.set("J1", JobStatus::Running, &["a"]);
    h.source.set("J2", JobStatus::Running, &["b"]);
    h.tracker.track(job("J1"), JobKind::ClusterProvision);
    h.tracker.track(job("J2"), JobKind::ServerDeploy);
    assert_eq!(h.channel.subscription_count(), 2);

    h.connector.refuse_all_handshakes();
    server.close(None);
    settle().await;
    assert!(h.channel.has_pending_reconnect());

    h.tracker.shutdown().await;

    assert_eq!(h.tracker.active_count(), 0);
    assert_eq!(h.channel.subscription_count(), 0);
    assert!(!h.channel.has_pending_reconnect());
    assert_eq!(h.channel.state(), ConnectionState::Disconnected);

    let calls = h.source.calls();
    let opens = h.connector.open_count();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.source.calls(), calls);
    assert_eq!(h.connector.open_count(), opens);

    assert_eq!(
        h.tracker.snapshot(&job("J1")).unwrap().status,
        JobStatus::Running
    );
}

// ---------------------------------------------------------------------------
// Test: active jobs are re-subscribed after the channel reconnects
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reconnect_resubscribes_active_jobs() {
    let mut h = harness(true).await;
    let mut server = h.server.take().unwrap();
    h.tracker.track(job("J1"), JobKind::ClusterProvision);
    server.drain_frames();

    server.close(Some("backend restarting"));
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert!(h.channel.is_connected());

    let mut server = h.connector.take_server().expect("reconnected link");
    assert_eq!(
        server.drain_frames(),
        vec![json!({ "event": "start-job-progress", "data": { "jobId": "J1" } })]
    );

    server.send_event(
        "job-progress",
        json!({ "jobId": "J1", "status": "running", "progress": 30, "message": "Installing runtime" }),
    );
    settle().await;
    assert_eq!(h.tracker.snapshot(&job("J1")).unwrap().progress, 30);
}

// ---------------------------------------------------------------------------
// Test: tracking the same id twice changes nothing
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn track_is_idempotent() {
    let mut h = harness(true).await;
    let mut server = h.server.take().unwrap();

    let first = h.tracker.track(job("J1"), JobKind::ClusterProvision);
    let second = h.tracker.track(job("J1"), JobKind::ClusterProvision);

    assert_eq!(first, second);
    assert_eq!(h.tracker.active_count(), 1);
    assert_eq!(event_names(&mut server), vec!["start-job-progress"]);
}

// ---------------------------------------------------------------------------
// Test: forget drops the snapshot and stops a running job silently
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn forget_removes_job() {
    let mut h = harness(true).await;
    h.tracker.track(job("J1"), JobKind::Generic);

    let forgotten = h.tracker.forget(&job("J1")).unwrap();

    assert_eq!(forgotten.status, JobStatus::Running);
    assert!(h.tracker.snapshot(&job("J1")).is_none());
    assert_eq!(h.channel.subscription_count(), 0);
    assert!(drain_events(&mut h.events).is_empty());
    assert_eq!(
        h.tracker.apply(
            &ProgressReport::running(job("J1"), 10, "x"),
            ReportSource::Poll
        ),
        Reconciled::Discarded(DiscardReason::WrongJob)
    );
}

// ---------------------------------------------------------------------------
// Test: a zero poll interval is raised instead of stalling the job
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn zero_poll_interval_still_polls() {
    let connector = MemoryConnector::new();
    connector.set_reachable(false);
    let channel = ChannelManager::new(connector, ChannelConfig::default());
    channel.connect(ENDPOINT, "secret").await;

    let source = Arc::new(ScriptedSource::default());
    source.set("J1", JobStatus::Completed, &["done"]);
    let config = TrackerConfig::default().with_poll_interval(Duration::ZERO);
    assert!(!config.poll_interval.is_zero());
    let tracker = JobTracker::new(channel, source.clone(), config);

    tracker.track(job("J1"), JobKind::Generic);
    settle().await;

    assert_eq!(
        tracker.snapshot(&job("J1")).unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(tracker.active_count(), 0);
    assert!(source.calls() >= 1);
}

// ---------------------------------------------------------------------------
// Test: tracking during a probe that then fails leaves no push topic
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn failed_probe_during_track_leaves_polling_only() {
    let connector = MemoryConnector::new();
    connector.set_reachable(false);
    connector.set_probe_delay(Duration::from_millis(100));
    let channel = ChannelManager::new(connector.clone(), ChannelConfig::default());
    let source = Arc::new(ScriptedSource::default());
    let tracker = JobTracker::new(
        channel.clone(),
        source.clone(),
        TrackerConfig::default().with_poll_interval(Duration::from_secs(1)),
    );

    let connecting = tokio::spawn({
        let channel = channel.clone();
        async move { channel.connect(ENDPOINT, "secret").await }
    });
    settle().await;
    assert_eq!(channel.state(), ConnectionState::Connecting);

    tracker.track(job("J1"), JobKind::ServerDeploy);
    assert_eq!(connecting.await.unwrap(), ConnectionState::Disconnected);

    assert_eq!(channel.subscription_count(), 0);
    assert_eq!(connector.open_count(), 0);

    source.set("J1", JobStatus::Completed, &["Pulling image", "Starting"]);
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(
        tracker.snapshot(&job("J1")).unwrap().status,
        JobStatus::Completed
    );
    assert_eq!(tracker.active_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: a shut-down tracker starts no new feeds
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn track_after_shutdown_starts_nothing() {
    let h = harness(true).await;
    h.tracker.shutdown().await;
    h.source.set("J1", JobStatus::Running, &["a"]);

    let job_value = h.tracker.track(job("J1"), JobKind::Generic);

    assert_eq!(job_value.status, JobStatus::Running);
    assert_eq!(h.tracker.active_count(), 0);
    assert!(h.tracker.snapshot(&job("J1")).is_none());
    assert_eq!(h.channel.subscription_count(), 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.source.calls(), 0);
}
