pub mod follow;
pub mod logs;
pub mod start;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use gsadmin_channel::{ChannelConfig, ChannelManager, ConnectionState};
use gsadmin_jobs::{JobTracker, JobsApi, TrackerConfig};

use crate::cli::{Cli, Command, GlobalArgs};

/// Run the selected subcommand and return the process exit code.
pub async fn execute(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Start(args) => start::execute(&cli.global, args).await,
        Command::Watch(args) => watch::execute(&cli.global, args).await,
        Command::Logs(args) => logs::execute(&cli.global, args).await,
    }
}

/// Connect the push channel, logging its errors.
///
/// Never fails: an unreachable backend leaves the channel disconnected.
pub async fn connect_channel(global: &GlobalArgs) -> ChannelManager {
    let channel = ChannelManager::websocket(ChannelConfig::from_env());
    channel.add_error_listener(|e| tracing::warn!(error = %e, "Push channel error"));

    let state = channel.connect(&global.url, &global.token).await;
    tracing::debug!(?state, url = %global.url, "Push channel connect finished");
    channel
}

/// Build a tracker over a freshly connected channel and the HTTP API.
pub async fn connect_tracker(global: &GlobalArgs, api: Arc<JobsApi>) -> JobTracker {
    let channel = connect_channel(global).await;
    if channel.state() == ConnectionState::Disconnected {
        eprintln!("Live updates unavailable; falling back to polling");
    }

    JobTracker::new(channel, api, tracker_config(global))
}

pub fn tracker_config(global: &GlobalArgs) -> TrackerConfig {
    let config = TrackerConfig::from_env();
    match global.poll_interval_ms {
        Some(ms) => config.with_poll_interval(Duration::from_millis(ms.max(1))),
        None => config,
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be
/// installed.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
