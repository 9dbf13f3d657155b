//! `gsadmin` -- fleet admin command-line client.
//!
//! Starts and follows long-running backend jobs and tails container
//! logs. Job progress comes from the WebSocket push channel when the
//! backend is reachable and from polling `GET /jobs/{id}` otherwise.
//!
//! # Environment variables
//!
//! | Variable                   | Default                 | Description                     |
//! |----------------------------|-------------------------|---------------------------------|
//! | `GSADMIN_URL`              | `http://localhost:3001` | Backend base URL                |
//! | `GSADMIN_TOKEN`            | (empty)                 | Bearer token                    |
//! | `GSADMIN_POLL_INTERVAL_MS` | `2000`                  | Status poll interval            |
//! | `LOG_FORMAT`               | `text`                  | `json` for JSON log lines       |
//! | `RUST_LOG`                 | `gsadmin=info`          | Log filter                      |
//!
//! Push-channel tuning (`GSADMIN_WS_PATH`, timeouts, reconnect bounds)
//! is read by `ChannelConfig::from_env`.
//!
//! Exit codes: 0 when the job completed, 1 when it failed or the
//! command errored, 2 when it was cancelled or interrupted.

use clap::Parser;

use gsadmin_cli::cli::Cli;
use gsadmin_cli::{commands, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init();

    let code = commands::execute(cli).await?;
    std::process::exit(code);
}
