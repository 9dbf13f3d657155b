use clap::{Args, Parser, Subcommand};

use gsadmin_core::{JobId, JobKind};

#[derive(Parser)]
#[command(
    name = "gsadmin",
    version,
    about = "Game-server fleet admin client",
    long_about = "Start and follow long-running fleet jobs (cluster provisioning, \
                  server deploys, backup restores) and tail container logs.\n\
                  Progress is taken from the live push channel when available \
                  and from polling otherwise."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Connection settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Backend base URL
    #[arg(long, env = "GSADMIN_URL", default_value = "http://localhost:3001", global = true)]
    pub url: String,

    /// Bearer token for the API and the push channel
    #[arg(long, env = "GSADMIN_TOKEN", default_value = "", hide_env_values = true, global = true)]
    pub token: String,

    /// Interval between job status polls, in milliseconds
    #[arg(long, env = "GSADMIN_POLL_INTERVAL_MS", global = true)]
    pub poll_interval_ms: Option<u64>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start a background job and follow it to completion
    Start(StartArgs),
    /// Follow an already running job
    Watch(WatchArgs),
    /// Stream a container's log output until interrupted
    Logs(LogsArgs),
}

#[derive(Args)]
pub struct StartArgs {
    /// Job kind (cluster-provision, server-deploy, backup-restore, generic)
    pub kind: JobKind,

    /// Job parameter as key=value; may be repeated
    #[arg(long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Job id returned when the job was started
    #[arg(value_parser = parse_job_id)]
    pub job_id: JobId,

    /// Job kind, used to estimate progress while polling
    #[arg(long, default_value = "generic")]
    pub kind: JobKind,
}

#[derive(Args)]
pub struct LogsArgs {
    /// Container name
    pub container: String,
}

/// Parse a `key=value` pair.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_job_id(raw: &str) -> Result<JobId, String> {
    JobId::parse(raw).map_err(|e| e.to_string())
}

/// Collect `--param` pairs into the JSON object sent as job params.
/// Later duplicates win.
pub fn params_json(params: &[(String, String)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    serde_json::Value::Object(map)
}
