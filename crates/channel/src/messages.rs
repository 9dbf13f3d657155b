//! Push-channel wire messages and parser.
//!
//! Every frame is a JSON object of the shape
//! `{"event": "<name>", "data": {...}}`. Server frames deserialize into
//! [`ServerMessage`]; control frames the client sends are built from
//! [`ClientMessage`].

use serde::{Deserialize, Serialize};

use gsadmin_core::{JobId, ProgressReport, Timestamp};

/// All known server → client events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerMessage {
    /// Progress or terminal status for one job.
    #[serde(rename = "job-progress")]
    JobProgress(ProgressReport),

    /// Log output from a container.
    #[serde(rename = "logs-data")]
    LogsData(LogLine),

    /// The server rejected a request or hit an error on a topic.
    #[serde(rename = "error")]
    Error(ServerErrorData),
}

/// Payload for `logs-data` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub container: String,
    /// Raw text; may contain several newline-separated lines.
    #[serde(alias = "data")]
    pub line: String,
    /// `stdout` or `stderr`, when the server reports it.
    #[serde(default)]
    pub stream: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Payload for `error` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerErrorData {
    pub message: String,
    /// Topic-scoped identifier the error refers to, if any.
    #[serde(default, alias = "jobId", alias = "container")]
    pub target: Option<String>,
}

/// All client → server control events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "start-job-progress")]
    StartJobProgress(JobRef),

    #[serde(rename = "stop-job-progress")]
    StopJobProgress(JobRef),

    #[serde(rename = "start-logs")]
    StartLogs(ContainerRef),

    #[serde(rename = "stop-logs")]
    StopLogs(ContainerRef),
}

/// `{ "jobId": ... }` control payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: JobId,
}

/// `{ "container": ... }` control payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRef {
    pub container: String,
}

impl ClientMessage {
    /// Encode as a JSON text frame.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("ClientMessage is always serialisable")
    }
}

/// Parse a push-channel text frame into a typed message.
///
/// Returns `Err` for malformed JSON or unknown `event` values.
/// Callers should log and continue.
pub fn parse_message(text: &str) -> Result<ServerMessage, serde_json::Error> {
    serde_json::from_str(text)
}
