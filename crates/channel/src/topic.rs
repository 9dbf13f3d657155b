//! Named subscription topics multiplexed over the push channel.
//!
//! A [`Topic`] knows its subscription-map key, the control frames that
//! open and close it on the server, and which incoming events belong
//! to it.

use std::fmt;

use gsadmin_core::job_events::{TOPIC_PREFIX_JOB_PROGRESS, TOPIC_PREFIX_LOGS};
use gsadmin_core::{JobId, ProgressReport};

use crate::messages::{ClientMessage, ContainerRef, JobRef, LogLine, ServerMessage};

/// A stream the client can subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Progress events for one background job.
    JobProgress(JobId),
    /// Log output of one game-server container.
    Logs(String),
}

/// Typed message delivered to a topic's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicMessage {
    JobProgress(ProgressReport),
    Log(LogLine),
}

impl Topic {
    /// Subscription-map key, e.g. `job-progress:J1` or `log:mc-01`.
    pub fn key(&self) -> String {
        match self {
            Topic::JobProgress(job_id) => format!("{TOPIC_PREFIX_JOB_PROGRESS}{job_id}"),
            Topic::Logs(container) => format!("{TOPIC_PREFIX_LOGS}{container}"),
        }
    }

    /// Control frame asking the server to begin streaming this topic.
    pub fn start_message(&self) -> ClientMessage {
        match self {
            Topic::JobProgress(job_id) => ClientMessage::StartJobProgress(JobRef {
                job_id: job_id.clone(),
            }),
            Topic::Logs(container) => ClientMessage::StartLogs(ContainerRef {
                container: container.clone(),
            }),
        }
    }

    /// Control frame letting the server release resources for this topic.
    pub fn stop_message(&self) -> ClientMessage {
        match self {
            Topic::JobProgress(job_id) => ClientMessage::StopJobProgress(JobRef {
                job_id: job_id.clone(),
            }),
            Topic::Logs(container) => ClientMessage::StopLogs(ContainerRef {
                container: container.clone(),
            }),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Split an incoming server message into the key of the topic it
/// belongs to and the typed payload for that topic's callback.
///
/// Returns `None` for messages that are not topic data (errors).
pub(crate) fn route(message: ServerMessage) -> Option<(String, TopicMessage)> {
    match message {
        ServerMessage::JobProgress(report) => {
            let key = Topic::JobProgress(report.job_id.clone()).key();
            Some((key, TopicMessage::JobProgress(report)))
        }
        ServerMessage::LogsData(line) => {
            let key = Topic::Logs(line.container.clone()).key();
            Some((key, TopicMessage::Log(line)))
        }
        ServerMessage::Error(_) => None,
    }
}
