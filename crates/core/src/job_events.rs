//! Push-channel event names for job progress and log streaming.
//!
//! The backend speaks named events over one WebSocket. Clients open a
//! stream with `start-<topic>`, close it with `stop-<topic>`, and
//! receive data as `job-progress` or `<topic>-data`.

/// Server → client: progress or terminal status for one job.
pub const EVENT_JOB_PROGRESS: &str = "job-progress";

/// Client → server: begin streaming progress for a job (`{ jobId }`).
pub const EVENT_START_JOB_PROGRESS: &str = "start-job-progress";

/// Client → server: stop streaming progress for a job (`{ jobId }`).
pub const EVENT_STOP_JOB_PROGRESS: &str = "stop-job-progress";

/// Server → client: one or more log lines for a container.
pub const EVENT_LOGS_DATA: &str = "logs-data";

/// Client → server: begin tailing a container's logs (`{ container }`).
pub const EVENT_START_LOGS: &str = "start-logs";

/// Client → server: stop tailing a container's logs (`{ container }`).
pub const EVENT_STOP_LOGS: &str = "stop-logs";

/// Server → client: a server-side error tied to a topic.
pub const EVENT_ERROR: &str = "error";

/// Subscription-map key prefix for job progress topics.
pub const TOPIC_PREFIX_JOB_PROGRESS: &str = "job-progress:";

/// Subscription-map key prefix for log topics.
pub const TOPIC_PREFIX_LOGS: &str = "log:";
