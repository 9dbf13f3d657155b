use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identifier the server assigns to a background job.
///
/// Never inspected or constructed client-side beyond checking that it
/// is non-empty; all tracking state is keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a server-issued id, rejecting empty or whitespace-only input.
    pub fn parse(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(CoreError::Validation("Job id must not be empty".to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_opaque_ids() {
        let id = JobId::parse("job_7f3a-01").unwrap();
        assert_eq!(id.as_str(), "job_7f3a-01");
        assert_eq!(id.to_string(), "job_7f3a-01");
    }

    #[test]
    fn parse_rejects_blank_ids() {
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("   ").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = JobId::parse("abc").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""abc""#);
    }
}
