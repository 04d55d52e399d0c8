//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler job state as observed by the tools
///
/// jobctl never drives these transitions. It requests creation (submit) or
/// termination (cancel) and later observes the result:
/// `Pending -> Running -> {Completing -> Completed | Cancelled | Failed}`.
/// `Unknown` is what a lookup yields once the scheduler has purged the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Completing,
    Completed,
    Cancelled,
    Failed,
    Unknown,
}

impl JobState {
    /// Map a scheduler state string (long or compact form) to a state
    pub fn parse(raw: &str) -> Self {
        // "CANCELLED by 1234" carries the requesting uid
        let word = raw.split_whitespace().next().unwrap_or("");
        match word.trim_end_matches('+').to_ascii_uppercase().as_str() {
            "PENDING" | "PD" => Self::Pending,
            "RUNNING" | "R" => Self::Running,
            "COMPLETING" | "CG" => Self::Completing,
            "COMPLETED" | "CD" => Self::Completed,
            "CANCELLED" | "CA" => Self::Cancelled,
            "FAILED" | "F" | "TIMEOUT" | "TO" | "NODE_FAIL" | "NF" | "OUT_OF_MEMORY" | "OOM"
            | "BOOT_FAIL" | "BF" | "DEADLINE" | "DL" | "PREEMPTED" | "PR" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Whether the job still occupies (or waits for) an allocation
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running | Self::Completing)
    }

    /// Scheduler spelling of this state
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completing => "COMPLETING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live or historical scheduler job
///
/// Owned by the scheduler. jobctl only holds one for the duration of a
/// single command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub name: String,
    pub state: JobState,
    /// Assigned execution host, empty until scheduled
    pub node: String,
    pub partition: String,
    pub user: String,
    pub elapsed: String,
    pub time_limit: String,
    pub node_count: String,
    /// Pending reason, or node list once running
    pub reason: String,
}

/// Full scheduler record of a single job
///
/// Fields keep the order in which the scheduler printed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub id: String,
    pub fields: Vec<(String, String)>,
}

impl JobDetails {
    /// Get a raw field value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Assigned node list, `None` while unassigned
    pub fn node(&self) -> Option<&str> {
        self.get("NodeList")
            .or_else(|| self.get("BatchHost"))
            .filter(|n| !n.is_empty() && *n != "(null)")
    }

    /// Current job state
    pub fn state(&self) -> JobState {
        self.get("JobState")
            .map(JobState::parse)
            .unwrap_or(JobState::Unknown)
    }

    /// Partition the job was submitted to
    pub fn partition(&self) -> Option<&str> {
        self.get("Partition")
    }

    /// Job name as recorded by the scheduler
    pub fn name(&self) -> Option<&str> {
        self.get("JobName")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse() {
        assert_eq!(JobState::parse("PENDING"), JobState::Pending);
        assert_eq!(JobState::parse("R"), JobState::Running);
        assert_eq!(JobState::parse("completing"), JobState::Completing);
        assert_eq!(JobState::parse("CANCELLED by 1000"), JobState::Cancelled);
        assert_eq!(JobState::parse("TIMEOUT"), JobState::Failed);
        assert_eq!(JobState::parse("OUT_OF_MEMORY"), JobState::Failed);
        assert_eq!(JobState::parse("COMPLETED+"), JobState::Completed);
        assert_eq!(JobState::parse(""), JobState::Unknown);
        assert_eq!(JobState::parse("SUSPENDED"), JobState::Unknown);
    }

    #[test]
    fn test_active_states() {
        assert!(JobState::Pending.is_active());
        assert!(JobState::Running.is_active());
        assert!(!JobState::Completed.is_active());
        assert!(!JobState::Unknown.is_active());
    }

    #[test]
    fn test_details_accessors() {
        let details = JobDetails {
            id: "42".into(),
            fields: vec![
                ("JobId".into(), "42".into()),
                ("JobName".into(), "vllm_server".into()),
                ("JobState".into(), "RUNNING".into()),
                ("Partition".into(), "gpu".into()),
                ("NodeList".into(), "gpu-node-03".into()),
            ],
        };
        assert_eq!(details.node(), Some("gpu-node-03"));
        assert_eq!(details.state(), JobState::Running);
        assert_eq!(details.partition(), Some("gpu"));
        assert_eq!(details.name(), Some("vllm_server"));
    }

    #[test]
    fn test_details_unassigned_node() {
        let details = JobDetails {
            id: "7".into(),
            fields: vec![("NodeList".into(), "(null)".into())],
        };
        assert_eq!(details.node(), None);
        assert_eq!(details.state(), JobState::Unknown);
    }
}
