//! Index status, engine lifecycle and pass outcomes.

use serde::{Deserialize, Serialize};

/// Health of the index as observed by the last pass attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexStatus {
    /// Last pass succeeded
    Ok,
    /// Index data is damaged; retried but needs an operator (e.g. reindex)
    Corrupt,
    /// I/O failure during the last pass; retried automatically
    #[serde(rename = "IOERROR")]
    IoError,
    /// A pass was cancelled after an unsafe mutation and rolled back
    Interrupted,
    /// No pass has completed yet, or the index could not be acquired
    #[default]
    Unavailable,
}

impl IndexStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, IndexStatus::Ok)
    }

    /// Failures that will not clear up without intervention.
    pub fn is_persistent_failure(&self) -> bool {
        matches!(self, IndexStatus::Corrupt)
    }

    /// Failures expected to clear up on a later retry.
    pub fn is_transient_failure(&self) -> bool {
        matches!(
            self,
            IndexStatus::IoError | IndexStatus::Interrupted | IndexStatus::Unavailable
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Ok => "OK",
            IndexStatus::Corrupt => "CORRUPT",
            IndexStatus::IoError => "IOERROR",
            IndexStatus::Interrupted => "INTERRUPTED",
            IndexStatus::Unavailable => "UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of the background indexing loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl Lifecycle {
    /// Starting or running: a start request is a no-op.
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Starting | Lifecycle::Running)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Stopped => write!(f, "stopped"),
            Lifecycle::Starting => write!(f, "starting"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Stopping => write!(f, "stopping"),
        }
    }
}

/// How a pass ended, selecting the delay before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Committed at least one change
    Updated,
    /// Found nothing to do
    Idle,
    /// Failed and rolled back
    Failed,
}

impl std::fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassOutcome::Updated => write!(f, "updated"),
            PassOutcome::Idle => write!(f, "idle"),
            PassOutcome::Failed => write!(f, "failed"),
        }
    }
}
