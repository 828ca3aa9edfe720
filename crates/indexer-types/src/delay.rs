//! Delay policy governing the pacing between indexing passes.
//!
//! A policy is an immutable triple of waits in milliseconds. The engine picks
//! one of them after every pass depending on how the pass ended.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TypesError;
use crate::status::PassOutcome;

/// Default wait after a pass that did work (run again immediately).
pub const DEFAULT_NORMAL_MS: u64 = 0;

/// Default wait after a pass that found nothing to do.
pub const DEFAULT_IDLE_MS: u64 = 30_000;

/// Default wait after a failed pass.
pub const DEFAULT_ERROR_MS: u64 = 60_000;

/// Wait durations used after successful, idle and failed passes.
///
/// Values are copy-on-write: the `with_*` methods return a new policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDelayPolicy", into = "RawDelayPolicy")]
pub struct DelayPolicy {
    normal_ms: u64,
    idle_ms: u64,
    error_ms: u64,
}

/// Unvalidated wire form, as delivered by transports and config files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawDelayPolicy {
    normal_ms: i64,
    idle_ms: i64,
    error_ms: i64,
}

impl TryFrom<RawDelayPolicy> for DelayPolicy {
    type Error = TypesError;

    fn try_from(raw: RawDelayPolicy) -> Result<Self, Self::Error> {
        DelayPolicy::of(raw.normal_ms, raw.idle_ms, raw.error_ms)
    }
}

impl From<DelayPolicy> for RawDelayPolicy {
    fn from(policy: DelayPolicy) -> Self {
        Self {
            normal_ms: policy.normal_ms as i64,
            idle_ms: policy.idle_ms as i64,
            error_ms: policy.error_ms as i64,
        }
    }
}

fn checked(name: &str, ms: i64) -> Result<u64, TypesError> {
    u64::try_from(ms)
        .map_err(|_| TypesError::InvalidArgument(format!("{name} delay must be >= 0, got {ms}")))
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self {
            normal_ms: DEFAULT_NORMAL_MS,
            idle_ms: DEFAULT_IDLE_MS,
            error_ms: DEFAULT_ERROR_MS,
        }
    }
}

impl DelayPolicy {
    /// Same wait after every kind of pass.
    pub fn constant(ms: i64) -> Result<Self, TypesError> {
        Self::of(ms, ms, ms)
    }

    /// Build an arbitrary policy.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::InvalidArgument` if any duration is negative.
    pub fn of(normal_ms: i64, idle_ms: i64, error_ms: i64) -> Result<Self, TypesError> {
        Ok(Self {
            normal_ms: checked("normal", normal_ms)?,
            idle_ms: checked("idle", idle_ms)?,
            error_ms: checked("error", error_ms)?,
        })
    }

    /// Copy with a different wait after passes that did work.
    pub fn with_normal(self, ms: i64) -> Result<Self, TypesError> {
        Ok(Self {
            normal_ms: checked("normal", ms)?,
            ..self
        })
    }

    /// Copy with a different wait after passes that found nothing to do.
    pub fn with_idle(self, ms: i64) -> Result<Self, TypesError> {
        Ok(Self {
            idle_ms: checked("idle", ms)?,
            ..self
        })
    }

    /// Copy with a different wait after failed passes.
    pub fn with_error(self, ms: i64) -> Result<Self, TypesError> {
        Ok(Self {
            error_ms: checked("error", ms)?,
            ..self
        })
    }

    pub fn normal(&self) -> Duration {
        Duration::from_millis(self.normal_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn error(&self) -> Duration {
        Duration::from_millis(self.error_ms)
    }

    /// Wait to apply after a pass that ended with `outcome`.
    pub fn delay_for(&self, outcome: PassOutcome) -> Duration {
        match outcome {
            PassOutcome::Updated => self.normal(),
            PassOutcome::Idle => self.idle(),
            PassOutcome::Failed => self.error(),
        }
    }
}

impl std::fmt::Display for DelayPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "normal={}ms idle={}ms error={}ms",
            self.normal_ms, self.idle_ms, self.error_ms
        )
    }
}
