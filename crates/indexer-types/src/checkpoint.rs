//! Opaque indexing checkpoints.
//!
//! A checkpoint marks how far indexing has progressed. Only the indexing
//! routine interprets its contents (an offset, a timestamp, a cursor...);
//! the engine just stores it alongside each commit. The absence of a
//! checkpoint (`None`) means no progress has been made yet.

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Non-empty progress marker persisted with every commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Checkpoint(String);

impl Checkpoint {
    /// Create a checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `TypesError::InvalidArgument` for an empty value, which would
    /// be indistinguishable from "no checkpoint".
    pub fn new(value: impl Into<String>) -> Result<Self, TypesError> {
        let value = value.into();
        if value.is_empty() {
            return Err(TypesError::InvalidArgument(
                "checkpoint must not be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse the checkpoint as an unsigned offset.
    ///
    /// Convenience for routines that encode a position as a number.
    pub fn as_offset(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl TryFrom<String> for Checkpoint {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Checkpoint::new(value)
    }
}

impl From<Checkpoint> for String {
    fn from(checkpoint: Checkpoint) -> Self {
        checkpoint.0
    }
}

impl std::str::FromStr for Checkpoint {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Checkpoint::new(s)
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Checkpoint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
