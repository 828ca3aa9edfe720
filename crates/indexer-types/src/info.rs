//! Point-in-time description of the committed index.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;

/// State recorded with every commit.
///
/// Stored as the commit payload so the checkpoint can never diverge from the
/// documents it describes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Number of commits made to this index
    pub generation: u64,

    /// Progress marker of the last committed pass
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,

    /// Custom properties set by the indexing routine
    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// When the generation was committed (milliseconds since epoch)
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub committed_at: Option<DateTime<Utc>>,
}

impl IndexInfo {
    /// Info of an index that has never been committed.
    pub fn initial() -> Self {
        Self::default()
    }

    /// True until the first commit.
    pub fn is_initial(&self) -> bool {
        self.generation == 0
    }

    /// Info for the commit following this one.
    pub fn next_generation(
        &self,
        checkpoint: Option<Checkpoint>,
        properties: BTreeMap<String, String>,
    ) -> Self {
        Self {
            generation: self.generation + 1,
            checkpoint,
            properties,
            committed_at: Some(Utc::now()),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Serialize to JSON for storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_info() {
        let info = IndexInfo::initial();
        assert!(info.is_initial());
        assert_eq!(info.generation, 0);
        assert!(info.checkpoint.is_none());
        assert!(info.properties.is_empty());
        assert!(info.committed_at.is_none());
    }

    #[test]
    fn test_next_generation() {
        let info = IndexInfo::initial();
        let mut props = BTreeMap::new();
        props.insert("source".to_string(), "feed.jsonl".to_string());

        let next = info.next_generation(Some(Checkpoint::new("5").unwrap()), props);
        assert_eq!(next.generation, 1);
        assert_eq!(next.checkpoint.as_ref().map(Checkpoint::as_str), Some("5"));
        assert_eq!(next.property("source"), Some("feed.jsonl"));
        assert!(next.committed_at.is_some());
        assert!(!next.is_initial());
    }

    #[test]
    fn test_json_roundtrip_keeps_millis() {
        let info = IndexInfo::initial().next_generation(None, BTreeMap::new());
        let json = info.to_json().unwrap();
        let decoded = IndexInfo::from_json(&json).unwrap();

        assert_eq!(decoded.generation, info.generation);
        assert_eq!(decoded.checkpoint, None);
        assert_eq!(
            decoded.committed_at.map(|t| t.timestamp_millis()),
            info.committed_at.map(|t| t.timestamp_millis())
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let decoded = IndexInfo::from_json(r#"{"generation":3}"#).unwrap();
        assert_eq!(decoded.generation, 3);
        assert!(decoded.checkpoint.is_none());
        assert!(decoded.properties.is_empty());
    }
}
