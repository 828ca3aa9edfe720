//! Index reports at increasing levels of detail.
//!
//! A report is a single struct whose higher-detail fields are only populated
//! at the requested level, so `Basic ⊂ Normal ⊂ Detailed` holds field by field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checkpoint::Checkpoint;
use crate::delay::DelayPolicy;
use crate::info::IndexInfo;
use crate::status::{IndexStatus, Lifecycle, PassOutcome};

/// Amount of detail requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    /// Status only
    Basic,
    /// Status, delays, generation, checkpoint and loop activity
    #[default]
    Normal,
    /// Everything in `Normal` plus the custom property mapping
    Detailed,
}

impl std::str::FromStr for ReportLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(ReportLevel::Basic),
            "normal" => Ok(ReportLevel::Normal),
            "detailed" => Ok(ReportLevel::Detailed),
            other => Err(format!("unknown report level: {}", other)),
        }
    }
}

/// What the background loop has been doing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// A pass is executing right now
    pub pass_in_progress: bool,
    /// Passes attempted since the engine was created
    pub passes_run: u64,
    /// How the last pass ended
    pub last_outcome: Option<PassOutcome>,
    /// Message of the last failure, cleared by the next successful pass
    pub last_error: Option<String>,
    /// When the last pass finished
    pub last_pass_at: Option<DateTime<Utc>>,
}

/// Everything a report can be assembled from.
#[derive(Debug, Clone, Copy)]
pub struct ReportSource<'a> {
    pub status: IndexStatus,
    pub lifecycle: Lifecycle,
    pub delays: DelayPolicy,
    pub info: &'a IndexInfo,
    /// Checkpoint the next pass will read
    pub checkpoint: Option<&'a Checkpoint>,
    pub activity: &'a Activity,
}

/// Snapshot of the engine handed to control-plane callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub level: ReportLevel,
    pub status: IndexStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delays: Option<DelayPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
}

impl IndexReport {
    /// Assemble a report at the requested level. Never fails.
    pub fn build(level: ReportLevel, source: ReportSource<'_>) -> Self {
        let mut report = Self {
            level,
            status: source.status,
            lifecycle: None,
            delays: None,
            generation: None,
            checkpoint: None,
            activity: None,
            properties: None,
        };

        if level >= ReportLevel::Normal {
            report.lifecycle = Some(source.lifecycle);
            report.delays = Some(source.delays);
            report.generation = Some(source.info.generation);
            report.checkpoint = source.checkpoint.cloned();
            report.activity = Some(source.activity.clone());
        }

        if level >= ReportLevel::Detailed {
            report.properties = Some(source.info.properties.clone());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_info() -> IndexInfo {
        let mut props = BTreeMap::new();
        props.insert("documents".to_string(), "12".to_string());
        IndexInfo::initial().next_generation(Some(Checkpoint::new("5").unwrap()), props)
    }

    fn source<'a>(info: &'a IndexInfo, activity: &'a Activity) -> ReportSource<'a> {
        ReportSource {
            status: IndexStatus::Ok,
            lifecycle: Lifecycle::Running,
            delays: DelayPolicy::default(),
            info,
            checkpoint: info.checkpoint.as_ref(),
            activity,
        }
    }

    #[test]
    fn test_basic_is_status_only() {
        let info = sample_info();
        let activity = Activity::default();
        let report = IndexReport::build(ReportLevel::Basic, source(&info, &activity));

        assert_eq!(report.status, IndexStatus::Ok);
        assert!(report.lifecycle.is_none());
        assert!(report.delays.is_none());
        assert!(report.generation.is_none());
        assert!(report.checkpoint.is_none());
        assert!(report.properties.is_none());
    }

    #[test]
    fn test_levels_are_nested() {
        let info = sample_info();
        let activity = Activity {
            passes_run: 3,
            ..Default::default()
        };

        let normal = IndexReport::build(ReportLevel::Normal, source(&info, &activity));
        let detailed = IndexReport::build(ReportLevel::Detailed, source(&info, &activity));

        assert_eq!(normal.generation, Some(1));
        assert_eq!(normal.checkpoint.as_ref().map(Checkpoint::as_str), Some("5"));
        assert!(normal.properties.is_none());

        assert_eq!(detailed.status, normal.status);
        assert_eq!(detailed.lifecycle, normal.lifecycle);
        assert_eq!(detailed.delays, normal.delays);
        assert_eq!(detailed.generation, normal.generation);
        assert_eq!(detailed.checkpoint, normal.checkpoint);
        assert_eq!(detailed.activity, normal.activity);
        assert_eq!(
            detailed.properties.unwrap().get("documents").map(String::as_str),
            Some("12")
        );
    }

    #[test]
    fn test_empty_engine_report() {
        let info = IndexInfo::initial();
        let activity = Activity::default();
        let report = IndexReport::build(
            ReportLevel::Detailed,
            ReportSource {
                status: IndexStatus::Unavailable,
                lifecycle: Lifecycle::Stopped,
                delays: DelayPolicy::default(),
                info: &info,
                checkpoint: None,
                activity: &activity,
            },
        );

        assert_eq!(report.status, IndexStatus::Unavailable);
        assert_eq!(report.generation, Some(0));
        assert!(report.checkpoint.is_none());
        assert_eq!(report.properties, Some(BTreeMap::new()));
    }

    #[test]
    fn test_report_level_parse() {
        assert_eq!("basic".parse::<ReportLevel>().unwrap(), ReportLevel::Basic);
        assert_eq!("DETAILED".parse::<ReportLevel>().unwrap(), ReportLevel::Detailed);
        assert!("verbose".parse::<ReportLevel>().is_err());
    }

    #[test]
    fn test_basic_json_omits_detail() {
        let info = sample_info();
        let activity = Activity::default();
        let report = IndexReport::build(ReportLevel::Basic, source(&info, &activity));
        let json = serde_json::to_string(&report).unwrap();

        assert!(json.contains("\"status\":\"OK\""));
        assert!(!json.contains("generation"));
        assert!(!json.contains("properties"));
    }
}
