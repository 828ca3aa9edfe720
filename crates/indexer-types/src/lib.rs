//! # indexer-types
//!
//! Shared value types for the search indexer.
//!
//! - [`DelayPolicy`]: waits between indexing passes
//! - [`Checkpoint`]: opaque progress marker persisted with each commit
//! - [`IndexStatus`], [`Lifecycle`], [`PassOutcome`]: engine and index state
//! - [`IndexInfo`]: what the last commit recorded
//! - [`IndexReport`]: control-plane snapshot at a [`ReportLevel`]
//! - [`Settings`]: layered configuration

pub mod checkpoint;
pub mod config;
pub mod delay;
pub mod error;
pub mod info;
pub mod report;
pub mod status;

pub use checkpoint::Checkpoint;
pub use config::{DelaySettings, Settings};
pub use delay::DelayPolicy;
pub use error::TypesError;
pub use info::IndexInfo;
pub use report::{Activity, IndexReport, ReportLevel, ReportSource};
pub use status::{IndexStatus, Lifecycle, PassOutcome};
