//! ias-threadfix library - InsightAppSec to ThreadFix scan synchronisation
//!
//! For each enabled export configuration the engine finds InsightAppSec
//! applications and scans in scope, works out which scans ThreadFix has not
//! seen yet, converts their vulnerabilities into ThreadFix findings and
//! uploads one scan file per scan.
//!
//! The engine is generic over [`SourceApi`] and [`DestinationApi`], so it can
//! be driven by the real HTTP clients or by in-memory fakes.

pub mod cli;
pub mod conversion;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod persist;
pub mod selection;
pub mod service;
pub mod settings;
pub mod source;
pub mod threadfix;

// Re-export commonly used types
pub use conversion::{ScanConverter, SeverityMapper};
pub use error::{Result, SyncError};
pub use metrics::{LogMetricsSink, MetricEvent, MetricsSink};
pub use orchestrator::{ImportTally, RunSummary, SyncEngine};
pub use persist::ScanPersister;
pub use settings::{ExportConfiguration, Settings, SeverityMapping};
pub use source::{DestinationApi, SourceApi};
