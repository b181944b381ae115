//! Metric events emitted by the sync engine, and where they go.
//!
//! The engine only states facts as [`MetricEvent`]s. A [`MetricsSink`] decides
//! the format and destination: the `metrics` log target, or a JSON-lines file.

use chrono::Utc;
use log::{error, info};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;
use crate::settings::MetricsSettings;

const DEFAULT_METRICS_FILENAME: &str = "ias-threadfix-metrics.json";

/// How an export configuration maps source applications to ThreadFix applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestionMode {
    /// One ThreadFix application per InsightAppSec application of the same name
    MapApplicationByName,
    /// Every matched application funnels into one ThreadFix application
    BulkApplication,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricEvent {
    ScanConverted {
        scan_id: String,
        findings: usize,
        duration_secs: f64,
    },
    ConversionCache {
        scan_id: String,
        module_cache_hits: u32,
        module_api_requests: u32,
        attack_cache_hits: u32,
        attack_api_requests: u32,
    },
    ScanUploaded {
        executive_summary: String,
        findings: usize,
        success: bool,
        duration_secs: f64,
    },
    ConfigurationProcessed {
        export_configuration: String,
        application_name: String,
        mode: IngestionMode,
        number_of_apps: usize,
        number_of_scans: usize,
        success: bool,
        duration_secs: f64,
    },
}

#[derive(Serialize)]
struct MetricRecord<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a MetricEvent,
}

fn record_json(event: &MetricEvent, pretty: bool) -> serde_json::Result<String> {
    let record = MetricRecord {
        timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        event,
    };
    if pretty {
        serde_json::to_string_pretty(&record)
    } else {
        serde_json::to_string(&record)
    }
}

/// Receives metric events. Recording never fails the caller.
pub trait MetricsSink {
    fn record(&self, event: &MetricEvent);
}

/// Writes each event as JSON to the `metrics` log target.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn record(&self, event: &MetricEvent) {
        match record_json(event, false) {
            Ok(json) => info!(target: "metrics", "{json}"),
            Err(e) => error!("Failed to serialize metric event: {e}"),
        }
    }
}

/// Appends events to a file, one JSON document per line (or pretty-printed).
#[derive(Debug)]
pub struct FileMetricsSink {
    path: PathBuf,
    pretty: bool,
    file: Mutex<File>,
}

impl FileMetricsSink {
    /// Open (or create) the metrics file, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(path: impl AsRef<Path>, pretty: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            pretty,
            file: Mutex::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for FileMetricsSink {
    fn record(&self, event: &MetricEvent) {
        let json = match record_json(event, self.pretty) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize metric event: {e}");
                return;
            }
        };
        let Ok(mut file) = self.file.lock() else {
            error!("Metrics file lock poisoned; dropping event");
            return;
        };
        if let Err(e) = writeln!(file, "{json}") {
            error!("Failed to write metrics to {}: {e}", self.path.display());
        }
    }
}

/// Build the sink described by the `metrics` settings section.
///
/// A file sink is used when a directory or filename is configured; otherwise
/// events go to the log.
///
/// # Errors
///
/// Returns an error if the metrics file cannot be opened.
pub fn sink_from_settings(settings: &MetricsSettings) -> Result<Box<dyn MetricsSink>> {
    match (&settings.directory, &settings.filename) {
        (None, None) => Ok(Box::new(LogMetricsSink)),
        (directory, filename) => {
            let path = PathBuf::from(directory.as_deref().unwrap_or("."))
                .join(filename.as_deref().unwrap_or(DEFAULT_METRICS_FILENAME));
            info!("Writing metrics to {}", path.display());
            Ok(Box::new(FileMetricsSink::open(path, settings.pretty)?))
        }
    }
}
