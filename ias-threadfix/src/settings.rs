//! Settings file loading and validation.
//!
//! Settings come from a YAML or TOML file (format picked by extension) layered
//! under environment variables prefixed `IAS_THREADFIX__`, with `__` between
//! nested keys:
//!
//! ```bash
//! IAS_THREADFIX__CONNECTIONS__THREADFIX__APIKEY=... ias-threadfix run
//! ```
//!
//! The loaded value is immutable; every operation receives it explicitly.

use config::{Config, Environment, File, FileFormat};
use insightappsec_api::InsightAppSecConfig;
use log::LevelFilter;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::threadfix::ThreadFixConfig;

pub const DEFAULT_SETTINGS_PATH: &str = "./configs/settings.yaml";
pub const ENV_PREFIX: &str = "IAS_THREADFIX";

const REDACTED: &str = "********";

/// Complete application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub version: String,
    pub connections: ConnectionSettings,
    #[serde(
        default,
        rename = "exportConfigurations",
        alias = "exportconfigurations",
        alias = "export_configurations"
    )]
    pub export_configurations: Vec<ExportConfiguration>,
    #[serde(
        default,
        rename = "severityMappings",
        alias = "severitymappings",
        alias = "severity_mappings"
    )]
    pub severity_mappings: Vec<SeverityMapping>,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub insightappsec: InsightAppSecConnection,
    pub threadfix: ThreadFixConnection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightAppSecConnection {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(
        default = "empty_secret",
        deserialize_with = "deserialize_secret",
        serialize_with = "serialize_redacted"
    )]
    pub apikey: SecretString,
    /// Overrides the regional endpoint when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadFixConnection {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: String,
    #[serde(
        default = "empty_secret",
        deserialize_with = "deserialize_secret",
        serialize_with = "serialize_redacted"
    )]
    pub apikey: SecretString,
}

/// A named rule set describing which source scans go to which ThreadFix application(s).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfiguration {
    pub name: String,
    pub enabled: bool,
    /// `LIKE` pattern matched against InsightAppSec application names
    pub application_scope: String,
    /// Regular expression matched against scan configuration names
    pub scan_config_filter: String,
    pub last_scan_only: bool,
    pub initial_import_max_days: u32,
    pub map_application_by_name: bool,
    pub threadfix_application_name: String,
    pub threadfix_team_name: String,
}

impl ExportConfiguration {
    /// Describe every problem with this configuration.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let label = if self.name.trim().is_empty() {
            "<unnamed>"
        } else {
            self.name.as_str()
        };
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("export configuration has no name".to_string());
        }
        if self.application_scope.trim().is_empty() {
            problems.push(format!("[{label}] application_scope is empty"));
        }
        if self.threadfix_team_name.trim().is_empty() {
            problems.push(format!("[{label}] threadfix_team_name is empty"));
        }
        if !self.map_application_by_name && self.threadfix_application_name.trim().is_empty() {
            problems.push(format!(
                "[{label}] threadfix_application_name is required when map_application_by_name is false"
            ));
        }
        if let Err(e) = Regex::new(&self.scan_config_filter) {
            problems.push(format!("[{label}] scan_config_filter is not a valid regex: {e}"));
        }
        problems
    }
}

/// Maps an InsightAppSec severity onto a ThreadFix severity name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityMapping {
    pub insightappsec: String,
    pub threadfix: String,
}

impl SeverityMapping {
    pub fn new(insightappsec: impl Into<String>, threadfix: impl Into<String>) -> Self {
        Self {
            insightappsec: insightappsec.into(),
            threadfix: threadfix.into(),
        }
    }
}

/// Identity mapping used when the settings file defines none.
#[must_use]
pub fn default_severity_mappings() -> Vec<SeverityMapping> {
    ["Info", "Low", "Medium", "High", "Critical"]
        .into_iter()
        .map(|level| SeverityMapping::new(level, level))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub interval_minutes: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub directory: Option<String>,
    pub filename: Option<String>,
    pub level: String,
    pub stdout: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            filename: None,
            level: "info".to_string(),
            stdout: true,
        }
    }
}

impl LoggingSettings {
    /// Parse the configured level.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` for anything but debug, info, warn or error.
    pub fn level_filter(&self) -> Result<LevelFilter> {
        parse_level(&self.level)
    }
}

/// Parse a log level name (`debug`, `info`, `warn`/`warning`, `error`).
///
/// # Errors
///
/// Returns `ConfigurationInvalid` for unknown names.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "debug" => Ok(LevelFilter::Debug),
        "info" => Ok(LevelFilter::Info),
        "warn" | "warning" => Ok(LevelFilter::Warn),
        "error" => Ok(LevelFilter::Error),
        other => Err(SyncError::ConfigurationInvalid(format!(
            "unknown log level '{other}' (expected debug, info, warn or error)"
        ))),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub directory: Option<String>,
    pub filename: Option<String>,
    pub pretty: bool,
}

impl Settings {
    /// Load settings from a file, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::ConfigurationInvalid(format!(
                "settings file not found: {}",
                path.display()
            )));
        }

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Parse settings from an in-memory document, then apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed.
    pub fn parse(contents: &str, format: FileFormat) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, format))
            .add_source(env_source())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Check everything a sync run depends on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` listing every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let ias = &self.connections.insightappsec;
        if ias.apikey.expose_secret().trim().is_empty() {
            problems.push("connections.insightappsec.apikey is empty".to_string());
        }
        if ias.region.trim().is_empty() && ias.base_url.is_none() {
            problems.push("connections.insightappsec.region is empty".to_string());
        }

        let tf = &self.connections.threadfix;
        if tf.host.trim().is_empty() {
            problems.push("connections.threadfix.host is empty".to_string());
        }
        if tf.apikey.expose_secret().trim().is_empty() {
            problems.push("connections.threadfix.apikey is empty".to_string());
        }

        for export in self.export_configurations.iter().filter(|c| c.enabled) {
            problems.extend(export.problems());
        }

        if self.scheduler.interval_minutes == 0 {
            problems.push("scheduler.interval_minutes must be greater than 0".to_string());
        }
        if let Err(e) = self.logging.level_filter() {
            problems.push(e.to_string());
        }
        if !self.logging.stdout && crate::logging::log_file_path(&self.logging).is_none() {
            problems.push(
                "logging.stdout is false but no logging.directory or logging.filename is set"
                    .to_string(),
            );
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConfigurationInvalid(problems.join("; ")))
        }
    }

    /// Export configurations that are switched on, in file order.
    pub fn enabled_export_configurations(&self) -> impl Iterator<Item = &ExportConfiguration> {
        self.export_configurations.iter().filter(|c| c.enabled)
    }

    /// Configured severity mappings, or the identity defaults when none are set.
    #[must_use]
    pub fn effective_severity_mappings(&self) -> Vec<SeverityMapping> {
        if self.severity_mappings.is_empty() {
            default_severity_mappings()
        } else {
            self.severity_mappings.clone()
        }
    }

    /// Client configuration for InsightAppSec.
    #[must_use]
    pub fn insightappsec_config(&self) -> InsightAppSecConfig {
        let connection = &self.connections.insightappsec;
        let config = InsightAppSecConfig::new(connection.apikey.expose_secret())
            .with_region(connection.region.as_str());
        match &connection.base_url {
            Some(base_url) => config.with_base_url(base_url.as_str()),
            None => config,
        }
    }

    /// Client configuration for ThreadFix.
    #[must_use]
    pub fn threadfix_config(&self) -> ThreadFixConfig {
        let connection = &self.connections.threadfix;
        ThreadFixConfig::new(
            connection.host.as_str(),
            connection.port.as_str(),
            connection.apikey.clone(),
        )
    }

    /// Pretty JSON rendering with API keys masked.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_redacted_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn default_region() -> String {
    "us".to_string()
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn serialize_redacted<S>(secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if secret.expose_secret().is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str(REDACTED)
    }
}
