//! CLI argument parsing for ias-threadfix
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::settings::DEFAULT_SETTINGS_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "ias-threadfix",
    version,
    about = "Synchronise Rapid7 InsightAppSec scans into ThreadFix",
    long_about = "Discovers InsightAppSec DAST scans for each enabled export configuration, \
converts their vulnerabilities into ThreadFix findings and uploads them to the mapped ThreadFix application(s).",
    after_help = "SETTINGS:
  Settings are read from a YAML or TOML file (default ./configs/settings.yaml).
  Any value can be overridden with IAS_THREADFIX__<SECTION>__<KEY>, e.g.
    IAS_THREADFIX__CONNECTIONS__THREADFIX__APIKEY=...

EXAMPLES:
  # One pass over all enabled export configurations
  ias-threadfix run

  # Keep running, syncing every 30 minutes, keeping a copy of each scan file
  ias-threadfix service --interval-minutes 30 --persist

  # Import a single scan into a ThreadFix application
  ias-threadfix import-scan --scan <SCAN_ID> --app \"Payments Portal\" --team Payments"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (YAML or TOML)
    #[arg(short, long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    pub config: PathBuf,

    /// Log level (debug, info, warn, error); overrides the settings file
    #[arg(long, global = true, value_parser = validate_log_level)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sync pass over all enabled export configurations
    Run {
        /// Write each converted scan to InsightAppSec-ScanID-<id>.json before upload
        #[arg(long)]
        persist: bool,
    },

    /// Sync now and then every N minutes until Ctrl+C
    Service {
        /// Minutes between sync passes (defaults to scheduler.interval_minutes)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=10080))]
        interval_minutes: Option<u64>,

        /// Write each converted scan to InsightAppSec-ScanID-<id>.json before upload
        #[arg(long)]
        persist: bool,
    },

    /// Convert and upload a single scan, bypassing scan selection
    ImportScan {
        /// InsightAppSec scan ID
        #[arg(long)]
        scan: String,

        /// ThreadFix application name
        #[arg(long)]
        app: String,

        /// ThreadFix team name
        #[arg(long)]
        team: String,

        /// Write the converted scan to InsightAppSec-ScanID-<id>.json before upload
        #[arg(long)]
        persist: bool,
    },

    /// List the severity names configured in ThreadFix
    Severities,

    /// Inspect the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective settings with API keys masked
    Print,
    /// Validate the settings and exit non-zero on problems
    Validate,
}

fn validate_log_level(s: &str) -> Result<String, String> {
    let level = s.trim().to_lowercase();
    match level.as_str() {
        "debug" | "info" | "warn" | "warning" | "error" => Ok(level),
        _ => Err(format!(
            "invalid log level '{s}' (expected debug, info, warn or error)"
        )),
    }
}
