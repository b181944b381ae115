//! Scans and scan configurations.
//!
//! Scan timestamps come back from the platform as strings such as
//! `2019-08-05T18:10:17.189` or `2019-08-05 18:10:17`, with fractional seconds
//! and no zone designator. They are kept verbatim on the wire types and
//! parsed on demand with [`parse_timestamp`], which treats them as UTC.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::InsightAppSecError;
use crate::app::{IdRef, Link, escape_query_value};
use crate::client::InsightAppSecClient;
use crate::search::{DEFAULT_PAGE_SIZE, PageRequest, Paginator, SearchPage, SearchRequest, SearchType};

const SCAN_SORT_SUBMIT_TIME_DESC: &str = "scan.submit_time,DESC";

/// Who submitted a scan
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Submitter {
    #[serde(rename = "type")]
    pub submitter_type: String,
}

/// A single DAST scan execution.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Scan {
    pub id: String,
    #[serde(default)]
    pub app: IdRef,
    #[serde(default)]
    pub scan_config: IdRef,
    #[serde(default)]
    pub submitter: Submitter,
    #[serde(default)]
    pub submit_time: String,
    #[serde(default)]
    pub completion_time: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Scan {
    /// Completion time as UTC, if the scan has finished and the value parses.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.completion_time)
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.submit_time)
    }
}

/// Scan environment assignment
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Assignment {
    #[serde(rename = "type")]
    pub assignment_type: String,
    pub environment: String,
}

/// Named scan configuration; scans reference one by id.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ScanConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub app: IdRef,
    #[serde(default)]
    pub attack_template: IdRef,
    #[serde(default)]
    pub assignment: Assignment,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Parse a platform timestamp, dropping sub-second precision and any `Z`.
///
/// Returns `None` for empty or unrecognised values.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let whole_seconds = raw.trim().split('.').next().unwrap_or_default();
    let normalized = whole_seconds.trim_end_matches('Z').replace(' ', "T");
    if normalized.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

impl InsightAppSecClient {
    /// List every scan of an application, newest submission first.
    ///
    /// # Errors
    ///
    /// Returns an error if any page of the search fails.
    pub async fn search_scans(&self, app_id: &str) -> Result<Vec<Scan>, InsightAppSecError> {
        let request = SearchRequest::new(
            SearchType::Scan,
            format!("scan.app.id='{}'", escape_query_value(app_id)),
        )
        .with_sort(SCAN_SORT_SUBMIT_TIME_DESC);
        self.search_all(&request).await
    }

    /// Get a scan by id.
    ///
    /// # Errors
    ///
    /// Returns [`InsightAppSecError::NotFound`] for an unknown id.
    pub async fn get_scan(&self, scan_id: &str) -> Result<Scan, InsightAppSecError> {
        let endpoint = format!("/scans/{}", urlencoding::encode(scan_id));
        self.get_json(&endpoint, &[]).await
    }

    /// List every scan configuration in the account.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails; partial listings are discarded.
    pub async fn get_scan_configs(&self) -> Result<Vec<ScanConfig>, InsightAppSecError> {
        let configs = Paginator::new(move |page: PageRequest| async move {
            let index = page.index.to_string();
            let size = page.size.to_string();
            self.get_json::<SearchPage<ScanConfig>>(
                "/scan-configs",
                &[("index", index.as_str()), ("size", size.as_str())],
            )
            .await
        })
        .with_page_size(DEFAULT_PAGE_SIZE)
        .collect_all()
        .await?;

        debug!("Retrieved {} scan configurations", configs.len());
        Ok(configs)
    }

    /// Resolve one scan configuration by id.
    ///
    /// The platform has no direct lookup, so this walks the full listing.
    ///
    /// # Errors
    ///
    /// Returns [`InsightAppSecError::NotFound`] when no configuration has the id.
    pub async fn get_scan_config(&self, config_id: &str) -> Result<ScanConfig, InsightAppSecError> {
        self.get_scan_configs()
            .await?
            .into_iter()
            .find(|config| config.id == config_id)
            .ok_or_else(|| InsightAppSecError::NotFound(format!("scan config {config_id}")))
    }
}
