//! Decides which InsightAppSec scans an export configuration should upload.
//!
//! Selection runs in three steps:
//!
//! 1. gather every scan of the applications resolved for the target;
//! 2. keep scans whose scan configuration name matches the filter regex;
//! 3. apply a date boundary that depends on the ThreadFix history.
//!
//! With no scans uploaded yet (initial import) the boundary is
//! `initial_import_max_days` back from today at midnight UTC and the result
//! is ordered oldest completion first. Otherwise (incremental import) only
//! scans completed strictly after the newest `updatedDate` already in
//! ThreadFix are kept, in the order InsightAppSec returned them.

use chrono::{DateTime, Days, Utc};
use insightappsec_api::{Application, Scan};
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;

use crate::error::Result;
use crate::settings::ExportConfiguration;
use crate::source::SourceApi;
use crate::threadfix::ScanMetadata;

/// Which date rule applies to a selection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    /// ThreadFix has no scans from this integration yet
    Initial,
    /// Only scans completed after the watermark are new
    Incremental { watermark: DateTime<Utc> },
}

impl ImportKind {
    /// Derive the import kind from the scans already in ThreadFix.
    #[must_use]
    pub fn from_existing(existing: &[ScanMetadata]) -> Self {
        match watermark(existing) {
            Some(watermark) => ImportKind::Incremental { watermark },
            None => ImportKind::Initial,
        }
    }
}

/// Newest `updatedDate` among existing scans, truncated to whole seconds.
#[must_use]
pub fn watermark(existing: &[ScanMetadata]) -> Option<DateTime<Utc>> {
    existing
        .iter()
        .map(|scan| scan.updated_date)
        .max()
        .and_then(|millis| DateTime::from_timestamp(millis.div_euclid(1000), 0))
}

/// Start of the initial import window: `max_days` before `now`, at midnight UTC.
#[must_use]
pub fn initial_import_boundary(now: DateTime<Utc>, max_days: u32) -> DateTime<Utc> {
    let shifted = now
        .checked_sub_days(Days::new(u64::from(max_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    shifted
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map_or(shifted, |midnight| midnight.and_utc())
}

/// Scans completed strictly after `boundary`; scans without a parseable
/// completion time are dropped.
#[must_use]
pub fn completed_after(scans: Vec<Scan>, boundary: DateTime<Utc>) -> Vec<Scan> {
    let total = scans.len();
    let kept: Vec<Scan> = scans
        .into_iter()
        .filter(|scan| scan.completed_at().is_some_and(|completed| completed > boundary))
        .collect();
    debug!(
        "Date filtering: {} of {total} scans completed after {boundary}",
        kept.len()
    );
    kept
}

/// The most recently submitted scan; the earliest in input order wins a tie.
#[must_use]
pub fn newest_submitted(scans: Vec<Scan>) -> Option<Scan> {
    let mut newest: Option<Scan> = None;
    for scan in scans {
        let is_newer = match &newest {
            None => true,
            Some(current) => scan.submitted_at() > current.submitted_at(),
        };
        if is_newer {
            newest = Some(scan);
        }
    }
    newest
}

/// Apply the date rule to scans that already passed the scope and config filters.
#[must_use]
pub fn apply_date_rule(
    scans: Vec<Scan>,
    kind: ImportKind,
    last_scan_only: bool,
    initial_import_max_days: u32,
    now: DateTime<Utc>,
) -> Vec<Scan> {
    match kind {
        ImportKind::Initial if last_scan_only => newest_submitted(scans).into_iter().collect(),
        ImportKind::Initial => {
            let boundary = initial_import_boundary(now, initial_import_max_days);
            let mut selected = completed_after(scans, boundary);
            selected.sort_by_key(Scan::completed_at);
            selected
        }
        ImportKind::Incremental { watermark } => {
            let selected = completed_after(scans, watermark);
            if last_scan_only {
                newest_submitted(selected).into_iter().collect()
            } else {
                selected
            }
        }
    }
}

/// Every scan of the given applications, in application order.
///
/// # Errors
///
/// Returns the first source error; partial listings are discarded.
pub async fn scans_for_applications<S: SourceApi>(
    source: &S,
    applications: &[Application],
) -> Result<Vec<Scan>> {
    let mut scans = Vec::new();
    for application in applications {
        let found = source.search_scans(&application.id).await?;
        debug!("Application {} has {} scans", application.name, found.len());
        scans.extend(found);
    }
    Ok(scans)
}

/// Keep scans whose scan configuration name matches `filter`.
///
/// The configuration listing is fetched once per call. A scan whose
/// configuration is missing from it, or every scan when the listing fails,
/// is dropped with a warning.
pub async fn filter_by_scan_config<S: SourceApi>(
    source: &S,
    scans: Vec<Scan>,
    filter: &Regex,
) -> Vec<Scan> {
    if scans.is_empty() {
        return scans;
    }

    let total = scans.len();
    let names: HashMap<String, String> = match source.list_scan_configs().await {
        Ok(configs) => configs
            .into_iter()
            .map(|config| (config.id, config.name))
            .collect(),
        Err(e) => {
            warn!("Unable to list scan configurations, dropping {total} scans: {e}");
            return Vec::new();
        }
    };

    let mut kept = Vec::with_capacity(total);
    for scan in scans {
        match names.get(&scan.scan_config.id) {
            Some(name) if filter.is_match(name) => kept.push(scan),
            Some(_) => {}
            None => warn!(
                "Dropping scan {} (scan configuration {} unresolved)",
                scan.id, scan.scan_config.id
            ),
        }
    }

    debug!(
        "Scan configuration filtering: {} of {total} scans matched '{}'",
        kept.len(),
        filter.as_str()
    );
    kept
}

/// Full selection pass over `applications` for one ThreadFix application.
///
/// Only scans belonging to `applications` are considered; the export's
/// `application_scope` is not searched again.
///
/// # Errors
///
/// Returns an error for an invalid filter regex or a failed source listing.
pub async fn select_scans<S: SourceApi>(
    source: &S,
    export: &ExportConfiguration,
    applications: &[Application],
    existing: &[ScanMetadata],
    now: DateTime<Utc>,
) -> Result<Vec<Scan>> {
    let filter = Regex::new(&export.scan_config_filter)?;
    let kind = ImportKind::from_existing(existing);

    match kind {
        ImportKind::Initial => info!(
            "Initial import; last scan only: {}, applications: {}",
            export.last_scan_only,
            applications.len()
        ),
        ImportKind::Incremental { watermark } => info!(
            "Incremental import after {watermark}; last scan only: {}, applications: {}",
            export.last_scan_only,
            applications.len()
        ),
    }

    let scans = scans_for_applications(source, applications).await?;
    let scans = filter_by_scan_config(source, scans, &filter).await;
    Ok(apply_date_rule(
        scans,
        kind,
        export.last_scan_only,
        export.initial_import_max_days,
        now,
    ))
}
