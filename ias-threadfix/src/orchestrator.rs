//! Runs export configurations end to end: resolve the ThreadFix application,
//! select scans, convert them, and upload them one at a time.

use chrono::{DateTime, Utc};
use insightappsec_api::{Application, InsightAppSecError, Scan};
use log::{error, info, warn};
use std::time::Instant;

use crate::conversion::{ScanConverter, SeverityMapper};
use crate::error::{Result, SyncError};
use crate::metrics::{IngestionMode, MetricEvent, MetricsSink};
use crate::persist::ScanPersister;
use crate::selection;
use crate::settings::ExportConfiguration;
use crate::source::{DestinationApi, SourceApi};
use crate::threadfix::ThreadFixApplication;

/// Totals for one pass over the export configurations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub configurations_processed: usize,
    pub configurations_failed: usize,
    pub scans_uploaded: usize,
    pub scans_failed: usize,
}

/// Upload outcomes for one application or export configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportTally {
    pub uploaded: usize,
    pub failed: usize,
}

impl ImportTally {
    fn add(&mut self, other: ImportTally) {
        self.uploaded += other.uploaded;
        self.failed += other.failed;
    }
}

/// The synchronisation engine.
///
/// Everything it needs is passed in; it holds no global state.
pub struct SyncEngine<'a, S, D> {
    source: &'a S,
    destination: &'a D,
    severities: SeverityMapper,
    metrics: &'a dyn MetricsSink,
    persister: Option<ScanPersister>,
}

impl<'a, S: SourceApi, D: DestinationApi> SyncEngine<'a, S, D> {
    pub fn new(
        source: &'a S,
        destination: &'a D,
        severities: SeverityMapper,
        metrics: &'a dyn MetricsSink,
    ) -> Self {
        Self {
            source,
            destination,
            severities,
            metrics,
            persister: None,
        }
    }

    /// Write each converted scan to disk before uploading it.
    #[must_use]
    pub fn with_persister(mut self, persister: ScanPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Process every enabled configuration in order.
    ///
    /// A failing configuration is logged and does not stop the others.
    pub async fn run<'c>(
        &self,
        configurations: impl IntoIterator<Item = &'c ExportConfiguration>,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        for export in configurations.into_iter().filter(|c| c.enabled) {
            info!("Begin processing [{}] export configuration", export.name);
            match self.process_configuration(export).await {
                Ok(tally) => {
                    summary.configurations_processed += 1;
                    summary.scans_uploaded += tally.uploaded;
                    summary.scans_failed += tally.failed;
                }
                Err(e) => {
                    error!("Export configuration [{}] failed: {e}", export.name);
                    summary.configurations_failed += 1;
                }
            }
            info!("End processing [{}] export configuration", export.name);
        }
        summary
    }

    /// Process one export configuration and tally its uploads.
    ///
    /// # Errors
    ///
    /// Fails when the ThreadFix application cannot be resolved or a listing
    /// needed for selection fails.
    pub async fn process_configuration(&self, export: &ExportConfiguration) -> Result<ImportTally> {
        let now = Utc::now();
        let applications = self
            .source
            .search_applications(&export.application_scope)
            .await?;
        info!(
            "{} InsightAppSec applications match scope '{}'",
            applications.len(),
            export.application_scope
        );

        if !export.map_application_by_name {
            let started = Instant::now();
            let target = self
                .resolve_application(&export.threadfix_team_name, &export.threadfix_application_name)
                .await?;
            info!(
                "Mapping InsightAppSec applications to {} ThreadFix application (ID: {})",
                target.name, target.id
            );

            let result = self
                .process_application(&target, export, &applications, now)
                .await;
            self.metrics.record(&MetricEvent::ConfigurationProcessed {
                export_configuration: export.name.clone(),
                application_name: export.threadfix_application_name.clone(),
                mode: IngestionMode::BulkApplication,
                number_of_apps: applications.len(),
                number_of_scans: result.as_ref().map_or(0, |tally| tally.uploaded),
                success: result.is_ok(),
                duration_secs: started.elapsed().as_secs_f64(),
            });
            return result;
        }

        info!(
            "Mapping ThreadFix and InsightAppSec applications by name for export configuration {}",
            export.name
        );
        let mut total = ImportTally::default();
        for application in &applications {
            let started = Instant::now();
            let target = self
                .resolve_application(&export.threadfix_team_name, &application.name)
                .await?;

            let result = self
                .process_application(&target, export, std::slice::from_ref(application), now)
                .await;
            self.metrics.record(&MetricEvent::ConfigurationProcessed {
                export_configuration: export.name.clone(),
                application_name: application.name.clone(),
                mode: IngestionMode::MapApplicationByName,
                number_of_apps: applications.len(),
                number_of_scans: result.as_ref().map_or(0, |tally| tally.uploaded),
                success: result.is_ok(),
                duration_secs: started.elapsed().as_secs_f64(),
            });
            total.add(result?);
        }
        Ok(total)
    }

    async fn resolve_application(
        &self,
        team_name: &str,
        app_name: &str,
    ) -> Result<ThreadFixApplication> {
        self.destination
            .get_application_by_name(team_name, app_name)
            .await
            .map_err(|e| {
                SyncError::DestinationResolution(format!(
                    "team '{team_name}', application '{app_name}': {e}"
                ))
            })
    }

    async fn process_application(
        &self,
        target: &ThreadFixApplication,
        export: &ExportConfiguration,
        applications: &[Application],
        now: DateTime<Utc>,
    ) -> Result<ImportTally> {
        let existing = self.destination.list_scans(target.id).await?;
        let scans =
            selection::select_scans(self.source, export, applications, &existing, now).await?;
        info!(
            "{} scan(s) queued for ThreadFix application {}",
            scans.len(),
            target.name
        );

        let mut tally = ImportTally::default();
        for scan in &scans {
            if self.import_scan(target.id, scan).await {
                tally.uploaded += 1;
            } else {
                tally.failed += 1;
            }
        }
        info!(
            "{} scans submitted for upload to ThreadFix, {} failed",
            tally.uploaded, tally.failed
        );
        Ok(tally)
    }

    /// Convert and upload one scan. Returns whether ThreadFix accepted it.
    ///
    /// Failures are logged, never propagated, so the caller moves on to the next scan.
    pub async fn import_scan(&self, app_id: i64, scan: &Scan) -> bool {
        let vulnerabilities = match self.source.search_vulnerabilities(&scan.id).await {
            Ok(vulnerabilities) => vulnerabilities,
            Err(e) => {
                error!("Skipping scan {}: vulnerabilities unavailable: {e}", scan.id);
                return false;
            }
        };

        let converter = ScanConverter::new(self.source, &self.severities, self.metrics);
        let threadfix_scan = converter.convert_scan(scan, &vulnerabilities).await;

        if let Some(persister) = &self.persister
            && let Err(e) = persister.persist(&scan.id, &threadfix_scan)
        {
            error!("Failed to persist scan {}: {e}", scan.id);
        }

        info!(
            "Beginning ThreadFix scan upload. {}",
            threadfix_scan.executive_summary
        );
        let started = Instant::now();
        let success = match self.destination.upload_scan(app_id, &threadfix_scan).await {
            Ok(response) if response.success => {
                info!(
                    "ThreadFix scan successfully submitted for upload. {}",
                    threadfix_scan.executive_summary
                );
                true
            }
            Ok(response) => {
                error!("Unsuccessful scan upload: {}", response.message);
                false
            }
            Err(e) => {
                error!("Error uploading scan {} to ThreadFix: {e}", scan.id);
                false
            }
        };

        self.metrics.record(&MetricEvent::ScanUploaded {
            executive_summary: threadfix_scan.executive_summary.clone(),
            findings: threadfix_scan.findings.len(),
            success,
            duration_secs: started.elapsed().as_secs_f64(),
        });
        success
    }

    /// Import one scan by id into a named ThreadFix application, bypassing selection.
    ///
    /// # Errors
    ///
    /// Fails when the application or the scan cannot be found.
    pub async fn import_scan_by_id(
        &self,
        scan_id: &str,
        app_name: &str,
        team_name: &str,
    ) -> Result<bool> {
        let target = self.resolve_application(team_name, app_name).await?;
        let scan = self.source.get_scan(scan_id).await?;
        if scan.id.is_empty() {
            warn!("Scan lookup for {scan_id} returned an empty record");
            return Err(SyncError::Source(InsightAppSecError::NotFound(format!(
                "scan {scan_id}; verify the scan ID and try again"
            ))));
        }
        Ok(self.import_scan(target.id, &scan).await)
    }
}
