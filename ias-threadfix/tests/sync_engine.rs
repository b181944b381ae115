//! End-to-end sync scenarios against in-memory InsightAppSec and ThreadFix fakes.

use chrono::{Duration as ChronoDuration, Utc};
use ias_threadfix::metrics::{IngestionMode, MetricEvent, MetricsSink};
use ias_threadfix::service;
use ias_threadfix::threadfix::{
    SCANNER_SOURCE, ScanMetadata, ThreadFixApplication, ThreadFixError, ThreadFixScan,
    UploadResponse,
};
use ias_threadfix::{
    DestinationApi, ExportConfiguration, SeverityMapper, SeverityMapping, SourceApi, SyncEngine,
};
use insightappsec_api::{
    Application, AttackDocumentation, Exchange, IdRef, InsightAppSecError, Module, RootCause,
    Scan, ScanConfig, Variance, Vulnerability, parse_timestamp,
};
use regex::Regex;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    applications: Vec<Application>,
    scans: HashMap<String, Vec<Scan>>,
    vulnerabilities: HashMap<String, Vec<Vulnerability>>,
    modules: HashMap<String, Module>,
    scan_configs: HashMap<String, ScanConfig>,
    scan_config_listing_fails: bool,
    module_lookups: Cell<usize>,
    attack_lookups: Cell<usize>,
    scan_config_listings: Cell<usize>,
}

/// `LIKE` matching, case-insensitive: `%` is any run of characters, `_` exactly one.
fn like(pattern: &str, name: &str) -> bool {
    let mut body = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' => body.push_str(".*"),
            '_' => body.push('.'),
            other => body.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    Regex::new(&format!("(?i)^{body}$")).is_ok_and(|re| re.is_match(name))
}

impl FakeSource {
    fn with_application(mut self, id: &str, name: &str) -> Self {
        self.applications.push(Application {
            id: id.to_string(),
            name: name.to_string(),
            ..Application::default()
        });
        self
    }

    /// Register a scan; scans are returned newest submission first.
    fn with_scan(mut self, scan: Scan, vulnerabilities: Vec<Vulnerability>) -> Self {
        self.vulnerabilities
            .insert(scan.id.clone(), vulnerabilities);
        let scans = self.scans.entry(scan.app.id.clone()).or_default();
        scans.push(scan);
        scans.sort_by(|a, b| b.submit_time.cmp(&a.submit_time));
        self
    }

    fn with_scan_config(mut self, id: &str, name: &str) -> Self {
        self.scan_configs.insert(
            id.to_string(),
            ScanConfig {
                id: id.to_string(),
                name: name.to_string(),
                ..ScanConfig::default()
            },
        );
        self
    }

    fn with_module(mut self, id: &str, name: &str) -> Self {
        self.modules.insert(
            id.to_string(),
            Module {
                id: id.to_string(),
                name: name.to_string(),
                description: format!("{name} description"),
            },
        );
        self
    }
}

impl SourceApi for FakeSource {
    async fn search_applications(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<Application>, InsightAppSecError> {
        Ok(self
            .applications
            .iter()
            .filter(|app| like(name_pattern, &app.name))
            .cloned()
            .collect())
    }

    async fn search_scans(&self, app_id: &str) -> Result<Vec<Scan>, InsightAppSecError> {
        Ok(self.scans.get(app_id).cloned().unwrap_or_default())
    }

    async fn get_scan(&self, scan_id: &str) -> Result<Scan, InsightAppSecError> {
        self.scans
            .values()
            .flatten()
            .find(|scan| scan.id == scan_id)
            .cloned()
            .ok_or_else(|| InsightAppSecError::NotFound(format!("scan {scan_id}")))
    }

    async fn search_vulnerabilities(
        &self,
        scan_id: &str,
    ) -> Result<Vec<Vulnerability>, InsightAppSecError> {
        self.vulnerabilities
            .get(scan_id)
            .cloned()
            .ok_or_else(|| InsightAppSecError::InvalidResponse("search failed".to_string()))
    }

    async fn get_module(&self, module_id: &str) -> Result<Module, InsightAppSecError> {
        self.module_lookups.set(self.module_lookups.get() + 1);
        self.modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| InsightAppSecError::NotFound(format!("module {module_id}")))
    }

    async fn get_attack_documentation(
        &self,
        _module_id: &str,
        attack_id: &str,
    ) -> Result<AttackDocumentation, InsightAppSecError> {
        self.attack_lookups.set(self.attack_lookups.get() + 1);
        Ok(AttackDocumentation {
            references: serde_json::Map::from_iter([
                (
                    "CWE-79".to_string(),
                    Value::from("https://cwe.mitre.org/data/definitions/79.html"),
                ),
                ("OWASP-2017-A7".to_string(), Value::from("")),
            ]),
            description: format!("Attack {attack_id}"),
            recommendation: "Encode output".to_string(),
        })
    }

    async fn list_scan_configs(&self) -> Result<Vec<ScanConfig>, InsightAppSecError> {
        self.scan_config_listings
            .set(self.scan_config_listings.get() + 1);
        if self.scan_config_listing_fails {
            return Err(InsightAppSecError::InvalidResponse("listing failed".to_string()));
        }
        Ok(self.scan_configs.values().cloned().collect())
    }
}

#[derive(Default)]
struct FakeDestination {
    applications: Vec<(String, ThreadFixApplication)>,
    scans: RefCell<HashMap<i64, Vec<ScanMetadata>>>,
    uploads: RefCell<Vec<(i64, ThreadFixScan)>>,
    rejected_scan_ids: Vec<String>,
    unlistable_app_ids: Vec<i64>,
    list_calls: Cell<usize>,
}

impl FakeDestination {
    fn with_application(mut self, team: &str, id: i64, name: &str) -> Self {
        self.applications.push((
            team.to_string(),
            ThreadFixApplication {
                id,
                name: name.to_string(),
                ..ThreadFixApplication::default()
            },
        ));
        self
    }

    fn with_existing_scan(self, app_id: i64, updated_ms: i64) -> Self {
        self.scans.borrow_mut().entry(app_id).or_default().push(ScanMetadata {
            id: 900,
            import_time: updated_ms,
            updated_date: updated_ms,
            scanner_name: SCANNER_SOURCE.to_string(),
        });
        self
    }

    fn rejecting(mut self, scan_id: &str) -> Self {
        self.rejected_scan_ids.push(scan_id.to_string());
        self
    }

    fn failing_listing_for(mut self, app_id: i64) -> Self {
        self.unlistable_app_ids.push(app_id);
        self
    }

    fn routed(&self) -> Vec<(i64, String)> {
        self.uploads
            .borrow()
            .iter()
            .map(|(app_id, scan)| (*app_id, scan.executive_summary.clone()))
            .collect()
    }

    fn uploaded_summaries(&self) -> Vec<String> {
        self.uploads
            .borrow()
            .iter()
            .map(|(_, scan)| scan.executive_summary.clone())
            .collect()
    }
}

impl DestinationApi for FakeDestination {
    async fn get_application_by_name(
        &self,
        team_name: &str,
        app_name: &str,
    ) -> Result<ThreadFixApplication, ThreadFixError> {
        self.applications
            .iter()
            .find(|(team, app)| team == team_name && app.name == app_name)
            .map(|(_, app)| app.clone())
            .ok_or_else(|| ThreadFixError::ApplicationNotFound(format!("{team_name}/{app_name}")))
    }

    async fn list_scans(&self, app_id: i64) -> Result<Vec<ScanMetadata>, ThreadFixError> {
        self.list_calls.set(self.list_calls.get() + 1);
        if self.unlistable_app_ids.contains(&app_id) {
            return Err(ThreadFixError::InvalidResponse(format!(
                "scan listing for application {app_id}"
            )));
        }
        Ok(self.scans.borrow().get(&app_id).cloned().unwrap_or_default())
    }

    async fn upload_scan(
        &self,
        app_id: i64,
        scan: &ThreadFixScan,
    ) -> Result<UploadResponse, ThreadFixError> {
        self.uploads.borrow_mut().push((app_id, scan.clone()));

        let rejected = self
            .rejected_scan_ids
            .iter()
            .any(|id| scan.executive_summary.ends_with(&format!("Scan ID: {id}")));
        if rejected {
            return Ok(UploadResponse {
                success: false,
                message: "Invalid scan file".to_string(),
                response_code: 400,
            });
        }

        let updated_ms = parse_timestamp(&scan.updated)
            .map(|t| t.timestamp_millis())
            .unwrap_or_default();
        let mut scans = self.scans.borrow_mut();
        let existing = scans.entry(app_id).or_default();
        existing.push(ScanMetadata {
            id: existing.len() as i64 + 1,
            import_time: updated_ms,
            updated_date: updated_ms,
            scanner_name: SCANNER_SOURCE.to_string(),
        });
        Ok(UploadResponse {
            success: true,
            message: String::new(),
            response_code: 200,
        })
    }
}

#[derive(Default)]
struct RecordingSink {
    events: RefCell<Vec<MetricEvent>>,
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: &MetricEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn days_ago(days: i64) -> String {
    (Utc::now() - ChronoDuration::days(days))
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string()
}

fn scan(id: &str, app_id: &str, days: i64) -> Scan {
    Scan {
        id: id.to_string(),
        app: IdRef {
            id: app_id.to_string(),
        },
        scan_config: IdRef {
            id: "cfg-full".to_string(),
        },
        submit_time: days_ago(days),
        completion_time: days_ago(days),
        status: "COMPLETE".to_string(),
        ..Scan::default()
    }
}

fn vulnerability(id: &str, module_id: &str, attack_id: &str) -> Vulnerability {
    Vulnerability {
        id: id.to_string(),
        severity: "HIGH".to_string(),
        root_cause: RootCause {
            url: "https://shop.example.com/search".to_string(),
            parameter: "q".to_string(),
            method: "GET".to_string(),
        },
        variances: vec![Variance {
            original_value: "shoes".to_string(),
            module: IdRef {
                id: module_id.to_string(),
            },
            attack: IdRef {
                id: attack_id.to_string(),
            },
            attack_value: "<script>alert(1)</script>".to_string(),
            attack_exchanges: vec![Exchange {
                request: "GET /search?q=<script> HTTP/1.1".to_string(),
                response: "HTTP/1.1 200 OK".to_string(),
            }],
            ..Variance::default()
        }],
        ..Vulnerability::default()
    }
}

fn export(name: &str, scope: &str, threadfix_app: &str) -> ExportConfiguration {
    ExportConfiguration {
        name: name.to_string(),
        enabled: true,
        application_scope: scope.to_string(),
        scan_config_filter: ".*".to_string(),
        last_scan_only: false,
        initial_import_max_days: 30,
        map_application_by_name: false,
        threadfix_application_name: threadfix_app.to_string(),
        threadfix_team_name: "Web".to_string(),
    }
}

fn severities() -> SeverityMapper {
    SeverityMapper::new(vec![
        SeverityMapping::new("HIGH", "High"),
        SeverityMapping::new("MEDIUM", "Medium"),
    ])
}

fn shop_source() -> FakeSource {
    FakeSource::default()
        .with_application("app-shop", "Shop")
        .with_scan_config("cfg-full", "Full Audit")
        .with_module("mod-xss", "Cross-Site Scripting")
}

fn shop_destination() -> FakeDestination {
    FakeDestination::default().with_application("Web", 7, "Shop TF")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_initial_import_uploads_oldest_first() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![vulnerability("v1", "mod-xss", "a1")])
        .with_scan(scan("s-day3", "app-shop", 3), vec![vulnerability("v2", "mod-xss", "a1")])
        .with_scan(scan("s-day45", "app-shop", 45), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.configurations_processed, 1);
    assert_eq!(summary.scans_uploaded, 2);
    assert_eq!(
        destination.uploaded_summaries(),
        vec![
            "Application ID: app-shop, Scan ID: s-day3",
            "Application ID: app-shop, Scan ID: s-day1"
        ]
    );
    assert!(destination.uploads.borrow().iter().all(|(app_id, _)| *app_id == 7));
}

#[tokio::test]
async fn test_findings_carry_converted_fields() {
    let source = shop_source().with_scan(
        scan("s1", "app-shop", 1),
        vec![vulnerability("v1", "mod-xss", "a1")],
    );
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    engine.run([&export("shop", "Shop", "Shop TF")]).await;

    let uploads = destination.uploads.borrow();
    let (_, uploaded) = &uploads[0];
    assert_eq!(uploaded.source, SCANNER_SOURCE);
    assert_eq!(uploaded.collection_type, "DAST");
    assert!(uploaded.created.ends_with('Z'));

    let finding = &uploaded.findings[0];
    assert_eq!(finding.native_id, "v1");
    assert_eq!(finding.severity, "High");
    assert_eq!(finding.native_severity, "HIGH");
    assert_eq!(finding.summary, "Cross-Site Scripting");
    assert_eq!(finding.scanner_detail, "Attack a1");
    assert_eq!(finding.dynamic_details.surface_location.parameter, "q");
    assert_eq!(
        finding.dynamic_details.surface_location.attack_response,
        "HTTP/1.1 200 OK"
    );
    assert!(finding.comments.is_empty());

    let cwe = finding
        .mappings
        .iter()
        .find(|m| m.mapping_type == "CWE")
        .expect("CWE mapping");
    assert_eq!(cwe.value, "79");
    assert!(cwe.primary);
    let vendor = finding
        .mappings
        .iter()
        .find(|m| m.mapping_type == "ToolVendor")
        .expect("vendor mapping");
    assert_eq!(vendor.vendor_other_type.as_deref(), Some("OWASP"));
}

#[tokio::test]
async fn test_module_lookups_are_cached_per_scan() {
    let source = shop_source().with_scan(
        scan("s1", "app-shop", 1),
        vec![
            vulnerability("v1", "mod-xss", "a1"),
            vulnerability("v2", "mod-xss", "a1"),
        ],
    );
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(source.module_lookups.get(), 1);
    assert_eq!(source.attack_lookups.get(), 1);

    let events = sink.events.borrow();
    let cache = events
        .iter()
        .find_map(|event| match event {
            MetricEvent::ConversionCache {
                module_cache_hits,
                module_api_requests,
                attack_cache_hits,
                ..
            } => Some((*module_cache_hits, *module_api_requests, *attack_cache_hits)),
            _ => None,
        })
        .expect("cache metric");
    assert_eq!(cache, (1, 1, 1));
}

#[tokio::test]
async fn test_last_scan_only_skips_when_destination_is_newer() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day3", "app-shop", 3), vec![]);
    let destination =
        shop_destination().with_existing_scan(7, Utc::now().timestamp_millis());
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("shop", "Shop", "Shop TF");
    config.last_scan_only = true;
    let summary = engine.run([&config]).await;

    assert_eq!(summary.configurations_processed, 1);
    assert_eq!(summary.scans_uploaded, 0);
    assert!(destination.uploads.borrow().is_empty());
}

#[tokio::test]
async fn test_last_scan_only_initial_import_takes_newest() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day3", "app-shop", 3), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("shop", "Shop", "Shop TF");
    config.last_scan_only = true;
    engine.run([&config]).await;

    assert_eq!(
        destination.uploaded_summaries(),
        vec!["Application ID: app-shop, Scan ID: s-day1"]
    );
}

#[tokio::test]
async fn test_incremental_import_only_uploads_newer_scans() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day5", "app-shop", 5), vec![]);
    let two_days_ago = (Utc::now() - ChronoDuration::days(2)).timestamp_millis();
    let destination = shop_destination().with_existing_scan(7, two_days_ago);
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(
        destination.uploaded_summaries(),
        vec!["Application ID: app-shop, Scan ID: s-day1"]
    );
}

#[tokio::test]
async fn test_scan_without_vulnerabilities_uploads_empty_findings() {
    let source = shop_source().with_scan(scan("s-clean", "app-shop", 2), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.scans_uploaded, 1);
    let uploads = destination.uploads.borrow();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].1.findings.is_empty());
    assert_eq!(source.module_lookups.get(), 0);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day3", "app-shop", 3), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);
    let config = export("shop", "Shop", "Shop TF");

    let first = engine.run([&config]).await;
    let second = engine.run([&config]).await;

    assert_eq!(first.scans_uploaded, 2);
    assert_eq!(second.scans_uploaded, 0);
    assert_eq!(destination.uploads.borrow().len(), 2);
}

#[tokio::test]
async fn test_rejected_upload_does_not_stop_remaining_scans() {
    let source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day3", "app-shop", 3), vec![]);
    let destination = shop_destination().rejecting("s-day3");
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.configurations_processed, 1);
    assert_eq!(summary.scans_uploaded, 1);
    assert_eq!(summary.scans_failed, 1);
    assert_eq!(destination.uploads.borrow().len(), 2);

    let outcomes: Vec<bool> = sink
        .events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            MetricEvent::ScanUploaded { success, .. } => Some(*success),
            _ => None,
        })
        .collect();
    assert_eq!(outcomes, vec![false, true]);
}

#[tokio::test]
async fn test_vulnerability_failure_skips_only_that_scan() {
    let mut source = shop_source()
        .with_scan(scan("s-day1", "app-shop", 1), vec![])
        .with_scan(scan("s-day3", "app-shop", 3), vec![]);
    source.vulnerabilities.remove("s-day3");
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.scans_uploaded, 1);
    assert_eq!(
        destination.uploaded_summaries(),
        vec!["Application ID: app-shop, Scan ID: s-day1"]
    );
}

#[tokio::test]
async fn test_unresolved_destination_fails_only_its_configuration() {
    let source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let broken = export("broken", "Shop", "Missing TF");
    let working = export("working", "Shop", "Shop TF");
    let summary = engine.run([&broken, &working]).await;

    assert_eq!(summary.configurations_failed, 1);
    assert_eq!(summary.configurations_processed, 1);
    assert_eq!(summary.scans_uploaded, 1);
}

#[tokio::test]
async fn test_disabled_configurations_are_skipped() {
    let source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("shop", "Shop", "Shop TF");
    config.enabled = false;
    let summary = engine.run([&config]).await;

    assert_eq!(summary.configurations_processed, 0);
    assert_eq!(destination.list_calls.get(), 0);
}

#[tokio::test]
async fn test_scan_config_filter_excludes_other_configurations() {
    let mut nightly = scan("s-nightly", "app-shop", 1);
    nightly.scan_config.id = "cfg-nightly".to_string();
    let source = shop_source()
        .with_scan_config("cfg-nightly", "Nightly Smoke")
        .with_scan(nightly, vec![])
        .with_scan(scan("s-full", "app-shop", 2), vec![])
        .with_scan(scan("s-full-2", "app-shop", 3), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("shop", "Shop", "Shop TF");
    config.scan_config_filter = "^Full".to_string();
    engine.run([&config]).await;

    assert_eq!(
        destination.uploaded_summaries(),
        vec![
            "Application ID: app-shop, Scan ID: s-full-2",
            "Application ID: app-shop, Scan ID: s-full"
        ]
    );
    // one listing per selection pass, whatever the number of configurations
    assert_eq!(source.scan_config_listings.get(), 1);
}

#[tokio::test]
async fn test_unavailable_scan_config_listing_drops_scans() {
    let mut source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    source.scan_config_listing_fails = true;
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.configurations_processed, 1);
    assert_eq!(summary.scans_uploaded, 0);
    assert!(destination.uploads.borrow().is_empty());
}

#[tokio::test]
async fn test_map_by_name_routes_each_application() {
    let source = FakeSource::default()
        .with_application("app-alpha", "Alpha")
        .with_application("app-beta", "Beta")
        .with_scan_config("cfg-full", "Full Audit")
        .with_scan(scan("s-alpha", "app-alpha", 1), vec![])
        .with_scan(scan("s-beta", "app-beta", 2), vec![]);
    let destination = FakeDestination::default()
        .with_application("Web", 1, "Alpha")
        .with_application("Web", 2, "Beta");
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("by-name", "%", "");
    config.map_application_by_name = true;
    let summary = engine.run([&config]).await;

    assert_eq!(summary.scans_uploaded, 2);
    assert_eq!(
        destination.routed(),
        vec![
            (1, "Application ID: app-alpha, Scan ID: s-alpha".to_string()),
            (2, "Application ID: app-beta, Scan ID: s-beta".to_string()),
        ]
    );

    let modes: Vec<(String, IngestionMode)> = sink
        .events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            MetricEvent::ConfigurationProcessed {
                application_name,
                mode,
                ..
            } => Some((application_name.clone(), *mode)),
            _ => None,
        })
        .collect();
    assert_eq!(
        modes,
        vec![
            ("Alpha".to_string(), IngestionMode::MapApplicationByName),
            ("Beta".to_string(), IngestionMode::MapApplicationByName),
        ]
    );
}

#[tokio::test]
async fn test_map_by_name_keeps_wildcard_names_apart() {
    // `web_1` as a LIKE pattern also matches `webX1`
    let source = FakeSource::default()
        .with_application("app-a", "web_1")
        .with_application("app-b", "webX1")
        .with_scan_config("cfg-full", "Full Audit")
        .with_scan(scan("s-a", "app-a", 1), vec![])
        .with_scan(scan("s-b", "app-b", 2), vec![]);
    let destination = FakeDestination::default()
        .with_application("Web", 1, "web_1")
        .with_application("Web", 2, "webX1");
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("by-name", "web%", "");
    config.map_application_by_name = true;
    let summary = engine.run([&config]).await;

    assert_eq!(summary.scans_uploaded, 2);
    assert_eq!(
        destination.routed(),
        vec![
            (1, "Application ID: app-a, Scan ID: s-a".to_string()),
            (2, "Application ID: app-b, Scan ID: s-b".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_application_still_records_configuration_metric() {
    let source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    let destination = shop_destination().failing_listing_for(7);
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let summary = engine.run([&export("shop", "Shop", "Shop TF")]).await;

    assert_eq!(summary.configurations_failed, 1);
    assert!(destination.uploads.borrow().is_empty());

    let recorded: Vec<(String, IngestionMode, usize, bool)> = sink
        .events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            MetricEvent::ConfigurationProcessed {
                application_name,
                mode,
                number_of_scans,
                success,
                ..
            } => Some((application_name.clone(), *mode, *number_of_scans, *success)),
            _ => None,
        })
        .collect();
    assert_eq!(
        recorded,
        vec![("Shop TF".to_string(), IngestionMode::BulkApplication, 0, false)]
    );
}

#[tokio::test]
async fn test_map_by_name_failure_records_metric_for_failed_application() {
    let source = FakeSource::default()
        .with_application("app-alpha", "Alpha")
        .with_application("app-beta", "Beta")
        .with_scan_config("cfg-full", "Full Audit")
        .with_scan(scan("s-alpha", "app-alpha", 1), vec![]);
    let destination = FakeDestination::default()
        .with_application("Web", 1, "Alpha")
        .with_application("Web", 2, "Beta")
        .failing_listing_for(1);
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let mut config = export("by-name", "%", "");
    config.map_application_by_name = true;
    let summary = engine.run([&config]).await;

    assert_eq!(summary.configurations_failed, 1);
    let outcomes: Vec<(String, bool)> = sink
        .events
        .borrow()
        .iter()
        .filter_map(|event| match event {
            MetricEvent::ConfigurationProcessed {
                application_name,
                success,
                ..
            } => Some((application_name.clone(), *success)),
            _ => None,
        })
        .collect();
    assert_eq!(outcomes, vec![("Alpha".to_string(), false)]);
}

#[tokio::test]
async fn test_import_scan_by_id() {
    let source = shop_source().with_scan(
        scan("s-manual", "app-shop", 90),
        vec![vulnerability("v1", "mod-xss", "a1")],
    );
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);

    let accepted = engine
        .import_scan_by_id("s-manual", "Shop TF", "Web")
        .await
        .expect("imports");
    assert!(accepted);
    assert_eq!(destination.uploads.borrow()[0].1.findings.len(), 1);

    assert!(engine.import_scan_by_id("missing", "Shop TF", "Web").await.is_err());
    assert!(engine.import_scan_by_id("s-manual", "Nope", "Web").await.is_err());
}

#[tokio::test]
async fn test_service_stops_on_shutdown_after_first_cycle() {
    let source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);
    let configs = vec![export("shop", "Shop", "Shop TF")];

    let cycles = service::run_until(
        &engine,
        &configs,
        Duration::from_secs(3600),
        std::future::ready(()),
    )
    .await;

    assert_eq!(cycles, 1);
    assert_eq!(destination.uploads.borrow().len(), 1);
}

#[tokio::test]
async fn test_service_repeats_until_shutdown() {
    let source = shop_source().with_scan(scan("s1", "app-shop", 1), vec![]);
    let destination = shop_destination();
    let sink = RecordingSink::default();
    let engine = SyncEngine::new(&source, &destination, severities(), &sink);
    let configs = vec![export("shop", "Shop", "Shop TF")];

    let cycles = service::run_until(
        &engine,
        &configs,
        Duration::from_millis(20),
        tokio::time::sleep(Duration::from_millis(70)),
    )
    .await;

    assert!(cycles >= 2, "expected repeated cycles, got {cycles}");
    // later cycles find nothing new
    assert_eq!(destination.uploads.borrow().len(), 1);
    assert_eq!(destination.list_calls.get(), cycles);
}
