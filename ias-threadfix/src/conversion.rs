//! Converts InsightAppSec scans and vulnerabilities into ThreadFix scan files.
//!
//! Each vulnerability becomes one [`Finding`] built from its preferred
//! variance, the scanner module that found it, and the attack documentation
//! of that variance. Module and documentation lookups are cached for the
//! duration of one scan conversion only.

use chrono::Utc;
use insightappsec_api::{AttackDocumentation, Module, Scan, Variance, Vulnerability};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Instant;

use crate::metrics::{MetricEvent, MetricsSink};
use crate::settings::SeverityMapping;
use crate::source::SourceApi;
use crate::threadfix::{
    COLLECTION_TYPE_DAST, DynamicDetails, Finding, MAPPING_TYPE_CWE, MAPPING_TYPE_TOOL_VENDOR,
    Mapping, SCANNER_SOURCE, SurfaceLocation, ThreadFixScan,
};

/// Severity used when no mapping matches.
pub const UNKNOWN_SEVERITY: &str = "Unknown";

/// Case-insensitive InsightAppSec to ThreadFix severity table.
#[derive(Debug, Clone)]
pub struct SeverityMapper {
    mappings: Vec<SeverityMapping>,
}

impl SeverityMapper {
    #[must_use]
    pub fn new(mappings: Vec<SeverityMapping>) -> Self {
        Self { mappings }
    }

    /// ThreadFix severity for `severity`, if a mapping exists.
    #[must_use]
    pub fn lookup(&self, severity: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.insightappsec.eq_ignore_ascii_case(severity))
            .map(|m| m.threadfix.as_str())
    }

    /// ThreadFix severity for `severity`, or [`UNKNOWN_SEVERITY`] with a warning.
    #[must_use]
    pub fn map(&self, severity: &str) -> String {
        match self.lookup(severity) {
            Some(mapped) => mapped.to_string(),
            None => {
                warn!(
                    "No ThreadFix severity mapping for InsightAppSec severity '{severity}'; using {UNKNOWN_SEVERITY}"
                );
                UNKNOWN_SEVERITY.to_string()
            }
        }
    }
}

type FieldPresent = fn(&Variance) -> bool;

fn has_original_value(v: &Variance) -> bool {
    !v.original_value.is_empty()
}

fn has_original_exchange(v: &Variance) -> bool {
    !v.original_exchange.request.is_empty() || !v.original_exchange.response.is_empty()
}

fn has_module(v: &Variance) -> bool {
    !v.module.id.is_empty()
}

fn has_attack(v: &Variance) -> bool {
    !v.attack.id.is_empty()
}

fn has_attack_value(v: &Variance) -> bool {
    !v.attack_value.is_empty()
}

fn has_attack_exchanges(v: &Variance) -> bool {
    !v.attack_exchanges.is_empty()
}

/// Variance fields counted when choosing the preferred variance, in tie-break order.
const VARIANCE_FIELDS: [FieldPresent; 6] = [
    has_original_value,
    has_original_exchange,
    has_module,
    has_attack,
    has_attack_value,
    has_attack_exchanges,
];

/// Number of populated fields on a variance.
#[must_use]
pub fn populated_fields(variance: &Variance) -> usize {
    VARIANCE_FIELDS
        .iter()
        .filter(|present| present(variance))
        .count()
}

/// The variance with the most populated fields; the earliest wins a tie.
#[must_use]
pub fn preferred_variance(variances: &[Variance]) -> Option<&Variance> {
    let mut best: Option<(&Variance, usize)> = None;
    for variance in variances {
        let count = populated_fields(variance);
        if best.is_none_or(|(_, best_count)| count > best_count) {
            best = Some((variance, count));
        }
    }
    best.map(|(variance, _)| variance)
}

/// CWE and vendor mappings derived from attack documentation references.
///
/// `CWE-<n>` keys become CWE mappings with value `<n>`; only the first one,
/// in the order the documentation lists them, is primary. Every other key becomes a `ToolVendor` mapping whose
/// `vendorOtherType` is the text before the first dash.
#[must_use]
pub fn taxonomy_mappings(documentation: &AttackDocumentation) -> Vec<Mapping> {
    let mut primary_assigned = false;
    let mut mappings = Vec::with_capacity(documentation.references.len());

    for key in documentation.references.keys() {
        let mut parts = key.split('-');
        let prefix = parts.next().unwrap_or_default();
        let number = parts.next().unwrap_or_default();

        if prefix.eq_ignore_ascii_case(MAPPING_TYPE_CWE) && !number.is_empty() {
            mappings.push(Mapping {
                mapping_type: MAPPING_TYPE_CWE.to_string(),
                value: number.to_string(),
                primary: !primary_assigned,
                vendor_other_type: None,
            });
            primary_assigned = true;
        } else {
            mappings.push(Mapping {
                mapping_type: MAPPING_TYPE_TOOL_VENDOR.to_string(),
                value: key.clone(),
                primary: false,
                vendor_other_type: Some(prefix.to_string()),
            });
        }
    }
    mappings
}

/// Rewrite a platform timestamp as `YYYY-MM-DDTHH:MM:SSZ`.
///
/// Fractional seconds are dropped and a space separator becomes `T`. Empty
/// input stays empty.
#[must_use]
pub fn normalize_timestamp(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let whole_seconds = trimmed.split('.').next().unwrap_or_default();
    format!(
        "{}Z",
        whole_seconds.trim_end_matches('Z').replace(' ', "T")
    )
}

/// Lookup counters for one scan conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub module_cache_hits: u32,
    pub module_api_requests: u32,
    pub attack_cache_hits: u32,
    pub attack_api_requests: u32,
}

/// Module and attack documentation fetched during one scan conversion.
///
/// Failed lookups are cached as empty records so they are not retried
/// within the same scan.
#[derive(Debug, Default)]
pub struct LookupCache {
    modules: HashMap<String, Module>,
    attacks: HashMap<(String, String), AttackDocumentation>,
    stats: CacheStats,
}

impl LookupCache {
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub async fn module<S: SourceApi>(&mut self, source: &S, module_id: &str) -> Module {
        if let Some(module) = self.modules.get(module_id) {
            self.stats.module_cache_hits += 1;
            return module.clone();
        }

        self.stats.module_api_requests += 1;
        let module = source.get_module(module_id).await.unwrap_or_else(|e| {
            warn!("Failed to fetch module {module_id}: {e}");
            Module {
                id: module_id.to_string(),
                ..Module::default()
            }
        });
        self.modules.insert(module_id.to_string(), module.clone());
        module
    }

    pub async fn attack_documentation<S: SourceApi>(
        &mut self,
        source: &S,
        module_id: &str,
        attack_id: &str,
    ) -> AttackDocumentation {
        let key = (module_id.to_string(), attack_id.to_string());
        if let Some(documentation) = self.attacks.get(&key) {
            self.stats.attack_cache_hits += 1;
            return documentation.clone();
        }

        self.stats.attack_api_requests += 1;
        let documentation = source
            .get_attack_documentation(module_id, attack_id)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to fetch documentation for attack {attack_id} of module {module_id}: {e}");
                AttackDocumentation::default()
            });
        self.attacks.insert(key, documentation.clone());
        documentation
    }
}

/// Converts scans using a source for auxiliary lookups.
pub struct ScanConverter<'a, S> {
    source: &'a S,
    severities: &'a SeverityMapper,
    metrics: &'a dyn MetricsSink,
}

impl<'a, S: SourceApi> ScanConverter<'a, S> {
    pub fn new(source: &'a S, severities: &'a SeverityMapper, metrics: &'a dyn MetricsSink) -> Self {
        Self {
            source,
            severities,
            metrics,
        }
    }

    /// Build the ThreadFix scan file for `scan`.
    ///
    /// Never fails: lookups that fail fall back to empty records and unmapped
    /// severities become [`UNKNOWN_SEVERITY`]. No vulnerabilities yields a
    /// scan with no findings.
    pub async fn convert_scan(&self, scan: &Scan, vulnerabilities: &[Vulnerability]) -> ThreadFixScan {
        let started = Instant::now();
        let mut cache = LookupCache::default();

        if vulnerabilities.is_empty() {
            info!("No vulnerabilities for scan {}", scan.id);
        }

        let mut findings = Vec::with_capacity(vulnerabilities.len());
        for vulnerability in vulnerabilities {
            findings.push(self.convert_vulnerability(vulnerability, &mut cache).await);
        }

        let threadfix_scan = ThreadFixScan {
            created: normalize_timestamp(&scan.submit_time),
            updated: normalize_timestamp(&scan.completion_time),
            exported: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            collection_type: COLLECTION_TYPE_DAST.to_string(),
            source: SCANNER_SOURCE.to_string(),
            executive_summary: format!("Application ID: {}, Scan ID: {}", scan.app.id, scan.id),
            metadata: Default::default(),
            findings,
        };

        let stats = cache.stats();
        info!(
            "Converted {} vulnerabilities for scan {}; ready for upload",
            vulnerabilities.len(),
            scan.id
        );
        self.metrics.record(&MetricEvent::ConversionCache {
            scan_id: scan.id.clone(),
            module_cache_hits: stats.module_cache_hits,
            module_api_requests: stats.module_api_requests,
            attack_cache_hits: stats.attack_cache_hits,
            attack_api_requests: stats.attack_api_requests,
        });
        self.metrics.record(&MetricEvent::ScanConverted {
            scan_id: scan.id.clone(),
            findings: threadfix_scan.findings.len(),
            duration_secs: started.elapsed().as_secs_f64(),
        });

        threadfix_scan
    }

    async fn convert_vulnerability(
        &self,
        vulnerability: &Vulnerability,
        cache: &mut LookupCache,
    ) -> Finding {
        let variance = preferred_variance(&vulnerability.variances)
            .cloned()
            .unwrap_or_default();

        let (module, documentation) = if variance.module.id.is_empty() {
            debug!(
                "Vulnerability {} has no module reference; skipping lookups",
                vulnerability.id
            );
            (Module::default(), AttackDocumentation::default())
        } else {
            let module = cache.module(self.source, &variance.module.id).await;
            let documentation = cache
                .attack_documentation(self.source, &variance.module.id, &variance.attack.id)
                .await;
            (module, documentation)
        };

        let (attack_request, attack_response) = variance
            .first_attack_exchange()
            .map(|exchange| (exchange.request.clone(), exchange.response.clone()))
            .unwrap_or_default();

        Finding {
            native_id: vulnerability.id.clone(),
            severity: self.severities.map(&vulnerability.severity),
            native_severity: vulnerability.severity.clone(),
            summary: module.name,
            description: module.description,
            scanner_detail: documentation.description.clone(),
            scanner_recommendation: documentation.recommendation.clone(),
            dynamic_details: DynamicDetails {
                surface_location: SurfaceLocation {
                    url: vulnerability.root_cause.url.clone(),
                    parameter: vulnerability.root_cause.parameter.clone(),
                    attack_string: variance.attack_value.clone(),
                    attack_request,
                    attack_response,
                },
            },
            metadata: Default::default(),
            mappings: taxonomy_mappings(&documentation),
            comments: Vec::new(),
        }
    }
}
