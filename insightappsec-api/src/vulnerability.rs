//! Vulnerabilities and the module/attack documentation that describes them.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::InsightAppSecError;
use crate::app::{IdRef, Link, escape_query_value};
use crate::client::InsightAppSecClient;
use crate::search::{SearchRequest, SearchType};

/// Where a vulnerability was found
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RootCause {
    pub url: String,
    pub parameter: String,
    pub method: String,
}

/// One HTTP request/response pair captured during a scan.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Exchange {
    pub request: String,
    pub response: String,
}

/// A distinct attack attempt recorded against a vulnerability.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Variance {
    pub original_value: String,
    pub original_exchange: Exchange,
    pub module: IdRef,
    pub attack: IdRef,
    pub attack_value: String,
    pub attack_exchanges: Vec<Exchange>,
}

impl Variance {
    /// The first captured attack exchange, if any.
    #[must_use]
    pub fn first_attack_exchange(&self) -> Option<&Exchange> {
        self.attack_exchanges.first()
    }
}

/// A DAST finding as reported by the platform.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Vulnerability {
    pub id: String,
    #[serde(default)]
    pub app: IdRef,
    #[serde(default)]
    pub root_cause: RootCause,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub variances: Vec<Variance>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Scanner module (the check that produced a finding).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Documentation for one attack of a module.
///
/// References are keyed by identifiers such as `CWE-79` or `OWASP-2017-A7`
/// and kept in the order the platform listed them.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AttackDocumentation {
    pub references: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recommendation: String,
}

impl InsightAppSecClient {
    /// List every vulnerability found by a scan.
    ///
    /// # Errors
    ///
    /// Returns an error if any page of the search fails.
    pub async fn search_vulnerabilities(
        &self,
        scan_id: &str,
    ) -> Result<Vec<Vulnerability>, InsightAppSecError> {
        let request = SearchRequest::new(
            SearchType::Vulnerability,
            format!("vulnerability.scans.id='{}'", escape_query_value(scan_id)),
        );
        self.search_all(&request).await
    }

    /// Get a scanner module by id.
    ///
    /// # Errors
    ///
    /// Returns [`InsightAppSecError::NotFound`] for an unknown module.
    pub async fn get_module(&self, module_id: &str) -> Result<Module, InsightAppSecError> {
        let endpoint = format!("/modules/{}", urlencoding::encode(module_id));
        self.get_json(&endpoint, &[]).await
    }

    /// Get the documentation of one attack.
    ///
    /// # Errors
    ///
    /// Returns [`InsightAppSecError::NotFound`] for an unknown module or attack.
    pub async fn get_attack_documentation(
        &self,
        module_id: &str,
        attack_id: &str,
    ) -> Result<AttackDocumentation, InsightAppSecError> {
        let endpoint = format!(
            "/modules/{}/attacks/{}/documentation",
            urlencoding::encode(module_id),
            urlencoding::encode(attack_id)
        );
        let documentation: AttackDocumentation = self.get_json(&endpoint, &[]).await?;
        debug!(
            "Attack {attack_id} of module {module_id} has {} references",
            documentation.references.len()
        );
        Ok(documentation)
    }
}
