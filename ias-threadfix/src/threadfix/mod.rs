//! Minimal ThreadFix REST client.
//!
//! Covers the four calls the sync engine needs: application lookup by team
//! and name, listing an application's scans, uploading a scan file, and
//! listing severities.

pub mod client;
pub mod types;

use secrecy::SecretString;

pub use client::ThreadFixClient;
pub use types::{
    ApiResponse, COLLECTION_TYPE_DAST, DynamicDetails, Finding, MAPPING_TYPE_CWE,
    MAPPING_TYPE_TOOL_VENDOR, Mapping, SCANNER_SOURCE, ScanMetadata, Severity, SurfaceLocation,
    ThreadFixApplication, ThreadFixScan, UploadResponse,
};

/// Errors raised by the ThreadFix client
#[derive(Debug, thiserror::Error)]
pub enum ThreadFixError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("ThreadFix application not found: {0}")]
    ApplicationNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Connection settings for a ThreadFix server.
#[derive(Debug, Clone)]
pub struct ThreadFixConfig {
    /// Scheme and host, e.g. `https://threadfix.example.com`
    pub host: String,
    /// Port; omitted from the URL when empty
    pub port: String,
    pub api_key: SecretString,
    /// Whole-request timeout in seconds
    pub request_timeout: u64,
}

impl ThreadFixConfig {
    pub fn new(host: impl Into<String>, port: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            host: host.into().trim_end_matches('/').to_string(),
            port: port.into().trim().to_string(),
            api_key,
            request_timeout: 300,
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    /// REST root, `{host}[:{port}]/threadfix/rest`.
    #[must_use]
    pub fn rest_url(&self) -> String {
        if self.port.is_empty() {
            format!("{}/threadfix/rest", self.host)
        } else {
            format!("{}:{}/threadfix/rest", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_url_with_port() {
        let config = ThreadFixConfig::new(
            "https://threadfix.example.test/",
            "8443",
            SecretString::from("k"),
        );
        assert_eq!(config.rest_url(), "https://threadfix.example.test:8443/threadfix/rest");
    }

    #[test]
    fn test_rest_url_without_port() {
        let config = ThreadFixConfig::new("https://threadfix.example.test", " ", SecretString::from("k"));
        assert_eq!(config.rest_url(), "https://threadfix.example.test/threadfix/rest");
    }
}
