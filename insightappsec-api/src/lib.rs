//! # InsightAppSec API Client Library
//!
//! A Rust client library for the Rapid7 InsightAppSec REST API (v1).
//!
//! The library covers the read side of the platform needed to export DAST
//! results: searching applications, scans and vulnerabilities, and looking up
//! the module, attack documentation and scan configuration records that give a
//! vulnerability its context.
//!
//! ## Features
//!
//! - **API key authentication** - `x-api-key` header, key held in a `SecretString`
//! - **Regional endpoints** - `us`, `eu`, `ca`, `au`, `ap` (or any custom base URL)
//! - **Search API** - typed `APP`, `SCAN` and `VULNERABILITY` searches
//! - **Bounded pagination** - lazy, restartable page cursor with a hard page limit
//!
//! ## Quick Start
//!
//! ```no_run
//! use insightappsec_api::{InsightAppSecClient, InsightAppSecConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InsightAppSecConfig::new("your_api_key").with_region("eu");
//!     let client = InsightAppSecClient::new(config)?;
//!
//!     for app in client.search_applications("%payments%").await? {
//!         let scans = client.search_scans(&app.id).await?;
//!         println!("{}: {} scans", app.name, scans.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod client;
pub mod scan;
pub mod search;
pub mod vulnerability;

use reqwest::Error as ReqwestError;
use secrecy::SecretString;

// Re-export common types for convenience
pub use app::{Application, IdRef, Link};
pub use client::InsightAppSecClient;
pub use scan::{Assignment, Scan, ScanConfig, Submitter, parse_timestamp};
pub use search::{
    DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, PageMetadata, PageRequest, Paginator, SearchPage,
    SearchRequest, SearchType,
};
pub use vulnerability::{AttackDocumentation, Exchange, Module, RootCause, Variance, Vulnerability};

/// User agent sent with every request so the platform can attribute traffic.
pub const USER_AGENT: &str = "r7:insightappsec-threadfix-extension-1.0.1";

/// Custom error type for InsightAppSec API operations.
#[derive(Debug, thiserror::Error)]
pub enum InsightAppSecError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] ReqwestError),
    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// API returned an error response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// When an item is not found
    #[error("Item not found: {0}")]
    NotFound(String),
}

/// Configuration for the InsightAppSec API client.
///
/// The base URL is derived from the account region unless it is overridden
/// explicitly with [`InsightAppSecConfig::with_base_url`].
#[derive(Debug, Clone)]
pub struct InsightAppSecConfig {
    /// InsightAppSec API key (never printed by `Debug`)
    pub api_key: SecretString,
    /// Region code of the account (`us`, `eu`, `ca`, `au`, `ap`, ...)
    pub region: String,
    /// Base URL including the `/ias/v1` prefix, without trailing slash
    pub base_url: String,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    /// Whole-request timeout in seconds
    pub request_timeout: u64,
    /// Whether to validate TLS certificates (default: true)
    pub validate_certificates: bool,
    /// Optional HTTP(S) proxy
    pub proxy_url: Option<String>,
}

impl InsightAppSecConfig {
    /// Create a new configuration for the `us` region.
    pub fn new(api_key: impl Into<String>) -> Self {
        let region = "us".to_string();
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: regional_base_url(&region),
            region,
            connect_timeout: 30,
            request_timeout: 180,
            validate_certificates: true,
            proxy_url: None,
        }
    }

    /// Set the account region; rewrites the base URL to the regional endpoint.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into().trim().to_lowercase();
        self.base_url = regional_base_url(&self.region);
        self
    }

    /// Override the base URL (self-hosted gateways, test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    /// Route all requests through a proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    /// Disable certificate validation for development environments.
    ///
    /// WARNING: never use this in production.
    #[must_use]
    pub fn with_certificate_validation_disabled(mut self) -> Self {
        self.validate_certificates = false;
        self
    }
}

fn regional_base_url(region: &str) -> String {
    format!("https://{region}.api.insight.rapid7.com/ias/v1")
}
