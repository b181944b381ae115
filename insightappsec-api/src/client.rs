//! Core InsightAppSec API client implementation.
//!
//! This module contains the foundational client for making authenticated requests
//! to the InsightAppSec API. Entity-specific operations live in the sibling modules
//! as `impl InsightAppSecClient` blocks.

use log::debug;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT as USER_AGENT_HEADER};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::{InsightAppSecConfig, InsightAppSecError, USER_AGENT};

const API_KEY_HEADER: &str = "x-api-key";

/// Core InsightAppSec API client.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct InsightAppSecClient {
    config: InsightAppSecConfig,
    client: Client,
}

impl InsightAppSecClient {
    /// Create a new InsightAppSec API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the HTTP client
    /// cannot be constructed.
    pub fn new(config: InsightAppSecConfig) -> Result<Self, InsightAppSecError> {
        let mut client_builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout));

        if !config.validate_certificates {
            client_builder = client_builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| {
                InsightAppSecError::InvalidConfig(format!("Invalid proxy URL: {e}"))
            })?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder.build().map_err(InsightAppSecError::Http)?;
        Ok(Self { config, client })
    }

    /// Get the base URL for API requests.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Get access to the configuration
    #[must_use]
    pub fn config(&self) -> &InsightAppSecConfig {
        &self.config
    }

    /// Build URL with query parameters
    pub(crate) fn build_url_with_params(&self, endpoint: &str, query_params: &[(&str, &str)]) -> String {
        let estimated_capacity = self
            .config
            .base_url
            .len()
            .saturating_add(endpoint.len())
            .saturating_add(query_params.len().saturating_mul(32));

        let mut url = String::with_capacity(estimated_capacity);
        url.push_str(&self.config.base_url);
        url.push_str(endpoint);

        if !query_params.is_empty() {
            url.push('?');
            for (i, (key, value)) in query_params.iter().enumerate() {
                if i > 0 {
                    url.push('&');
                }
                url.push_str(&urlencoding::encode(key));
                url.push('=');
                url.push_str(&urlencoding::encode(value));
            }
        }

        url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header(ACCEPT, "application/json")
    }

    /// Make a GET request and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or the body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
    ) -> Result<T, InsightAppSecError> {
        let url = self.build_url_with_params(endpoint, query_params);
        debug!("GET {url}");

        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = Self::handle_response(response, &format!("GET {endpoint}")).await?;
        Self::parse_body(response).await
    }

    /// Make a POST request with a JSON body and deserialize the JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or the body does not match `R`.
    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        endpoint: &str,
        query_params: &[(&str, &str)],
        body: &B,
    ) -> Result<R, InsightAppSecError> {
        let url = self.build_url_with_params(endpoint, query_params);
        let payload = serde_json::to_string(body)?;
        debug!("POST {url}");

        let response = self
            .authorized(self.client.post(&url))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;
        let response = Self::handle_response(response, &format!("POST {endpoint}")).await?;
        Self::parse_body(response).await
    }

    /// Checks if the response is successful and returns an error if not.
    ///
    /// A 404 becomes [`InsightAppSecError::NotFound`]; any other failure
    /// status becomes [`InsightAppSecError::InvalidResponse`] with the body text.
    ///
    /// # Errors
    ///
    /// Returns an error for any non-2xx status.
    pub async fn handle_response(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, InsightAppSecError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let error_text = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(InsightAppSecError::NotFound(format!("{context} ({url})")));
        }
        Err(InsightAppSecError::InvalidResponse(format!(
            "Failed to {context}\n  URL: {url}\n  HTTP {status}: {error_text}"
        )))
    }

    async fn parse_body<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, InsightAppSecError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            let char_count = text.chars().count();
            if char_count > 500 {
                let truncated: String = text.chars().take(500).collect();
                debug!("Unparseable response (first 500 chars): {truncated}...");
            } else {
                debug!("Unparseable response: {text}");
            }
            InsightAppSecError::Serialization(e)
        })
    }
}
