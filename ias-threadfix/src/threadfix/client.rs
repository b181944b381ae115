use log::{debug, info};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, multipart};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{
    ApiResponse, SCANNER_SOURCE, ScanMetadata, Severity, ThreadFixApplication, ThreadFixScan,
    UploadResponse,
};
use super::{ThreadFixConfig, ThreadFixError};

/// ThreadFix REST client, authenticated with an `APIKEY` header.
#[derive(Clone)]
pub struct ThreadFixClient {
    config: ThreadFixConfig,
    rest_url: String,
    client: Client,
}

impl ThreadFixClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ThreadFixConfig) -> Result<Self, ThreadFixError> {
        if config.host.is_empty() {
            return Err(ThreadFixError::InvalidConfig("host is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        let rest_url = config.rest_url();
        Ok(Self {
            config,
            rest_url,
            client,
        })
    }

    #[must_use]
    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header(
                AUTHORIZATION,
                format!("APIKEY {}", self.config.api_key.expose_secret()),
            )
            .header(ACCEPT, "application/json")
    }

    async fn get_envelope<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<ApiResponse<T>, ThreadFixError> {
        let url = format!("{}{endpoint}", self.rest_url);
        debug!("GET {url}");
        let response = self.authorized(self.client.get(&url)).send().await?;
        let response = Self::handle_response(response, endpoint).await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn handle_response(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, ThreadFixError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(ThreadFixError::InvalidResponse(format!(
            "{context}: HTTP {status}: {error_text}"
        )))
    }

    /// Look up an application by team and application name.
    ///
    /// # Errors
    ///
    /// [`ThreadFixError::ApplicationNotFound`] when ThreadFix reports no match.
    pub async fn get_application_by_name(
        &self,
        team_name: &str,
        app_name: &str,
    ) -> Result<ThreadFixApplication, ThreadFixError> {
        let endpoint = format!(
            "/applications/{}/lookup?name={}",
            urlencoding::encode(team_name),
            urlencoding::encode(app_name)
        );
        let response: ApiResponse<ThreadFixApplication> = self.get_envelope(&endpoint).await?;

        match response.object {
            Some(app) if response.success => Ok(app),
            _ => Err(ThreadFixError::ApplicationNotFound(format!(
                "team '{team_name}', application '{app_name}': {}",
                response.message
            ))),
        }
    }

    /// List the scans of an application that were uploaded by this integration.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or ThreadFix reports a failure.
    pub async fn list_scans(&self, app_id: i64) -> Result<Vec<ScanMetadata>, ThreadFixError> {
        let response: ApiResponse<Vec<ScanMetadata>> = self
            .get_envelope(&format!("/applications/{app_id}/scans"))
            .await?;
        if !response.success {
            return Err(ThreadFixError::InvalidResponse(format!(
                "listing scans of application {app_id}: {}",
                response.message
            )));
        }

        let scans: Vec<ScanMetadata> = response
            .object
            .unwrap_or_default()
            .into_iter()
            .filter(|scan| scan.scanner_name == SCANNER_SOURCE)
            .collect();
        info!(
            "Filtered scans to {SCANNER_SOURCE} source, returning {} scans",
            scans.len()
        );
        Ok(scans)
    }

    /// Upload a scan file to an application.
    ///
    /// The scan is sent as a multipart `file` part named after its executive summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails; a rejected upload is reported
    /// through [`UploadResponse::success`] instead.
    pub async fn upload_scan(
        &self,
        app_id: i64,
        scan: &ThreadFixScan,
    ) -> Result<UploadResponse, ThreadFixError> {
        let url = format!("{}/v2.5/applications/{app_id}/upload", self.rest_url);
        let payload = serde_json::to_vec(scan)?;

        let part = multipart::Part::bytes(payload)
            .file_name(format!("{}.threadfix", scan.executive_summary))
            .mime_str("application/json")
            .map_err(|e| ThreadFixError::InvalidConfig(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        debug!("POST {url}");
        let response = self
            .authorized(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;
        let response = Self::handle_response(response, "uploading scan").await?;
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// List the severity levels configured on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or ThreadFix reports a failure.
    pub async fn list_severities(&self) -> Result<Vec<Severity>, ThreadFixError> {
        let response: ApiResponse<Vec<Severity>> = self.get_envelope("/latest/severities").await?;
        if !response.success {
            return Err(ThreadFixError::InvalidResponse(format!(
                "listing severities: {}",
                response.message
            )));
        }
        Ok(response.object.unwrap_or_default())
    }
}
