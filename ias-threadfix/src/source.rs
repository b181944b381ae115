//! Traits the sync engine talks to, and their HTTP implementations.
//!
//! The engine is generic over [`SourceApi`] and [`DestinationApi`] so it can
//! run against the real clients or in-memory fakes.
#![allow(async_fn_in_trait)]

use insightappsec_api::{
    Application, AttackDocumentation, InsightAppSecClient, InsightAppSecError, Module, Scan,
    ScanConfig, Vulnerability,
};

use crate::threadfix::{
    ScanMetadata, ThreadFixApplication, ThreadFixClient, ThreadFixError, ThreadFixScan,
    UploadResponse,
};

/// Read access to InsightAppSec.
pub trait SourceApi {
    async fn search_applications(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<Application>, InsightAppSecError>;

    /// Scans of one application, newest submission first.
    async fn search_scans(&self, app_id: &str) -> Result<Vec<Scan>, InsightAppSecError>;

    async fn get_scan(&self, scan_id: &str) -> Result<Scan, InsightAppSecError>;

    async fn search_vulnerabilities(
        &self,
        scan_id: &str,
    ) -> Result<Vec<Vulnerability>, InsightAppSecError>;

    async fn get_module(&self, module_id: &str) -> Result<Module, InsightAppSecError>;

    async fn get_attack_documentation(
        &self,
        module_id: &str,
        attack_id: &str,
    ) -> Result<AttackDocumentation, InsightAppSecError>;

    /// Every scan configuration in the account.
    async fn list_scan_configs(&self) -> Result<Vec<ScanConfig>, InsightAppSecError>;
}

/// Access to the ThreadFix applications scans are uploaded into.
pub trait DestinationApi {
    async fn get_application_by_name(
        &self,
        team_name: &str,
        app_name: &str,
    ) -> Result<ThreadFixApplication, ThreadFixError>;

    /// Scans previously uploaded by this integration.
    async fn list_scans(&self, app_id: i64) -> Result<Vec<ScanMetadata>, ThreadFixError>;

    async fn upload_scan(
        &self,
        app_id: i64,
        scan: &ThreadFixScan,
    ) -> Result<UploadResponse, ThreadFixError>;
}

impl SourceApi for InsightAppSecClient {
    async fn search_applications(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<Application>, InsightAppSecError> {
        InsightAppSecClient::search_applications(self, name_pattern).await
    }

    async fn search_scans(&self, app_id: &str) -> Result<Vec<Scan>, InsightAppSecError> {
        InsightAppSecClient::search_scans(self, app_id).await
    }

    async fn get_scan(&self, scan_id: &str) -> Result<Scan, InsightAppSecError> {
        InsightAppSecClient::get_scan(self, scan_id).await
    }

    async fn search_vulnerabilities(
        &self,
        scan_id: &str,
    ) -> Result<Vec<Vulnerability>, InsightAppSecError> {
        InsightAppSecClient::search_vulnerabilities(self, scan_id).await
    }

    async fn get_module(&self, module_id: &str) -> Result<Module, InsightAppSecError> {
        InsightAppSecClient::get_module(self, module_id).await
    }

    async fn get_attack_documentation(
        &self,
        module_id: &str,
        attack_id: &str,
    ) -> Result<AttackDocumentation, InsightAppSecError> {
        InsightAppSecClient::get_attack_documentation(self, module_id, attack_id).await
    }

    async fn list_scan_configs(&self) -> Result<Vec<ScanConfig>, InsightAppSecError> {
        InsightAppSecClient::get_scan_configs(self).await
    }
}

impl DestinationApi for ThreadFixClient {
    async fn get_application_by_name(
        &self,
        team_name: &str,
        app_name: &str,
    ) -> Result<ThreadFixApplication, ThreadFixError> {
        ThreadFixClient::get_application_by_name(self, team_name, app_name).await
    }

    async fn list_scans(&self, app_id: i64) -> Result<Vec<ScanMetadata>, ThreadFixError> {
        ThreadFixClient::list_scans(self, app_id).await
    }

    async fn upload_scan(
        &self,
        app_id: i64,
        scan: &ThreadFixScan,
    ) -> Result<UploadResponse, ThreadFixError> {
        ThreadFixClient::upload_scan(self, app_id, scan).await
    }
}
