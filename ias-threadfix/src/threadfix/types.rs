//! ThreadFix REST wire types.
//!
//! Responses share one envelope (`message`, `success`, `responseCode`,
//! `object`). The scan file uploaded to `/upload` follows the ThreadFix
//! generic scan schema; field names are camelCase and empty optional values
//! are omitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scanner name stamped on every uploaded scan and used to recognise them again.
pub const SCANNER_SOURCE: &str = "Rapid7 InsightAppSec";

/// Collection type of every uploaded scan
pub const COLLECTION_TYPE_DAST: &str = "DAST";

/// Mapping type for CWE references
pub const MAPPING_TYPE_CWE: &str = "CWE";

/// Mapping type for every non-CWE reference
pub const MAPPING_TYPE_TOOL_VENDOR: &str = "ToolVendor";

/// Standard ThreadFix response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response_code: i32,
    #[serde(default = "Option::default")]
    pub object: Option<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// A ThreadFix application (subset of the lookup response).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadFixApplication {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<String>,
    pub application_criticality: NamedRef,
    pub organization: NamedRef,
    pub total_vuln_count: i64,
}

/// Scan summary as listed under an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanMetadata {
    pub id: i64,
    /// Epoch milliseconds
    pub import_time: i64,
    /// Epoch milliseconds
    pub updated_date: i64,
    pub scanner_name: String,
}

/// Result of a scan upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub response_code: i32,
}

/// A severity level configured in ThreadFix.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Severity {
    pub id: i64,
    pub name: String,
    pub int_value: i32,
    pub custom_name: String,
    pub display_name: String,
}

/// Where a dynamic finding was observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct SurfaceLocation {
    pub url: String,
    pub parameter: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attack_string: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attack_request: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub attack_response: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DynamicDetails {
    pub surface_location: SurfaceLocation,
}

/// Taxonomy mapping attached to a finding (CWE or vendor reference).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Mapping {
    pub mapping_type: String,
    pub value: String,
    pub primary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_other_type: Option<String>,
}

/// One finding in a ThreadFix scan file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Finding {
    pub native_id: String,
    pub severity: String,
    pub native_severity: String,
    pub summary: String,
    pub description: String,
    pub scanner_detail: String,
    pub scanner_recommendation: String,
    pub dynamic_details: DynamicDetails,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub mappings: Vec<Mapping>,
    pub comments: Vec<String>,
}

/// A complete scan file ready for upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreadFixScan {
    pub created: String,
    pub updated: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub exported: String,
    pub collection_type: String,
    pub source: String,
    pub executive_summary: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    pub findings: Vec<Finding>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_file_field_names() {
        let scan = ThreadFixScan {
            created: "2019-08-05T17:02:44Z".into(),
            updated: "2019-08-05T18:10:17Z".into(),
            exported: String::new(),
            collection_type: COLLECTION_TYPE_DAST.into(),
            source: SCANNER_SOURCE.into(),
            executive_summary: "Application ID: a1, Scan ID: s1".into(),
            metadata: BTreeMap::new(),
            findings: vec![Finding {
                native_id: "v1".into(),
                severity: "High".into(),
                native_severity: "HIGH".into(),
                dynamic_details: DynamicDetails {
                    surface_location: SurfaceLocation {
                        url: "https://shop.example.test/".into(),
                        parameter: "q".into(),
                        attack_string: "<script>".into(),
                        ..SurfaceLocation::default()
                    },
                },
                mappings: vec![Mapping {
                    mapping_type: MAPPING_TYPE_CWE.into(),
                    value: "79".into(),
                    primary: true,
                    vendor_other_type: None,
                }],
                ..Finding::default()
            }],
        };

        let value = serde_json::to_value(&scan).expect("serializes");
        assert!(value.get("exported").is_none());
        assert!(value.get("metadata").is_none());
        assert_eq!(value["collectionType"], "DAST");
        assert_eq!(value["executiveSummary"], "Application ID: a1, Scan ID: s1");

        let finding = &value["findings"][0];
        assert_eq!(finding["nativeId"], "v1");
        assert_eq!(finding["nativeSeverity"], "HIGH");
        assert_eq!(finding["comments"], json!([]));
        assert_eq!(
            finding["dynamicDetails"]["surfaceLocation"],
            json!({"url": "https://shop.example.test/", "parameter": "q", "attackString": "<script>"})
        );
        assert_eq!(
            finding["mappings"][0],
            json!({"mappingType": "CWE", "value": "79", "primary": true})
        );
    }

    #[test]
    fn test_list_scans_envelope() {
        let body = r#"{
            "message": "",
            "success": true,
            "responseCode": -1,
            "object": [
                {"id": 12, "importTime": 1565028617000, "updatedDate": 1565028617000, "scannerName": "Rapid7 InsightAppSec"},
                {"id": 13, "importTime": 1565028000000, "updatedDate": 1565028000000, "scannerName": "OWASP ZAP"}
            ]
        }"#;

        let response: ApiResponse<Vec<ScanMetadata>> = serde_json::from_str(body).expect("parses");
        assert!(response.success);
        let scans = response.object.expect("object present");
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[1].scanner_name, "OWASP ZAP");
    }

    #[test]
    fn test_failed_lookup_envelope_without_object() {
        let body = r#"{"message": "No application found with name Missing", "success": false, "responseCode": -1}"#;
        let response: ApiResponse<ThreadFixApplication> = serde_json::from_str(body).expect("parses");
        assert!(!response.success);
        assert!(response.object.is_none());
    }
}
