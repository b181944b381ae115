//! Application search built on top of the core client.

use serde::{Deserialize, Serialize};

use crate::InsightAppSecError;
use crate::client::InsightAppSecClient;
use crate::search::{SearchRequest, SearchType};

/// Hypermedia link attached to most InsightAppSec resources.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// Reference to another resource by identifier only (`{"id": "..."}`).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IdRef {
    pub id: String,
}

/// Represents an InsightAppSec application.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Application {
    /// Application UUID
    pub id: String,
    /// Display name, unique within the account
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl InsightAppSecClient {
    /// Find applications whose name matches a `LIKE` pattern.
    ///
    /// The pattern is passed through to the platform query language, so `%`
    /// wildcards work (`%payments%`). Single quotes are escaped.
    ///
    /// # Errors
    ///
    /// Returns an error if any page of the search fails.
    pub async fn search_applications(
        &self,
        name_pattern: &str,
    ) -> Result<Vec<Application>, InsightAppSecError> {
        let request = SearchRequest::new(
            SearchType::App,
            format!("app.name LIKE '{}'", escape_query_value(name_pattern)),
        );
        self.search_all(&request).await
    }
}

/// Escape a value for embedding in a single-quoted query literal.
pub(crate) fn escape_query_value(value: &str) -> String {
    value.replace('\'', "\\'")
}
