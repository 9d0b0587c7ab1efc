//! Wire types for the endpoints the core calls directly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

/// Body of `POST /api/session`.
#[derive(Debug, Serialize)]
pub(crate) struct SessionRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Response of `POST /api/session`.
#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    pub id: String,
}

/// Query language of a dataset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    /// Free-text SQL, subject to the read-only guard.
    Native,
    /// Structured MBQL query object.
    Query,
}

/// A native SQL query with optional template tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeQuery {
    pub query: String,
    #[serde(
        rename = "template-tags",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub template_tags: Option<Map<String, Value>>,
}

/// Body of `POST /api/dataset` and its export variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetQueryRequest {
    pub database: u64,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
}

impl DatasetQueryRequest {
    /// Creates a native SQL request against `database`.
    #[must_use]
    pub fn native(database: u64, sql: impl Into<String>) -> Self {
        Self {
            database,
            query_type: QueryType::Native,
            native: Some(NativeQuery {
                query: sql.into(),
                template_tags: None,
            }),
            query: None,
        }
    }

    /// Creates an MBQL request against `database`.
    #[must_use]
    pub const fn mbql(database: u64, query: Map<String, Value>) -> Self {
        Self {
            database,
            query_type: QueryType::Query,
            native: None,
            query: Some(query),
        }
    }

    /// Attaches template tags to a native request.
    #[must_use]
    pub fn with_template_tags(mut self, tags: Map<String, Value>) -> Self {
        if let Some(native) = self.native.as_mut() {
            native.template_tags = Some(tags);
        }
        self
    }

    /// The SQL text of a native request.
    #[must_use]
    pub fn sql(&self) -> Option<&str> {
        self.native.as_ref().map(|n| n.query.as_str())
    }
}

/// Response of `POST /api/dataset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetQueryResponse {
    pub data: DatasetData,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result rows and column metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetData {
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default)]
    pub cols: Vec<DatasetCol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_form: Option<NativeForm>,
}

/// Column metadata for a dataset result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetCol {
    /// Column name as returned by the database.
    pub name: String,
    /// Human-readable label.
    #[serde(default)]
    pub display_name: String,
    /// Metabase base type, e.g. `type/Integer`.
    #[serde(default)]
    pub base_type: String,
    /// MBQL field reference, when the column maps to a known field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<Vec<Value>>,
}

/// The SQL Metabase generated for a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeForm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Value>>,
}

/// A Metabase user, as returned by `GET /api/user/current`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_ids: Vec<u64>,
}

/// Download format for query exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// A JSON array of row objects.
    Json,
    /// An Excel workbook.
    Xlsx,
}

impl ExportFormat {
    /// Lowercase name, also the export endpoint suffix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(ClientError::InvalidRequest(format!(
                "unsupported export format '{other}', expected csv, json or xlsx"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_request_wire_shape() {
        let request = DatasetQueryRequest::native(1, "SELECT id FROM users");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "database": 1,
                "type": "native",
                "native": { "query": "SELECT id FROM users" }
            })
        );
    }

    #[test]
    fn test_template_tags_use_hyphenated_key() {
        let mut tags = Map::new();
        tags.insert("id".to_string(), json!({"type": "number"}));
        let request = DatasetQueryRequest::native(3, "SELECT {{id}}").with_template_tags(tags);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["native"]["template-tags"]["id"]["type"], "number");
    }

    #[test]
    fn test_mbql_request_has_no_sql() {
        let mut query = Map::new();
        query.insert("source-table".to_string(), json!(10));
        let request = DatasetQueryRequest::mbql(2, query);
        assert_eq!(request.sql(), None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "query");
        assert!(value.get("native").is_none());
    }

    #[test]
    fn test_dataset_response_parses_minimal_payload() {
        let response: DatasetQueryResponse = serde_json::from_value(json!({
            "status": "completed",
            "row_count": 2,
            "data": {
                "cols": [{"name": "ID", "display_name": "ID", "base_type": "type/Integer"}],
                "rows": [[1], [2]]
            }
        }))
        .unwrap();
        assert_eq!(response.status, "completed");
        assert_eq!(response.row_count, 2);
        assert_eq!(response.data.cols[0].base_type, "type/Integer");
        assert_eq!(response.data.rows.len(), 2);
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::Json.to_string(), "json");
    }
}
