use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Common response envelope: `{"code": 0, "msg": "success", "data": ...}`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub app_id: &'a str,
    pub app_secret: &'a str,
}

/// Token endpoint answers without a `data` wrapper.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub tenant_access_token: Option<String>,
    /// Lifetime in seconds
    pub expire: Option<u64>,
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    pub page_token: Option<String>,
    pub total: Option<u64>,
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub field_id: String,
    pub field_name: String,
    /// Numeric field type (1 text, 3 single select, 4 multi select,
    /// 5 date, 7 checkbox, 15 url, ...)
    #[serde(rename = "type")]
    pub field_type: i64,
    #[serde(default)]
    pub ui_type: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

/// A table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub record_id: String,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest<'a, T> {
    pub records: &'a [T],
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    #[serde(default = "Vec::new")]
    pub records: Vec<Record>,
}
