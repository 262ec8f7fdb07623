//! File import source.
//!
//! Supported formats, chosen by extension:
//! - `.json`: an array of objects, or an object with a `records` array
//! - `.txt`: one posting per line, `company,position[,industry[,city]]`

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FetchError, FetchResult};
use crate::traits::source::SourceAdapter;
use crate::types::{config::FetchFilters, record::RawRecord};

/// Reads raw records from a local file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_json(&self, text: &str) -> FetchResult<Vec<Map<String, Value>>> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| FetchError::Parse(format!("{}: {e}", self.path.display())))?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove("records") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(FetchError::Parse(format!(
                        "{}: expected an array or an object with a `records` array",
                        self.path.display()
                    )))
                }
            },
            _ => {
                return Err(FetchError::Parse(format!(
                    "{}: expected an array or an object",
                    self.path.display()
                )))
            }
        };

        // Non-object entries are passed on without fields so the normalizer
        // rejects and counts them.
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Object(fields) => records.push(fields),
                other => {
                    warn!(path = %self.path.display(), index = i, kind = %json_kind(&other), "Non-object entry");
                    let mut fields = Map::new();
                    fields.insert("entry".into(), json!(i));
                    records.push(fields);
                }
            }
        }
        Ok(records)
    }

    fn parse_txt(&self, text: &str) -> Vec<Map<String, Value>> {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                let parts: Vec<&str> = line.split([',', '，']).map(str::trim).collect();
                let mut fields = Map::new();
                fields.insert("公司名称".into(), json!(parts[0]));
                if let Some(position) = parts.get(1) {
                    fields.insert("岗位".into(), json!(position));
                }
                if let Some(industry) = parts.get(2) {
                    fields.insert("行业".into(), json!(industry));
                }
                if let Some(city) = parts.get(3) {
                    fields.insert("工作城市".into(), json!(city));
                }
                fields.insert("line".into(), json!(i + 1));
                fields
            })
            .collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl SourceAdapter for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let rows = match extension.as_deref() {
            Some("json") => self.parse_json(&text)?,
            Some("txt") => self.parse_txt(&text),
            other => {
                return Err(FetchError::Config(format!(
                    "unsupported file type {:?} for {}",
                    other.unwrap_or(""),
                    self.path.display()
                )))
            }
        };

        let fetched_at = Utc::now();
        let limit = filters.limit.unwrap_or(usize::MAX);
        let records: Vec<RawRecord> = rows
            .into_iter()
            .take(limit)
            .map(|fields| RawRecord::from_fields(fields, fetched_at))
            .collect();

        debug!(path = %self.path.display(), records = records.len(), "Imported records from file");
        Ok(records)
    }
}
