//! Record types flowing through the pipeline.
//!
//! ```text
//! RawRecord ──normalize──► CanonicalRecord ──identify──► IdentityKey
//!                                 │
//!                                 └──classify──► SyncDecision
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::pipeline::normalize::comparison_form;

/// Source-specific record exactly as an adapter produced it.
///
/// The field map is opaque to everything except the normalizer of the
/// source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source-specific fields
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// When the record was fetched; relative dates resolve against this
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    /// Create an empty record fetched at the given instant.
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fields: Map::new(),
            fetched_at,
        }
    }

    /// Wrap an existing field map.
    pub fn from_fields(fields: Map<String, Value>, fetched_at: DateTime<Utc>) -> Self {
        Self { fields, fetched_at }
    }

    /// Set a field (builder pattern).
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Get a field by its source-specific name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Normalized, source-independent job posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Display form of the company name
    pub company: String,

    /// Display form of the position title
    pub position: String,

    pub publish_date: Option<NaiveDate>,

    pub deadline: Option<NaiveDate>,

    pub source_url: String,

    /// Recruiting batch, e.g. 秋招 or 暑期实习
    pub batch: Option<String>,

    pub industry: Option<String>,

    pub company_type: Option<String>,

    pub education: Option<String>,

    pub cities: BTreeSet<String>,

    /// Graduating classes the posting targets, e.g. 2026届
    pub targets: BTreeSet<String>,

    pub no_written_test: bool,

    pub referral_code: Option<String>,

    /// Adapter that produced this record
    pub source_name: String,
}

impl CanonicalRecord {
    /// Create a record with only the required fields set.
    pub fn new(
        company: impl Into<String>,
        position: impl Into<String>,
        source_name: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            position: position.into(),
            publish_date: None,
            deadline: None,
            source_url: String::new(),
            batch: None,
            industry: None,
            company_type: None,
            education: None,
            cities: BTreeSet::new(),
            targets: BTreeSet::new(),
            no_written_test: false,
            referral_code: None,
            source_name: source_name.into(),
        }
    }

    pub fn with_publish_date(mut self, date: NaiveDate) -> Self {
        self.publish_date = Some(date);
        self
    }

    pub fn with_deadline(mut self, date: NaiveDate) -> Self {
        self.deadline = Some(date);
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = url.into();
        self
    }

    pub fn with_batch(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.cities.insert(city.into());
        self
    }

    /// Company name folded for comparison.
    pub fn company_key(&self) -> String {
        comparison_form(&self.company)
    }

    /// Position title folded for comparison.
    pub fn position_key(&self) -> String {
        comparison_form(&self.position)
    }
}

/// Stable fingerprint of a logical posting (hex-encoded SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Rehydrate a key read back from persistent storage.
    ///
    /// Keys for fresh records come from [`crate::pipeline::identity::identify`].
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What the sync engine should do with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    /// Key never synced before
    Insert,
    /// Key synced before, content changed since
    Update,
    /// Key synced before, content unchanged
    Skip,
}

impl SyncDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDecision::Insert => "insert",
            SyncDecision::Update => "update",
            SyncDecision::Skip => "skip",
        }
    }

    /// Whether this decision requires a sink write.
    pub fn needs_write(&self) -> bool {
        !matches!(self, SyncDecision::Skip)
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
