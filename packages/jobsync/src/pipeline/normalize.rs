//! Record normalization: source-specific raw fields → [`CanonicalRecord`].
//!
//! Normalization is pure. The only clock it sees is the record's own
//! `fetched_at`, so the same raw record always yields the same result.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::RejectionReason;
use crate::pipeline::dates::{date_from_timestamp, parse_date, DateKind, DEFAULT_REFERENCE_OFFSET_SECS};
use crate::pipeline::vocab::{
    resolve_batch, resolve_targets, COMPANY_TYPES, EDUCATION_LEVELS, INDUSTRIES, TARGETS,
};
use crate::types::record::{CanonicalRecord, RawRecord};

/// Maps one source's raw records into canonical records.
pub trait Normalizer: Send + Sync {
    fn normalize(
        &self,
        raw: &RawRecord,
        source_name: &str,
    ) -> Result<CanonicalRecord, RejectionReason>;
}

// Field aliases, in priority order. The first alias with a non-blank value wins.
const COMPANY_FIELDS: &[&str] = &[
    "company",
    "company_name",
    "companyName",
    "公司名称",
    "公司",
    "企业名称",
    "企业",
];
const POSITION_FIELDS: &[&str] = &[
    "position",
    "title",
    "job",
    "job_title",
    "岗位",
    "职位",
    "岗位名称",
    "职位名称",
];
const PUBLISH_DATE_FIELDS: &[&str] = &[
    "publish_date",
    "date",
    "published_at",
    "发布日期",
    "发布时间",
    "岗位更新",
    "更新时间",
];
const DEADLINE_FIELDS: &[&str] = &["deadline", "截止日期", "截止时间", "申请截止"];
const URL_FIELDS: &[&str] = &["source_url", "url", "link", "source", "链接", "信息来源", "网申链接"];
const CITY_FIELDS: &[&str] = &["cities", "city", "location", "工作地点", "工作城市", "城市"];
const BATCH_FIELDS: &[&str] = &["batch", "批次", "招聘批次"];
const INDUSTRY_FIELDS: &[&str] = &["industry", "行业"];
const COMPANY_TYPE_FIELDS: &[&str] = &["company_type", "企业类型", "公司类型", "公司性质"];
const EDUCATION_FIELDS: &[&str] = &["education", "degree", "学历要求", "学历"];
const TARGET_FIELDS: &[&str] = &["targets", "target", "招聘对象", "届别"];
const NO_WRITTEN_TEST_FIELDS: &[&str] = &["no_written_test", "免笔试"];
const REFERRAL_FIELDS: &[&str] = &["referral_code", "内推码"];

const CITY_SEPARATORS: &[char] = &[',', '，', '、', '/', '|', '；', ';'];

const TRUE_WORDS: &[&str] = &["true", "yes", "1", "是", "免笔试", "免笔"];

/// Alias-based normalizer used by every adapter that does not bring its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardNormalizer {
    reference_offset_secs: i32,
}

impl Default for StandardNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardNormalizer {
    /// Normalizer resolving dates at UTC+8.
    pub const fn new() -> Self {
        Self {
            reference_offset_secs: DEFAULT_REFERENCE_OFFSET_SECS,
        }
    }

    /// Resolve dates in a different UTC offset (seconds east).
    pub const fn with_reference_offset(mut self, offset_secs: i32) -> Self {
        self.reference_offset_secs = offset_secs;
        self
    }

    fn date(&self, raw: &RawRecord, fields: &[&str], kind: DateKind) -> Option<chrono::NaiveDate> {
        match lookup(raw, fields)? {
            Value::String(s) => parse_date(s, raw.fetched_at, self.reference_offset_secs, kind),
            Value::Number(n) => date_from_timestamp(n.as_i64()?, self.reference_offset_secs),
            _ => None,
        }
    }
}

impl Normalizer for StandardNormalizer {
    fn normalize(
        &self,
        raw: &RawRecord,
        source_name: &str,
    ) -> Result<CanonicalRecord, RejectionReason> {
        let company = lookup_text(raw, COMPANY_FIELDS)
            .map(|s| display_form(&s))
            .filter(|s| !s.is_empty())
            .ok_or(RejectionReason::MissingRequiredField { field: "company" })?;
        let position = lookup_text(raw, POSITION_FIELDS)
            .map(|s| display_form(&s))
            .filter(|s| !s.is_empty())
            .ok_or(RejectionReason::MissingRequiredField { field: "position" })?;

        let industry = match lookup(raw, INDUSTRY_FIELDS) {
            Some(Value::Array(items)) => items.first().and_then(value_text),
            Some(other) => value_text(other),
            None => None,
        };

        let targets: BTreeSet<String> = match lookup(raw, TARGET_FIELDS) {
            Some(Value::Array(items)) => {
                let listed: Vec<String> = items
                    .iter()
                    .filter_map(value_text)
                    .map(|t| display_form(&t))
                    .filter(|t| !t.is_empty())
                    .collect();
                let known: BTreeSet<String> =
                    listed.iter().filter(|t| TARGETS.contains(t)).cloned().collect();
                if known.is_empty() && !listed.is_empty() {
                    TARGETS.fallback.map(str::to_string).into_iter().collect()
                } else {
                    known
                }
            }
            Some(other) => value_text(other)
                .map(|t| resolve_targets(&t))
                .unwrap_or_default()
                .into_iter()
                .collect(),
            None => BTreeSet::new(),
        };

        Ok(CanonicalRecord {
            company,
            position,
            publish_date: self.date(raw, PUBLISH_DATE_FIELDS, DateKind::Publish),
            deadline: self.date(raw, DEADLINE_FIELDS, DateKind::Deadline),
            source_url: lookup_text(raw, URL_FIELDS)
                .map(|u| clean_url(&u))
                .unwrap_or_default(),
            batch: lookup_text(raw, BATCH_FIELDS).and_then(|b| resolve_batch(&b)),
            industry: industry.and_then(|i| INDUSTRIES.resolve(&i)),
            company_type: lookup_text(raw, COMPANY_TYPE_FIELDS)
                .and_then(|t| COMPANY_TYPES.resolve(&t)),
            education: lookup_text(raw, EDUCATION_FIELDS)
                .and_then(|e| EDUCATION_LEVELS.resolve(&e)),
            cities: lookup(raw, CITY_FIELDS).map(split_cities).unwrap_or_default(),
            targets,
            no_written_test: lookup(raw, NO_WRITTEN_TEST_FIELDS)
                .map(truthy)
                .unwrap_or(false),
            referral_code: lookup_text(raw, REFERRAL_FIELDS)
                .map(|code| code.chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .filter(|code| !code.is_empty()),
            source_name: source_name.to_string(),
        })
    }
}

/// Display form: trimmed, full-width parentheses replaced, whitespace runs
/// collapsed to one space.
pub fn display_form(text: &str) -> String {
    text.replace('（', "(")
        .replace('）', ")")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Comparison form: the display form with full-width ASCII folded to
/// half-width and everything lowercased.
pub fn comparison_form(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            '\u{3000}' => ' ',
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect();
    display_form(&folded).to_lowercase()
}

/// First alias holding a non-null, non-blank value.
fn lookup<'a>(raw: &'a RawRecord, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().filter_map(|f| raw.get(f)).find(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    })
}

fn lookup_text(raw: &RawRecord, fields: &[&str]) -> Option<String> {
    lookup(raw, fields).and_then(value_text)
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn clean_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn split_cities(value: &Value) -> BTreeSet<String> {
    let pieces: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(value_text).collect(),
        other => value_text(other)
            .map(|text| {
                text.split(|c: char| CITY_SEPARATORS.contains(&c) || c.is_whitespace())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
    };
    pieces
        .iter()
        .map(|city| display_form(city))
        .filter(|city| !city.is_empty())
        .collect()
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => TRUE_WORDS.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}
