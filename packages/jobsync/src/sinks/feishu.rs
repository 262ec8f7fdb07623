//! Feishu Bitable sink.
//!
//! Maps each [`CanonicalRecord`] onto the table's columns and writes with
//! the batch create/update endpoints. Column value shapes:
//!
//! | Field | Column type | Encoding |
//! |-------|-------------|----------|
//! | publish_date, deadline | date | ms timestamp of local midnight |
//! | company_type, education | single select | option name |
//! | industry, cities, targets | multi select | array of option names |
//! | no_written_test | checkbox | bool |
//! | source_url | url | `{"link", "text"}` |
//! | everything else | text | string |
//!
//! Empty fields are omitted from the payload.

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use feishu_client::{FeishuClient, FeishuError, Field, NewRecord, RecordUpdate};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{SinkError, SinkResult};
use crate::pipeline::dates::DEFAULT_REFERENCE_OFFSET_SECS;
use crate::traits::sink::{Sink, SinkWrite, WriteOutcome, WriteReceipt};
use crate::types::record::{CanonicalRecord, SyncDecision};

pub use feishu_client::MAX_BATCH_SIZE;

/// Column names for each record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub publish_date: String,
    pub batch: String,
    pub company: String,
    pub company_type: String,
    pub industry: String,
    pub cities: String,
    pub position: String,
    pub education: String,
    pub deadline: String,
    pub targets: String,
    pub no_written_test: String,
    pub source_url: String,
    pub referral_code: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            publish_date: "岗位更新".into(),
            batch: "批次".into(),
            company: "公司名称".into(),
            company_type: "企业类型".into(),
            industry: "行业".into(),
            cities: "工作城市".into(),
            position: "岗位".into(),
            education: "学历要求".into(),
            deadline: "截止时间".into(),
            targets: "招聘对象".into(),
            no_written_test: "免笔试".into(),
            source_url: "信息来源".into(),
            referral_code: "内推码".into(),
        }
    }
}

impl FieldMapping {
    /// `(record field, column name)` pairs in table order.
    pub fn columns(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("publish_date", &self.publish_date),
            ("batch", &self.batch),
            ("company", &self.company),
            ("company_type", &self.company_type),
            ("industry", &self.industry),
            ("cities", &self.cities),
            ("position", &self.position),
            ("education", &self.education),
            ("deadline", &self.deadline),
            ("targets", &self.targets),
            ("no_written_test", &self.no_written_test),
            ("source_url", &self.source_url),
            ("referral_code", &self.referral_code),
        ]
    }

    /// Mapped columns that the table does not have.
    pub fn missing_columns<'a>(&'a self, fields: &[Field]) -> Vec<&'a str> {
        self.columns()
            .into_iter()
            .map(|(_, column)| column)
            .filter(|column| !fields.iter().any(|f| f.field_name == *column))
            .collect()
    }
}

/// Writes postings to one Bitable table.
pub struct BitableSink {
    client: Arc<FeishuClient>,
    mapping: FieldMapping,
    offset: FixedOffset,
}

impl BitableSink {
    pub fn new(client: Arc<FeishuClient>) -> Self {
        Self {
            client,
            mapping: FieldMapping::default(),
            offset: utc_plus(DEFAULT_REFERENCE_OFFSET_SECS),
        }
    }

    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Offset whose midnight date columns are stamped at.
    pub fn with_reference_offset(mut self, offset_secs: i32) -> Self {
        self.offset = utc_plus(offset_secs);
        self
    }

    pub fn client(&self) -> &Arc<FeishuClient> {
        &self.client
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Column payload for one record.
    pub fn encode(&self, record: &CanonicalRecord) -> Map<String, Value> {
        let m = &self.mapping;
        let mut fields = Map::new();

        let mut text = |column: &str, value: Option<&str>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                fields.insert(column.to_string(), json!(value));
            }
        };
        text(&m.company, Some(&record.company));
        text(&m.position, Some(&record.position));
        text(&m.batch, record.batch.as_deref());
        text(&m.company_type, record.company_type.as_deref());
        text(&m.education, record.education.as_deref());
        text(&m.referral_code, record.referral_code.as_deref());

        if let Some(industry) = record.industry.as_deref().filter(|v| !v.is_empty()) {
            fields.insert(m.industry.clone(), json!([industry]));
        }
        if !record.cities.is_empty() {
            fields.insert(m.cities.clone(), json!(record.cities));
        }
        if !record.targets.is_empty() {
            fields.insert(m.targets.clone(), json!(record.targets));
        }
        if let Some(ms) = record.publish_date.and_then(|d| self.timestamp_ms(d)) {
            fields.insert(m.publish_date.clone(), json!(ms));
        }
        if let Some(ms) = record.deadline.and_then(|d| self.timestamp_ms(d)) {
            fields.insert(m.deadline.clone(), json!(ms));
        }
        if !record.source_url.is_empty() {
            fields.insert(
                m.source_url.clone(),
                json!({"link": record.source_url, "text": record.source_url}),
            );
        }
        fields.insert(m.no_written_test.clone(), json!(record.no_written_test));

        fields
    }

    fn timestamp_ms(&self, date: NaiveDate) -> Option<i64> {
        date.and_hms_opt(0, 0, 0)?
            .and_local_timezone(self.offset)
            .single()
            .map(|dt| dt.timestamp_millis())
    }
}

fn utc_plus(offset_secs: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_secs).unwrap_or_else(|| Utc.fix())
}

/// Classify a client error by what the sync engine should do about it.
pub fn sink_error(err: FeishuError) -> SinkError {
    let message = err.to_string();
    if err.is_rate_limited() {
        SinkError::RateLimited {
            message,
            retry_after: err.retry_after(),
        }
    } else if err.is_auth_failure() {
        SinkError::AuthFailure(message)
    } else if err.is_schema_error() || matches!(err, FeishuError::Config(_)) {
        SinkError::SchemaMismatch(message)
    } else {
        // Network, 5xx, write conflicts, unparseable replies and unknown codes
        SinkError::Transient(message)
    }
}

#[async_trait]
impl Sink for BitableSink {
    fn name(&self) -> &str {
        "feishu"
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }

    /// Inserts, and updates whose row id is unknown, become creates; the
    /// rest become updates. A failed call is reported for the whole batch
    /// only while nothing in it has been written yet.
    async fn write(&self, batch: &[SinkWrite]) -> SinkResult<Vec<WriteOutcome>> {
        let mut creates: Vec<(usize, NewRecord)> = Vec::new();
        let mut updates: Vec<(usize, RecordUpdate)> = Vec::new();

        for (index, write) in batch.iter().enumerate() {
            let fields = self.encode(&write.record);
            match (&write.decision, &write.remote_id) {
                (SyncDecision::Update, Some(record_id)) => updates.push((
                    index,
                    RecordUpdate {
                        record_id: record_id.clone(),
                        fields,
                    },
                )),
                _ => creates.push((index, NewRecord { fields })),
            }
        }

        let mut outcomes: Vec<Option<WriteOutcome>> = vec![None; batch.len()];
        let mut written = false;

        if !creates.is_empty() {
            let payload: Vec<NewRecord> = creates.iter().map(|(_, r)| r.clone()).collect();
            let indexes: Vec<usize> = creates.iter().map(|(i, _)| *i).collect();
            let result = self.client.batch_create_records(&payload).await;
            written |= assign(&mut outcomes, &indexes, result, written)?;
        }

        if !updates.is_empty() {
            let payload: Vec<RecordUpdate> = updates.iter().map(|(_, r)| r.clone()).collect();
            let indexes: Vec<usize> = updates.iter().map(|(i, _)| *i).collect();
            let result = self.client.batch_update_records(&payload).await;
            assign(&mut outcomes, &indexes, result, written)?;
        }

        debug!(
            creates = creates.len(),
            updates = updates.len(),
            "Bitable batch written"
        );

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or_else(|| Err(SinkError::Transient("no outcome recorded".into()))))
            .collect())
    }
}

/// Fill outcomes for one endpoint call. Returns whether rows were written.
fn assign(
    outcomes: &mut [Option<WriteOutcome>],
    indexes: &[usize],
    result: feishu_client::Result<Vec<feishu_client::Record>>,
    already_written: bool,
) -> SinkResult<bool> {
    match result {
        Ok(records) if records.len() == indexes.len() => {
            for (index, record) in indexes.iter().zip(records) {
                outcomes[*index] = Some(Ok(WriteReceipt::new(record.record_id)));
            }
            Ok(true)
        }
        Ok(records) => {
            // Rows may exist without ids we can match to inputs.
            let err = SinkError::SchemaMismatch(format!(
                "sink answered {} rows for {} writes",
                records.len(),
                indexes.len()
            ));
            for index in indexes {
                outcomes[*index] = Some(Err(err.clone()));
            }
            Ok(true)
        }
        Err(err) if !already_written => Err(sink_error(err)),
        Err(err) => {
            let err = sink_error(err);
            for index in indexes {
                outcomes[*index] = Some(Err(err.clone()));
            }
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feishu_client::FeishuConfig;

    fn sink() -> BitableSink {
        let client = FeishuClient::new(FeishuConfig::new("id", "secret", "app", "tbl")).unwrap();
        BitableSink::new(Arc::new(client))
    }

    #[test]
    fn test_encode_shapes() {
        let mut record = CanonicalRecord::new("字节跳动", "后端开发工程师", "demo")
            .with_publish_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .with_source_url("https://jobs.example.com/1")
            .with_industry("互联网")
            .with_city("北京")
            .with_city("上海");
        record.targets.insert("2026届".into());

        let fields = sink().encode(&record);

        assert_eq!(fields["公司名称"], json!("字节跳动"));
        // 2025-06-01T00:00:00+08:00
        assert_eq!(fields["岗位更新"], json!(1_748_707_200_000_i64));
        assert_eq!(fields["行业"], json!(["互联网"]));
        assert_eq!(fields["工作城市"], json!(["上海", "北京"]));
        assert_eq!(fields["招聘对象"], json!(["2026届"]));
        assert_eq!(
            fields["信息来源"],
            json!({"link": "https://jobs.example.com/1", "text": "https://jobs.example.com/1"})
        );
        assert_eq!(fields["免笔试"], json!(false));
        assert!(!fields.contains_key("截止时间"));
        assert!(!fields.contains_key("内推码"));
    }

    #[test]
    fn test_error_classification() {
        let api = |code| FeishuError::Api {
            code,
            msg: "x".into(),
        };
        assert!(matches!(sink_error(api(99991400)), SinkError::RateLimited { .. }));
        assert!(matches!(sink_error(api(99991663)), SinkError::AuthFailure(_)));
        assert!(matches!(sink_error(api(1254045)), SinkError::SchemaMismatch(_)));
        assert!(matches!(sink_error(api(424242)), SinkError::Transient(_)));
        assert!(matches!(
            sink_error(FeishuError::Config("batch too large".into())),
            SinkError::SchemaMismatch(_)
        ));
        assert!(matches!(
            sink_error(FeishuError::Status {
                status: 422,
                body: String::new()
            }),
            SinkError::SchemaMismatch(_)
        ));
        assert!(matches!(
            sink_error(FeishuError::Status {
                status: 503,
                body: String::new()
            }),
            SinkError::Transient(_)
        ));
    }

    #[test]
    fn test_missing_columns() {
        let mapping = FieldMapping::default();
        let fields: Vec<Field> = mapping
            .columns()
            .into_iter()
            .filter(|(name, _)| *name != "referral_code")
            .map(|(_, column)| Field {
                field_id: format!("fld-{column}"),
                field_name: column.to_string(),
                field_type: 1,
                ui_type: None,
                is_primary: false,
            })
            .collect();

        assert_eq!(mapping.missing_columns(&fields), vec!["内推码"]);
    }
}
