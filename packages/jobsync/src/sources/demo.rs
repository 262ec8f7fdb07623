//! Demo source - deterministic sample postings for exercising the pipeline
//! end to end without touching a real site.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Utc};
use serde_json::{json, Map, Value};

use crate::error::FetchResult;
use crate::traits::source::SourceAdapter;
use crate::types::{config::FetchFilters, record::RawRecord};

const COMPANIES: &[&str] = &[
    "字节跳动", "腾讯", "阿里巴巴", "美团", "京东", "百度", "网易", "小米", "华为", "滴滴出行",
    "快手", "拼多多", "哔哩哔哩", "小红书", "蚂蚁集团",
];

const POSITIONS: &[&str] = &[
    "后端开发工程师",
    "前端开发工程师",
    "算法工程师",
    "产品经理",
    "数据分析师",
    "UI设计师",
    "测试工程师",
    "运维工程师",
    "Java开发",
    "Python开发",
];

const INDUSTRIES: &[&str] = &["互联网", "金融", "制造", "教育", "医疗"];
const COMPANY_TYPES: &[&str] = &["民营企业", "国企", "央企", "外企", "创业公司"];
const EDUCATIONS: &[&str] = &["本科", "硕士", "博士", "本科及以上"];
const CITIES: &[&str] = &[
    "北京", "上海", "深圳", "杭州", "北京、上海", "广州", "成都", "武汉", "南京", "西安",
];

const DEFAULT_COUNT: usize = 20;

/// Generates `FetchFilters::limit` (default 20) sample postings.
///
/// Output depends only on the index and the fetch day, so two fetches on the
/// same day return identical records.
#[derive(Debug, Clone, Default)]
pub struct DemoSource;

impl DemoSource {
    pub fn new() -> Self {
        Self
    }

    fn record(index: usize, fetched_at: chrono::DateTime<Utc>) -> RawRecord {
        let today = fetched_at.date_naive();
        let batch = match today.month() {
            9..=11 => ["秋招提前批", "秋招", "秋招补录"][index % 3],
            2..=5 => ["春招提前批", "春招", "春招补录"][index % 3],
            _ => ["暑期实习", "寒假实习", "日常实习"][index % 3],
        };
        let company = COMPANIES[index % COMPANIES.len()];
        let deadline = today + Duration::days(7 + (index as i64 * 3) % 53);

        let mut fields = Map::new();
        fields.insert("公司名称".into(), json!(company));
        fields.insert("岗位".into(), json!(POSITIONS[(index * 7) % POSITIONS.len()]));
        fields.insert("批次".into(), json!(batch));
        fields.insert("企业类型".into(), json!(COMPANY_TYPES[index % COMPANY_TYPES.len()]));
        fields.insert("行业".into(), json!(INDUSTRIES[index % INDUSTRIES.len()]));
        fields.insert("工作城市".into(), json!(CITIES[index % CITIES.len()]));
        fields.insert("学历要求".into(), json!(EDUCATIONS[index % EDUCATIONS.len()]));
        fields.insert("免笔试".into(), json!(index % 3 == 0));
        fields.insert(
            "信息来源".into(),
            json!(format!("https://demo.example.com/job/{index}")),
        );
        fields.insert("发布日期".into(), json!(format!("{}天前", index % 30)));
        fields.insert(
            "截止日期".into(),
            json!(deadline.format("%Y-%m-%d").to_string()),
        );
        if index % 2 == 0 {
            fields.insert("内推码".into(), Value::from(format!("DEMO{:04}", index)));
        }

        RawRecord::from_fields(fields, fetched_at)
    }
}

#[async_trait]
impl SourceAdapter for DemoSource {
    fn name(&self) -> &str {
        "demo"
    }

    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>> {
        let count = filters.limit.unwrap_or(DEFAULT_COUNT);
        let fetched_at = Utc::now();
        Ok((0..count).map(|i| Self::record(i, fetched_at)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_respects_limit() {
        let records = DemoSource::new()
            .fetch_records(&FetchFilters::new().with_limit(5))
            .await
            .unwrap();
        assert_eq!(records.len(), 5);
    }

    #[tokio::test]
    async fn test_records_normalize() {
        let source = DemoSource::new();
        let records = source.fetch_records(&FetchFilters::new()).await.unwrap();
        assert_eq!(records.len(), DEFAULT_COUNT);

        for raw in &records {
            let record = source.normalizer().normalize(raw, source.name()).unwrap();
            assert!(!record.company.is_empty());
            assert!(record.publish_date.is_some());
            assert!(record.deadline.is_some());
        }
    }
}
