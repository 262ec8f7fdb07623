//! yingjiesheng.com (应届生求职网) list-page scraper.
//!
//! Walks the paginated campus (`xiaozhao`) or internship (`shixi`) listing,
//! one request per page, and stops at the first page with no postings.
//! Requests are spaced by a `governor` limiter and HTTP 429 answers are
//! retried with exponential backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::SourceSettings;
use crate::error::{FetchError, FetchResult};
use crate::traits::source::SourceAdapter;
use crate::types::{config::FetchFilters, record::RawRecord};

pub const BASE_URL: &str = "https://www.yingjiesheng.com";

const DEFAULT_CATEGORY: &str = "xiaozhao";

const ITEM_SELECTORS: &[&str] = &[".job-list-item", ".job-item", "li.job"];
const COMPANY_SELECTORS: &[&str] = &[".company-name", ".company", "h3"];
const POSITION_SELECTORS: &[&str] = &[".job-title", ".position", "h2"];
const DATE_SELECTORS: &[&str] = &[".date", ".publish-date"];
const CITY_SELECTORS: &[&str] = &[".city", ".location"];

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Listing path for a category, with `{}` standing for the page number.
fn category_path(category: &str) -> Option<&'static str> {
    match category {
        "xiaozhao" => Some("/job-00-00-0-0-0-0-0-0-0-{}.html"),
        "shixi" => Some("/intern-00-00-0-0-0-0-0-0-0-{}.html"),
        _ => None,
    }
}

pub struct YingjieshengSource {
    client: reqwest::Client,
    base_url: Url,
    limiter: Option<Arc<DirectRateLimiter>>,
    max_retries: u32,
}

impl YingjieshengSource {
    pub fn new(settings: &SourceSettings) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(settings.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        let base_url =
            Url::parse(BASE_URL).map_err(|e| FetchError::Config(format!("bad base url: {e}")))?;

        Ok(Self {
            client,
            base_url,
            limiter: Quota::with_period(settings.request_delay)
                .map(|quota| Arc::new(RateLimiter::direct(quota))),
            max_retries: settings.max_retries,
        })
    }

    /// Point the scraper at a different host (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: &str) -> FetchResult<Self> {
        self.base_url =
            Url::parse(base_url).map_err(|e| FetchError::Config(format!("bad base url: {e}")))?;
        Ok(self)
    }

    fn page_url(&self, category: &str, page: u32) -> FetchResult<Url> {
        let path = category_path(category)
            .ok_or_else(|| FetchError::Config(format!("unknown category '{category}'")))?;
        self.base_url
            .join(&path.replace("{}", &page.to_string()))
            .map_err(|e| FetchError::Config(e.to_string()))
    }

    async fn get_page(&self, url: &Url) -> FetchResult<String> {
        let mut attempt = 0;
        loop {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }

            let response = self.client.get(url.clone()).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let wait = retry_after(&response)
                    .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt + 1)));
                warn!(url = %url, attempt, ?wait, "Rate limited by site, backing off");
                tokio::time::sleep(wait).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            return Ok(response.text().await?);
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn compile(selectors: &[&str]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
}

fn first_text(item: &ElementRef<'_>, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        item.select(selector).next().map(|el| {
            el.text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
    })
}

/// Extract raw postings from one listing page.
///
/// Items missing a company or title are still returned so the normalizer
/// can count them as rejections.
pub fn parse_list_page(html: &str, base_url: &Url, fetched_at: DateTime<Utc>) -> Vec<RawRecord> {
    let document = Html::parse_document(html);

    let items: Vec<ElementRef<'_>> = compile(ITEM_SELECTORS)
        .iter()
        .map(|selector| document.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    let company = compile(COMPANY_SELECTORS);
    let position = compile(POSITION_SELECTORS);
    let date = compile(DATE_SELECTORS);
    let city = compile(CITY_SELECTORS);
    let link = compile(&["a[href]"]);

    items
        .iter()
        .map(|item| {
            let mut fields = Map::new();
            if let Some(text) = first_text(item, &company) {
                fields.insert("company".into(), json!(text));
            }
            if let Some(text) = first_text(item, &position) {
                fields.insert("position".into(), json!(text));
            }
            if let Some(text) = first_text(item, &date) {
                fields.insert("publish_date".into(), json!(text));
            }
            if let Some(text) = first_text(item, &city) {
                fields.insert("city".into(), json!(text));
            }
            let href = link
                .iter()
                .find_map(|s| item.select(s).next())
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| base_url.join(href).ok());
            if let Some(url) = href {
                fields.insert("url".into(), json!(url.to_string()));
            }
            RawRecord::from_fields(fields, fetched_at)
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for YingjieshengSource {
    fn name(&self) -> &str {
        "yingjiesheng"
    }

    async fn fetch_records(&self, filters: &FetchFilters) -> FetchResult<Vec<RawRecord>> {
        let category = filters.category.as_deref().unwrap_or(DEFAULT_CATEGORY);
        let limit = filters.limit.unwrap_or(usize::MAX);
        let mut records = Vec::new();

        let first = filters.start_page.max(1);
        for page in first..first.saturating_add(filters.max_pages) {
            let url = self.page_url(category, page)?;
            debug!(url = %url, page, "Fetching listing page");

            let html = match self.get_page(&url).await {
                Ok(html) => html,
                Err(err) if records.is_empty() => return Err(err),
                Err(err) => {
                    warn!(url = %url, error = %err, "Page fetch failed; keeping earlier pages");
                    break;
                }
            };

            let page_records = parse_list_page(&html, &self.base_url, Utc::now());
            if page_records.is_empty() {
                info!(page, category, "No postings on page, stopping");
                break;
            }
            records.extend(page_records);
            if records.len() >= limit {
                records.truncate(limit);
                break;
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body><ul>
          <li class="job-item">
            <a href="/job/123.html"><h2 class="job-title">后端开发工程师</h2></a>
            <span class="company-name">  字节跳动 </span>
            <span class="date">2025-06-01</span>
            <span class="city">北京</span>
          </li>
          <li class="job-item">
            <a href="https://other.example/job/9"><h2>算法工程师</h2></a>
            <h3>美团</h3>
            <span class="publish-date">3天前</span>
          </li>
          <li class="job-item"><span class="date">今天</span></li>
        </ul></body></html>
    "#;

    fn base() -> Url {
        Url::parse(BASE_URL).unwrap()
    }

    #[test]
    fn test_parse_list_page_fields() {
        let records = parse_list_page(PAGE, &base(), Utc::now());
        assert_eq!(records.len(), 3);

        let first = &records[0];
        assert_eq!(first.get("company").and_then(|v| v.as_str()), Some("字节跳动"));
        assert_eq!(first.get("position").and_then(|v| v.as_str()), Some("后端开发工程师"));
        assert_eq!(
            first.get("url").and_then(|v| v.as_str()),
            Some("https://www.yingjiesheng.com/job/123.html")
        );
        assert_eq!(first.get("city").and_then(|v| v.as_str()), Some("北京"));

        let second = &records[1];
        assert_eq!(second.get("company").and_then(|v| v.as_str()), Some("美团"));
        assert_eq!(
            second.get("url").and_then(|v| v.as_str()),
            Some("https://other.example/job/9")
        );
        assert_eq!(second.get("publish_date").and_then(|v| v.as_str()), Some("3天前"));

        assert!(records[2].get("company").is_none());
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        assert!(parse_list_page("<html><body></body></html>", &base(), Utc::now()).is_empty());
    }

    #[test]
    fn test_page_urls() {
        let source = YingjieshengSource::new(&SourceSettings::default()).unwrap();
        assert_eq!(
            source.page_url("shixi", 2).unwrap().as_str(),
            "https://www.yingjiesheng.com/intern-00-00-0-0-0-0-0-0-0-2.html"
        );
        assert!(matches!(
            source.page_url("unknown", 1),
            Err(FetchError::Config(_))
        ));
    }
}
