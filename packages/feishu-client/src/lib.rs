//! Pure Feishu (Lark) Bitable REST API client.
//!
//! A minimal client for one Bitable table: tenant token handling, field
//! listing, paginated record listing, and batch create/update.
//!
//! # Example
//!
//! ```rust,ignore
//! use feishu_client::{FeishuClient, FeishuConfig};
//!
//! let client = FeishuClient::new(FeishuConfig::new(app_id, app_secret, app_token, table_id))?;
//!
//! for field in client.list_fields().await? {
//!     println!("{} ({})", field.field_name, field.field_type);
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{FeishuError, Result};
pub use types::{Field, NewRecord, Record, RecordUpdate};

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use types::{ApiResponse, BatchRequest, BatchResponse, Page, TokenRequest, TokenResponse};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// Batch endpoints accept at most this many records per call.
pub const MAX_BATCH_SIZE: usize = 500;

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7200;

/// Credentials and target table.
#[derive(Debug)]
pub struct FeishuConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    pub app_token: String,
    pub table_id: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl FeishuConfig {
    pub fn new(
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        app_token: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: SecretString::from(app_secret.into()),
            app_token: app_token.into(),
            table_id: table_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Set a custom base URL (Lark international, proxies, test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client for a single Bitable table.
pub struct FeishuClient {
    http: reqwest::Client,
    config: FeishuConfig,
    token: RwLock<Option<CachedToken>>,
}

impl FeishuClient {
    pub fn new(config: FeishuConfig) -> Result<Self> {
        if config.app_id.is_empty() || config.app_secret.expose_secret().is_empty() {
            return Err(FeishuError::Config("app id and app secret are required".into()));
        }
        if config.app_token.is_empty() || config.table_id.is_empty() {
            return Err(FeishuError::Config("app token and table id are required".into()));
        }
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    pub fn app_token(&self) -> &str {
        &self.config.app_token
    }

    pub fn table_id(&self) -> &str {
        &self.config.table_id
    }

    /// Current tenant access token, fetching a new one when the cached token
    /// is missing or about to expire.
    pub async fn tenant_access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        if let Some(token) = slot.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/auth/v3/tenant_access_token/internal", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&TokenRequest {
                app_id: &self.config.app_id,
                app_secret: self.config.app_secret.expose_secret(),
            })
            .send()
            .await?;
        let resp = check_status(resp).await?;
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| FeishuError::Parse(e.to_string()))?;

        if body.code != 0 {
            return Err(FeishuError::Api {
                code: body.code,
                msg: body.msg,
            });
        }
        let value = body
            .tenant_access_token
            .ok_or_else(|| FeishuError::Parse("token response without tenant_access_token".into()))?;
        let lifetime = Duration::from_secs(body.expire.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));

        info!(expires_in = ?lifetime, "Obtained tenant access token");
        *slot = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        });
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    fn table_url(&self, suffix: &str) -> String {
        format!(
            "{}/bitable/v1/apps/{}/tables/{}/{}",
            self.config.base_url, self.config.app_token, self.config.table_id, suffix
        )
    }

    /// Send an authenticated request and unwrap the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        build: impl FnOnce(&reqwest::Client) -> RequestBuilder,
    ) -> Result<T> {
        let token = self.tenant_access_token().await?;
        let resp = build(&self.http).bearer_auth(token).send().await?;

        let result = async {
            let resp = check_status(resp).await?;
            let envelope: ApiResponse<T> = resp
                .json()
                .await
                .map_err(|e| FeishuError::Parse(e.to_string()))?;
            if envelope.code != 0 {
                return Err(FeishuError::Api {
                    code: envelope.code,
                    msg: envelope.msg,
                });
            }
            envelope
                .data
                .ok_or_else(|| FeishuError::Parse("response without data".into()))
        }
        .await;

        if let Err(err) = &result {
            if err.invalidates_token() {
                debug!(error = %err, "Token rejected, clearing cache");
                self.invalidate_token().await;
            }
        }
        result
    }

    /// All columns of the table.
    pub async fn list_fields(&self) -> Result<Vec<Field>> {
        let url = self.table_url("fields");
        self.paginate(&url, 100).await
    }

    /// All rows of the table, following pagination.
    pub async fn list_records(&self) -> Result<Vec<Record>> {
        let url = self.table_url("records");
        let records = self.paginate(&url, MAX_BATCH_SIZE).await?;
        info!(count = records.len(), "Fetched table records");
        Ok(records)
    }

    async fn paginate<T: DeserializeOwned>(&self, url: &str, page_size: usize) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: Page<T> = self
                .send(|http| {
                    let mut req = http
                        .request(Method::GET, url)
                        .query(&[("page_size", page_size.to_string())]);
                    if let Some(token) = &page_token {
                        req = req.query(&[("page_token", token)]);
                    }
                    req
                })
                .await?;

            items.extend(page.items);
            match page.page_token {
                Some(token) if page.has_more && !token.is_empty() => {
                    debug!(fetched = items.len(), "Fetching next page");
                    page_token = Some(token);
                }
                _ => return Ok(items),
            }
        }
    }

    /// Create rows. Returns the created records in input order.
    pub async fn batch_create_records(&self, records: &[NewRecord]) -> Result<Vec<Record>> {
        check_batch(records.len())?;
        let url = self.table_url("records/batch_create");
        let resp: BatchResponse = self
            .send(|http| http.post(&url).json(&BatchRequest { records }))
            .await?;
        debug!(requested = records.len(), created = resp.records.len(), "Batch create");
        Ok(resp.records)
    }

    /// Update rows by record id. Returns the updated records in input order.
    pub async fn batch_update_records(&self, updates: &[RecordUpdate]) -> Result<Vec<Record>> {
        check_batch(updates.len())?;
        let url = self.table_url("records/batch_update");
        let resp: BatchResponse = self
            .send(|http| http.post(&url).json(&BatchRequest { records: updates }))
            .await?;
        debug!(requested = updates.len(), updated = resp.records.len(), "Batch update");
        Ok(resp.records)
    }
}

fn check_batch(len: usize) -> Result<()> {
    if len > MAX_BATCH_SIZE {
        return Err(FeishuError::Config(format!(
            "batch of {len} exceeds the limit of {MAX_BATCH_SIZE}"
        )));
    }
    Ok(())
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = ["x-ogw-ratelimit-reset", "retry-after"]
            .iter()
            .find_map(|name| resp.headers().get(*name)?.to_str().ok()?.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(FeishuError::RateLimited { retry_after });
    }
    let body = resp.text().await.unwrap_or_default();
    // Bitable reports most request errors as 4xx with a coded envelope.
    if let Ok(envelope) = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
        if envelope.code != 0 {
            return Err(FeishuError::Api {
                code: envelope.code,
                msg: envelope.msg,
            });
        }
    }
    Err(FeishuError::Status {
        status: status.as_u16(),
        body,
    })
}
