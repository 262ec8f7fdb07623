use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use jobsync::{PipelineConfig, RetryPolicy, SourceSettings};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Feishu credentials and target table
#[derive(Clone)]
pub struct FeishuSettings {
    pub app_id: String,
    pub app_secret: String,
    pub app_token: String,
    pub table_id: String,
    pub base_url: String,
}

impl fmt::Debug for FeishuSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeishuSettings")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("app_token", &self.app_token)
            .field("table_id", &self.table_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when no Feishu variable is set at all
    pub feishu: Option<FeishuSettings>,
    pub state_database_url: String,
    pub schedule_cron: String,
    /// `None` disables the run deadline (`RUN_TIMEOUT_SECS=0`)
    pub run_timeout: Option<Duration>,
    pub fetch_concurrency: usize,
    pub chunk_size: usize,
    pub sink_max_retries: u32,
    pub stop_file: PathBuf,
    pub health_port: u16,
    pub enabled_sources: Vec<String>,
    pub request_delay: Duration,
}

const FEISHU_VARS: [&str; 4] = [
    "FEISHU_APP_ID",
    "FEISHU_APP_SECRET",
    "FEISHU_APP_TOKEN",
    "FEISHU_TABLE_ID",
];

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let run_timeout_secs: u64 = parse_or(&var, "RUN_TIMEOUT_SECS", 1800)?;

        Ok(Self {
            feishu: feishu_settings(&var)?,
            state_database_url: var("STATE_DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/cache.db".to_string()),
            schedule_cron: var("SCHEDULE_CRON")
                .unwrap_or_else(|| "0 0 6,9,12,15,18,21 * * *".to_string()),
            run_timeout: (run_timeout_secs > 0).then(|| Duration::from_secs(run_timeout_secs)),
            fetch_concurrency: parse_or(&var, "FETCH_CONCURRENCY", 4)?,
            chunk_size: parse_or(&var, "CHUNK_SIZE", 100)?,
            sink_max_retries: parse_or(&var, "SINK_MAX_RETRIES", 3)?,
            stop_file: var("STOP_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("STOP_CRAWLING.txt")),
            health_port: parse_or(&var, "HEALTH_PORT", 8080)?,
            enabled_sources: var("ENABLED_SOURCES")
                .unwrap_or_else(|| "yingjiesheng".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            request_delay: Duration::from_millis(parse_or(&var, "REQUEST_DELAY_MS", 2000)?),
        })
    }

    /// Feishu settings, or an error naming what to set.
    pub fn require_feishu(&self) -> Result<&FeishuSettings> {
        self.feishu
            .as_ref()
            .context("Feishu is not configured: set FEISHU_APP_ID, FEISHU_APP_SECRET, FEISHU_APP_TOKEN and FEISHU_TABLE_ID")
    }

    pub fn pipeline(&self) -> PipelineConfig {
        let config = PipelineConfig::default()
            .with_chunk_size(self.chunk_size)
            .with_fetch_concurrency(self.fetch_concurrency)
            .with_retry(RetryPolicy::default().with_max_retries(self.sink_max_retries))
            .with_stop_file(&self.stop_file);
        match self.run_timeout {
            Some(timeout) => config.with_run_timeout(timeout),
            None => config.without_run_timeout(),
        }
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings::default().with_request_delay(self.request_delay)
    }
}

fn feishu_settings(var: &impl Fn(&str) -> Option<String>) -> Result<Option<FeishuSettings>> {
    let values: Vec<Option<String>> = FEISHU_VARS.iter().map(|&k| var(k)).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }

    let missing: Vec<&str> = FEISHU_VARS
        .iter()
        .zip(&values)
        .filter(|(_, v)| v.is_none())
        .map(|(k, _)| *k)
        .collect();
    if !missing.is_empty() {
        bail!("incomplete Feishu configuration, missing: {}", missing.join(", "));
    }

    let mut values = values.into_iter().flatten();
    let mut next = || values.next().unwrap_or_default();
    Ok(Some(FeishuSettings {
        app_id: next(),
        app_secret: next(),
        app_token: next(),
        table_id: next(),
        base_url: var("FEISHU_API_BASE_URL")
            .unwrap_or_else(|| feishu_client::DEFAULT_BASE_URL.to_string()),
    }))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {value:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert!(config.feishu.is_none());
        assert_eq!(config.state_database_url, "sqlite://data/cache.db");
        assert_eq!(config.schedule_cron, "0 0 6,9,12,15,18,21 * * *");
        assert_eq!(config.run_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.enabled_sources, vec!["yingjiesheng"]);
        assert_eq!(config.health_port, 8080);
        assert!(config.require_feishu().is_err());
    }

    #[test]
    fn test_partial_feishu_config_is_an_error() {
        let err = config(&[("FEISHU_APP_ID", "cli_x"), ("FEISHU_TABLE_ID", "tbl")]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("FEISHU_APP_SECRET"));
        assert!(message.contains("FEISHU_APP_TOKEN"));
    }

    #[test]
    fn test_full_feishu_config() {
        let config = config(&[
            ("FEISHU_APP_ID", "cli_x"),
            ("FEISHU_APP_SECRET", "s3cret"),
            ("FEISHU_APP_TOKEN", "bascn"),
            ("FEISHU_TABLE_ID", "tbl"),
            ("ENABLED_SOURCES", "demo, file:jobs.json ,"),
            ("RUN_TIMEOUT_SECS", "0"),
        ])
        .unwrap();

        let feishu = config.require_feishu().unwrap();
        assert_eq!(feishu.app_token, "bascn");
        assert_eq!(feishu.base_url, "https://open.feishu.cn/open-apis");
        assert_eq!(config.enabled_sources, vec!["demo", "file:jobs.json"]);
        assert_eq!(config.run_timeout, None);
        assert_eq!(config.pipeline().run_timeout, None);
    }

    #[test]
    fn test_bad_number() {
        let err = config(&[("CHUNK_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CHUNK_SIZE"));
    }
}
