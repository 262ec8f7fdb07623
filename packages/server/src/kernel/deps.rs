//! Pipeline dependencies built from configuration.
//!
//! ```text
//! Config ──► SourceRegistry (ENABLED_SOURCES, in order)
//!        ──► SqliteStateStore (STATE_DATABASE_URL)
//!        ──► FeishuClient ──► BitableSink
//!                                 └─► Orchestrator ◄── StatusHandle ◄── /health
//! ```

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use feishu_client::{FeishuClient, FeishuConfig};
use jobsync::{
    BitableSink, MemoryStateStore, Orchestrator, Sink, SinkResult, SinkWrite, SourceRegistry,
    SqliteStateStore, StateStore, StatusHandle, WriteOutcome, WriteReceipt,
};
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, FeishuSettings};

/// Everything a run needs, shared between the CLI, the scheduler and the
/// health endpoint.
#[derive(Clone)]
pub struct PipelineDeps {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: Arc<SourceRegistry>,
    pub store: Arc<dyn StateStore>,
    pub status: StatusHandle,
}

impl PipelineDeps {
    /// Production wiring: SQLite state and the Feishu table.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Arc::new(create_feishu_client(config.require_feishu()?)?);
        let store = open_state_store(&config.state_database_url).await?;
        Self::build(config, Arc::new(BitableSink::new(client)), store)
    }

    /// Dry run: fresh in-memory state, writes logged and dropped.
    pub fn dry_run(config: &Config) -> Result<Self> {
        Self::build(
            config,
            Arc::new(DryRunSink),
            Arc::new(MemoryStateStore::new()),
        )
    }

    pub fn build(config: &Config, sink: Arc<dyn Sink>, store: Arc<dyn StateStore>) -> Result<Self> {
        let registry =
            SourceRegistry::from_names(&config.enabled_sources, &config.source_settings())
                .context("Failed to build source registry")?;
        if registry.is_empty() {
            bail!("no sources enabled: set ENABLED_SOURCES");
        }

        let status = StatusHandle::new();
        let orchestrator = Orchestrator::new(sink.clone(), store.clone(), config.pipeline())
            .with_status(status.clone());

        info!(sink = sink.name(), sources = ?registry.names(), "Pipeline ready");

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            registry: Arc::new(registry),
            store,
            status,
        })
    }
}

pub fn create_feishu_client(settings: &FeishuSettings) -> Result<FeishuClient> {
    let config = FeishuConfig::new(
        &settings.app_id,
        &settings.app_secret,
        &settings.app_token,
        &settings.table_id,
    )
    .with_base_url(&settings.base_url);

    FeishuClient::new(config).context("Failed to create Feishu client")
}

pub async fn open_state_store(database_url: &str) -> Result<Arc<SqliteStateStore>> {
    let store = SqliteStateStore::open(database_url)
        .await
        .with_context(|| format!("Failed to open state store at {database_url}"))?;
    Ok(Arc::new(store))
}

/// Sink that logs each write instead of sending it.
pub struct DryRunSink;

#[async_trait]
impl Sink for DryRunSink {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn max_batch_size(&self) -> usize {
        feishu_client::MAX_BATCH_SIZE
    }

    async fn write(&self, batch: &[SinkWrite]) -> SinkResult<Vec<WriteOutcome>> {
        for write in batch {
            info!(
                decision = write.decision.as_str(),
                key = write.key.short(),
                company = %write.record.company,
                position = %write.record.position,
                "Dry run: would write"
            );
        }
        Ok(batch.iter().map(|_| Ok(WriteReceipt::default())).collect())
    }
}
