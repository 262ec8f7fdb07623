//! End-to-end tests for the orchestrated pipeline.
//!
//! Each test wires mock sources and a mock sink around a real state store
//! and checks the run summary, the sink traffic, and the stored state.

use chrono::{DateTime, TimeZone, Utc};
use jobsync::testing::{MockSink, MockSource, UnavailableStore};
use jobsync::{
    identify, snapshot_hash, IdentityKey, MemoryStateStore, Normalizer, Orchestrator,
    PipelineConfig, RawRecord, RetryPolicy, RunOutcome, SinkError, SourceRegistry, SourceStatus,
    SqliteStateStore, StandardNormalizer, StateStore, StateStoreError, SyncDecision,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fetched_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 2, 0, 0).unwrap()
}

/// A raw posting as a scraper would emit it.
fn posting(company: &str, position: &str, deadline: &str) -> RawRecord {
    RawRecord::new(fetched_at())
        .with_field("公司名称", company)
        .with_field("岗位", position)
        .with_field("发布日期", "2025-06-01")
        .with_field("截止日期", deadline)
        .with_field("工作城市", "北京、上海")
}

fn key_of(raw: &RawRecord) -> IdentityKey {
    identify(&StandardNormalizer::new().normalize(raw, "any").unwrap())
}

fn hash_of(raw: &RawRecord) -> String {
    snapshot_hash(&StandardNormalizer::new().normalize(raw, "any").unwrap())
}

fn config() -> PipelineConfig {
    PipelineConfig::default().with_retry(RetryPolicy::none())
}

fn orchestrator(sink: &Arc<MockSink>, store: Arc<dyn StateStore>) -> Orchestrator {
    Orchestrator::new(sink.clone(), store, config())
}

#[tokio::test]
async fn test_second_identical_run_writes_nothing() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let orchestrator = orchestrator(&sink, store.clone());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_records(vec![
            posting("字节跳动", "后端开发工程师", "2025-09-01"),
            posting("腾讯", "产品经理", "2025-08-01"),
        ]))
        .unwrap();

    let first = orchestrator.run(&registry).await.unwrap();
    assert_eq!(first.totals().inserted, 2);
    let calls_after_first = sink.call_count();

    let second = orchestrator.run(&registry).await.unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert_eq!(second.totals().inserted, 0);
    assert_eq!(second.totals().updated, 0);
    assert_eq!(second.totals().skipped, 2);
    assert_eq!(sink.call_count(), calls_after_first);
    assert_eq!(store.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_one_failing_source_does_not_stop_the_others() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_record(posting("美团", "算法工程师", "2025-09-01")))
        .unwrap()
        .with(MockSource::new("broken").failing("site layout changed"))
        .unwrap()
        .with(MockSource::new("c").with_record(posting("京东", "测试工程师", "2025-09-01")))
        .unwrap();

    let summary = orchestrator(&sink, store).run(&registry).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.sources_succeeded(), 2);
    assert_eq!(summary.sources_failed(), 1);
    assert_eq!(summary.totals().inserted, 2);

    let broken = summary.source("broken").unwrap();
    assert_eq!(broken.status, SourceStatus::FetchFailed);
    assert!(broken.error.as_deref().unwrap().contains("site layout changed"));
    assert_eq!(broken.fetched, 0);
}

#[tokio::test]
async fn test_panicking_source_is_a_fetch_failure() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("crashy").panicking())
        .unwrap()
        .with(MockSource::new("ok").with_record(posting("百度", "产品经理", "2025-09-01")))
        .unwrap();

    let summary = orchestrator(&sink, store).run(&registry).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Completed);
    let crashy = summary.source("crashy").unwrap();
    assert_eq!(crashy.status, SourceStatus::FetchFailed);
    assert!(crashy.error.as_deref().unwrap().contains("fetch task failed"));
    assert_eq!(summary.source("ok").unwrap().status, SourceStatus::Succeeded);
    assert_eq!(summary.totals().inserted, 1);
}

#[tokio::test]
async fn test_run_future_is_send() {
    fn assert_send<T: Send>(_: &T) {}

    let sink = Arc::new(MockSink::new());
    let orchestrator = orchestrator(&sink, Arc::new(MemoryStateStore::new()));
    let registry = SourceRegistry::new();
    let cancel = CancellationToken::new();

    let run = orchestrator.run_until_cancelled(&registry, &cancel);
    assert_send(&run);
    run.await.unwrap();
}

#[tokio::test]
async fn test_changed_deadline_updates_only_after_confirmed_write() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let orchestrator = orchestrator(&sink, store.clone());

    let original = posting("字节跳动", "后端开发工程师", "2025-09-01");
    let extended = posting("字节跳动", "后端开发工程师", "2025-09-15");
    let key = key_of(&original);
    assert_eq!(key, key_of(&extended));

    let run = |raw: RawRecord| SourceRegistry::new().with(MockSource::new("a").with_record(raw)).unwrap();

    orchestrator.run(&run(original.clone())).await.unwrap();
    let stored = store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored.field_snapshot_hash, hash_of(&original));

    // The update fails: the old snapshot stays.
    sink.fail_key(&key, SinkError::SchemaMismatch("截止时间 rejected".into()));
    let failed = orchestrator.run(&run(extended.clone())).await.unwrap();
    assert_eq!(failed.totals().failed, 1);
    assert_eq!(
        store.get(&key).await.unwrap().unwrap().field_snapshot_hash,
        hash_of(&original)
    );

    // Next run sees the same change and writes it.
    sink.heal_key(&key);
    let healed = orchestrator.run(&run(extended.clone())).await.unwrap();
    assert_eq!(healed.totals().updated, 1);

    let entry = store.get(&key).await.unwrap().unwrap();
    assert_eq!(entry.field_snapshot_hash, hash_of(&extended));
    assert_eq!(entry.first_seen_at, stored.first_seen_at);
    assert_eq!(entry.remote_id, stored.remote_id);

    let last = sink.writes().pop().unwrap();
    assert_eq!(last.decision, SyncDecision::Update);
    assert_eq!(last.remote_id, stored.remote_id);
}

#[tokio::test]
async fn test_record_without_company_is_rejected_and_counted() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let nameless = RawRecord::new(fetched_at())
        .with_field("岗位", "数据分析师")
        .with_field("发布日期", "2025-06-01");
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_records(vec![
            nameless,
            posting("网易", "游戏策划", "2025-09-01"),
        ]))
        .unwrap();

    let summary = orchestrator(&sink, store.clone()).run(&registry).await.unwrap();

    let source = summary.source("a").unwrap();
    assert_eq!(source.fetched, 2);
    assert_eq!(source.rejected, 1);
    assert_eq!(source.inserted, 1);
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(sink.writes()[0].record.company, "网易");
    assert_eq!(store.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_record_in_batch_fails_alone() {
    let sink = Arc::new(MockSink::new().with_all_or_nothing_batches());
    let store = Arc::new(MemoryStateStore::new());
    let records: Vec<RawRecord> = (1..=5)
        .map(|i| posting(&format!("公司{i}"), "后端开发工程师", "2025-09-01"))
        .collect();
    let bad = key_of(&records[2]);
    sink.fail_key(&bad, SinkError::SchemaMismatch("unknown option".into()));

    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_records(records.clone()))
        .unwrap();
    let summary = orchestrator(&sink, store.clone()).run(&registry).await.unwrap();

    let totals = summary.totals();
    assert_eq!(totals.inserted, 4);
    assert_eq!(totals.failed, 1);
    assert!(store.get(&bad).await.unwrap().is_none());
    for (i, raw) in records.iter().enumerate() {
        let stored = store.get(&key_of(raw)).await.unwrap();
        assert_eq!(stored.is_some(), i != 2, "record {}", i + 1);
    }
}

#[tokio::test]
async fn test_later_source_wins_for_shared_posting() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let from_a = posting("小米", "嵌入式工程师", "2025-09-01").with_field("行业", "制造业");
    let from_b = posting("小米", "嵌入式工程师", "2025-09-01").with_field("行业", "互联网");
    let key = key_of(&from_a);

    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_record(from_a))
        .unwrap()
        .with(MockSource::new("b").with_record(from_b.clone()))
        .unwrap();
    let summary = orchestrator(&sink, store.clone()).run(&registry).await.unwrap();

    assert_eq!(summary.source("a").unwrap().inserted, 1);
    assert_eq!(summary.source("b").unwrap().updated, 1);

    let last = sink.writes().pop().unwrap();
    assert_eq!(last.record.source_name, "b");
    assert_eq!(last.record.industry.as_deref(), Some("互联网"));
    assert_eq!(
        store.get(&key).await.unwrap().unwrap().field_snapshot_hash,
        hash_of(&from_b)
    );
}

#[tokio::test]
async fn test_duplicates_within_one_source_collapse() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_records(vec![
            posting("快手", "前端开发工程师", "2025-09-01"),
            posting("快手", "前端开发工程师", "2025-09-20"),
        ]))
        .unwrap();

    let summary = orchestrator(&sink, store).run(&registry).await.unwrap();

    let source = summary.source("a").unwrap();
    assert_eq!(source.inserted, 1);
    assert_eq!(source.skipped, 1);
    assert_eq!(sink.writes().len(), 1);
    assert_eq!(
        sink.writes()[0].record.deadline.map(|d| d.to_string()).as_deref(),
        Some("2025-09-20")
    );
}

#[tokio::test]
async fn test_deadline_marks_unfinished_sources_timed_out() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("fast").with_record(posting("百度", "算法工程师", "2025-09-01")))
        .unwrap()
        .with(
            MockSource::new("slow")
                .with_record(posting("滴滴出行", "数据分析师", "2025-09-01"))
                .with_delay(Duration::from_secs(30)),
        )
        .unwrap();

    let orchestrator = Orchestrator::new(
        sink.clone(),
        store,
        config().with_run_timeout(Duration::from_millis(200)),
    );
    let summary = orchestrator.run(&registry).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Partial);
    assert_eq!(summary.source("fast").unwrap().status, SourceStatus::Succeeded);
    assert_eq!(summary.source("slow").unwrap().status, SourceStatus::TimedOut);
    assert_eq!(summary.totals().inserted, 1);
    assert!(summary.duration() < chrono::Duration::seconds(10));
}

#[tokio::test]
async fn test_cancelled_run_reports_partial() {
    let sink = Arc::new(MockSink::new());
    let store = Arc::new(MemoryStateStore::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_record(posting("华为", "硬件工程师", "2025-09-01")))
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let summary = orchestrator(&sink, store)
        .run_until_cancelled(&registry, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.outcome, RunOutcome::Partial);
    assert_eq!(summary.source("a").unwrap().status, SourceStatus::Cancelled);
    assert_eq!(sink.call_count(), 0);
}

#[tokio::test]
async fn test_stop_file_halts_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let stop_file = dir.path().join("STOP_CRAWLING.txt");
    std::fs::write(&stop_file, "maintenance").unwrap();

    let sink = Arc::new(MockSink::new());
    let source = Arc::new(MockSource::new("a").with_record(posting("拼多多", "运营", "2025-09-01")));
    let mut registry = SourceRegistry::new();
    registry.register(source.clone()).unwrap();

    let orchestrator = Orchestrator::new(
        sink.clone(),
        Arc::new(MemoryStateStore::new()),
        config().with_stop_file(&stop_file),
    );
    let summary = orchestrator.run(&registry).await.unwrap();

    assert_eq!(summary.outcome, RunOutcome::Halted);
    assert_eq!(summary.source("a").unwrap().status, SourceStatus::NotRun);
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(sink.call_count(), 0);
    assert!(orchestrator.status().last_success_at().await.is_none());
}

#[tokio::test]
async fn test_unavailable_store_is_fatal_and_writes_nothing() {
    let sink = Arc::new(MockSink::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_record(posting("蚂蚁集团", "风控策略", "2025-09-01")))
        .unwrap();
    let orchestrator = Orchestrator::new(sink.clone(), Arc::new(UnavailableStore), config());

    let err = orchestrator.run(&registry).await.unwrap_err();

    assert!(matches!(err, StateStoreError::Unavailable(_)));
    assert_eq!(sink.call_count(), 0);
    let status = orchestrator.status().snapshot().await;
    assert!(!status.is_healthy());
    assert!(!status.running);
    assert!(status.last_summary.is_none());
}

#[tokio::test]
async fn test_status_tracks_last_success() {
    let sink = Arc::new(MockSink::new());
    let orchestrator = orchestrator(&sink, Arc::new(MemoryStateStore::new()));
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_record(posting("哔哩哔哩", "视频编辑", "2025-09-01")))
        .unwrap();

    let summary = orchestrator.run(&registry).await.unwrap();

    let status = orchestrator.status().snapshot().await;
    assert!(status.is_healthy());
    assert_eq!(status.runs_started, 1);
    assert_eq!(status.last_success_at, Some(summary.finished_at));
    assert_eq!(status.last_summary.as_ref().map(|s| s.run_id), Some(summary.run_id));
}

#[tokio::test]
async fn test_sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("cache.db").display());
    let sink = Arc::new(MockSink::new());
    let registry = SourceRegistry::new()
        .with(MockSource::new("a").with_records(vec![
            posting("小红书", "社区运营", "2025-09-01"),
            posting("阿里巴巴", "Java开发", "2025-09-01"),
        ]))
        .unwrap();

    {
        let store = Arc::new(SqliteStateStore::open(&url).await.unwrap());
        let first = orchestrator(&sink, store.clone()).run(&registry).await.unwrap();
        assert_eq!(first.totals().inserted, 2);
        store.close().await;
    }

    let store = Arc::new(SqliteStateStore::open(&url).await.unwrap());
    let second = orchestrator(&sink, store).run(&registry).await.unwrap();
    assert_eq!(second.totals().skipped, 2);
    assert_eq!(second.totals().written(), 0);
}
