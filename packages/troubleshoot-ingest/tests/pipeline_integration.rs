//! End-to-end runs of the pipeline against in-memory stores.
//!
//! Fetching is scripted with `MockFetcher`, so these tests exercise real
//! extraction rules, screening, filtering, persistence and querying without
//! network, model or database access.

use std::time::Duration;

use troubleshoot_ingest::stores::{MemoryRecordStore, MemoryVectorIndex};
use troubleshoot_ingest::testing::{MockClassifier, MockEmbedder, MockFetcher};
use troubleshoot_ingest::types::PageFailure;
use troubleshoot_ingest::{
    AuthError, DiscardReason, FetchRecords, IngestError, ItemOutcome, PersistConfig, Pipeline,
    QueryClient, QueryOptions, RawPage, RecordStore, RelevanceFilter, Stage, TargetConfig,
    VectorIndex,
};

const DIM: usize = 1536;

const TARGET: &str = r#"
name = "kb-fixture"
brand = "Control4"
start_urls = ["https://docs.example.com/kb"]

[rules]
item = "div.article"

[rules.url]
kind = "attr"
selector = "a"
name = "href"

[rules.issue]
kind = "text"
selector = "h3"

[rules.solution]
kind = "text"
selector = "p.fix"
"#;

fn target() -> TargetConfig {
    TargetConfig::from_toml(TARGET).unwrap()
}

fn fast() -> PersistConfig {
    PersistConfig::default().with_batch_pause(Duration::ZERO)
}

fn kb_page() -> RawPage {
    RawPage::new(
        "https://docs.example.com/kb",
        r#"<html><body>
            <div class="article">
              <a href="/kb/a">Open</a>
              <h3>Controller will not power on</h3>
              <p class="fix">Check the power supply and reseat the barrel connector.</p>
            </div>
            <div class="article">
              <a href="/kb/a"></a>
            </div>
            <div class="article">
              <a href="/kb/b">Open</a>
              <h3>Keypad LED blinking amber</h3>
              <p class="fix">Reset the keypad by holding the top button for fifteen seconds.</p>
            </div>
        </body></html>"#,
    )
}

#[tokio::test]
async fn test_run_dedups_persists_and_answers_queries() {
    let fetcher = MockFetcher::new().with_page(kb_page());
    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let report = Pipeline::new(&classifier, &embedder, &records, &index)
        .with_persist_config(fast())
        .run(&fetcher, &target())
        .await
        .unwrap();

    assert_eq!(report.pages_fetched, 1);
    assert_eq!(report.persisted(), 2);
    assert_eq!(report.discarded(DiscardReason::Empty), 1);
    assert_eq!(report.vectors_upserted, 2);
    assert_eq!(records.count().await.unwrap(), 2);
    assert_eq!(index.count().await.unwrap(), 2);

    let client = QueryClient::new(&embedder, &index, &records);
    let hits = client
        .query(
            "power",
            &QueryOptions::default().with_fetch_records(FetchRecords::Always),
        )
        .await
        .unwrap();

    assert!(!hits.is_empty());
    let top = &hits[0];
    assert_eq!(top.vector.metadata.url, "https://docs.example.com/kb/a");
    assert_eq!(top.vector.metadata.brand, "Control4");
    let record = top.record.as_ref().expect("record fetched");
    assert_eq!(record.issue, "Controller will not power on");
    assert!(top.full_solution().contains("power supply"));
}

#[tokio::test]
async fn test_rerun_writes_nothing_new() {
    let fetcher = MockFetcher::new().with_page(kb_page());
    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();
    let pipeline = Pipeline::new(&classifier, &embedder, &records, &index).with_persist_config(fast());

    let first = pipeline.run(&fetcher, &target()).await.unwrap();
    let second = pipeline.run(&fetcher, &target()).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(index.len(), 2);

    let id_of = |report: &troubleshoot_ingest::RunReport| match report
        .outcome_for("https://docs.example.com/kb/b")
    {
        Some(ItemOutcome::Persisted { record_id, vector_id }) => (*record_id, vector_id.clone()),
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert_eq!(id_of(&first), id_of(&second));
}

#[tokio::test]
async fn test_filter_drops_irrelevant_items() {
    let fetcher = MockFetcher::new().with_page(kb_page());
    let classifier = MockClassifier::new()
        .with_response_for("Keypad", "No")
        .with_default(" Yes ");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let report = Pipeline::new(&classifier, &embedder, &records, &index)
        .with_filter(RelevanceFilter::new("home automation"))
        .with_persist_config(fast())
        .run(&fetcher, &target())
        .await
        .unwrap();

    assert_eq!(report.persisted(), 1);
    assert_eq!(report.discarded(DiscardReason::NotRelevant), 1);
    assert_eq!(records.len(), 1);

    let (instruction, _) = &classifier.calls()[0];
    assert!(instruction.contains("Control4"));
    assert!(instruction.contains("home automation"));
}

#[tokio::test]
async fn test_classifier_failure_is_isolated() {
    let fetcher = MockFetcher::new().with_page(kb_page());
    let classifier = MockClassifier::new()
        .with_failure_for("Keypad")
        .with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let report = Pipeline::new(&classifier, &embedder, &records, &index)
        .with_persist_config(fast())
        .run(&fetcher, &target())
        .await
        .unwrap();

    assert_eq!(report.persisted(), 1);
    assert_eq!(report.failed_at(Stage::Classify), 1);
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn test_page_failures_do_not_abort_run() {
    let fetcher = MockFetcher::new()
        .with_page(kb_page())
        .with_failure(PageFailure::new("https://docs.example.com/kb?page=2", "HTTP 503"));
    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let report = Pipeline::new(&classifier, &embedder, &records, &index)
        .with_persist_config(fast())
        .run(&fetcher, &target())
        .await
        .unwrap();

    assert_eq!(report.page_failures.len(), 1);
    assert_eq!(report.persisted(), 2);
}

#[tokio::test]
async fn test_rule_mismatch_yields_no_items() {
    let fetcher = MockFetcher::new().with_page(RawPage::new(
        "https://docs.example.com/kb",
        "<html><body><p>Nothing here</p></body></html>",
    ));
    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let report = Pipeline::new(&classifier, &embedder, &records, &index)
        .run(&fetcher, &target())
        .await
        .unwrap();

    assert_eq!(report.items_extracted, 0);
    assert!(report.items.is_empty());
    assert!(classifier.calls().is_empty());
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_rejected_login_aborts_target() {
    let fetcher = MockFetcher::new().rejecting_login();
    let classifier = MockClassifier::new().with_default("yes");
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let err = Pipeline::new(&classifier, &embedder, &records, &index)
        .run(&fetcher, &target())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IngestError::Auth(AuthError::LoginRejected { .. })
    ));
    assert!(records.is_empty());
    assert_eq!(fetcher.calls(), vec!["kb-fixture".to_string()]);
}

#[tokio::test]
async fn test_bad_selector_fails_before_fetching() {
    let mut target = target();
    target.rules.item = "div[".to_string();
    let fetcher = MockFetcher::new().with_page(kb_page());
    let classifier = MockClassifier::new();
    let embedder = MockEmbedder::new(DIM);
    let records = MemoryRecordStore::new();
    let index = MemoryVectorIndex::new();

    let result = Pipeline::new(&classifier, &embedder, &records, &index)
        .run(&fetcher, &target)
        .await;

    assert!(matches!(result, Err(IngestError::Config(_))));
    assert!(fetcher.calls().is_empty());
}
