//! The linear pipeline: fetch → extract → filter → persist.

use std::path::PathBuf;
use tracing::{info, warn};

use super::filter::RelevanceFilter;
use super::persist::{PersistConfig, Persister};
use crate::error::Result;
use crate::extract::{Extraction, Extractor};
use crate::traits::{Classifier, Embedder, Fetcher, RecordStore, VectorIndex};
use crate::types::{ItemOutcome, RunReport, ScrapedItem, TargetConfig};

/// Fetched and extracted items, before filtering.
#[derive(Debug)]
pub struct ScrapeOutput {
    pub report: RunReport,
    pub items: Vec<ScrapedItem>,
}

/// Fetch a target and extract its items. Needs no model or store access.
pub async fn scrape_target<F>(
    fetcher: &F,
    target: &TargetConfig,
    discard_log: Option<&PathBuf>,
) -> Result<ScrapeOutput>
where
    F: Fetcher + ?Sized,
{
    // Compile rules first so a bad selector fails before any request.
    let mut extractor = Extractor::new(&target.rules)?;
    if let Some(path) = discard_log {
        extractor = extractor.with_discard_log(path.clone());
    }

    let mut report = RunReport::new(&target.name);
    let fetched = fetcher.fetch_target(target).await?;
    report.pages_fetched = fetched.pages.len();
    report.page_failures = fetched.failures;

    let extraction = extractor.extract_all(&fetched.pages);
    Ok(ScrapeOutput {
        items: record_extraction(&mut report, extraction),
        report,
    })
}

fn record_extraction(report: &mut RunReport, extraction: Extraction) -> Vec<ScrapedItem> {
    report.items_extracted = extraction.matched;
    for (url, reason) in extraction.discarded {
        report.record(url, ItemOutcome::discarded(reason));
    }
    extraction.items
}

/// One target's result within a multi-target run.
#[derive(Debug)]
pub struct TargetRun {
    pub target: String,
    pub result: Result<RunReport>,
}

impl TargetRun {
    pub fn report(&self) -> Option<&RunReport> {
        self.result.as_ref().ok()
    }
}

/// Services the pipeline writes through, injected once per process.
pub struct Pipeline<'a, C: ?Sized, E: ?Sized, R: ?Sized, V: ?Sized> {
    classifier: &'a C,
    embedder: &'a E,
    records: &'a R,
    index: &'a V,
    filter: RelevanceFilter,
    persister: Persister,
    discard_log: Option<PathBuf>,
}

impl<'a, C, E, R, V> Pipeline<'a, C, E, R, V>
where
    C: Classifier + ?Sized,
    E: Embedder + ?Sized,
    R: RecordStore + ?Sized,
    V: VectorIndex + ?Sized,
{
    pub fn new(classifier: &'a C, embedder: &'a E, records: &'a R, index: &'a V) -> Self {
        Self {
            classifier,
            embedder,
            records,
            index,
            filter: RelevanceFilter::default(),
            persister: Persister::default(),
            discard_log: None,
        }
    }

    pub fn with_filter(mut self, filter: RelevanceFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_persist_config(mut self, config: PersistConfig) -> Self {
        self.persister = Persister::new(config);
        self
    }

    pub fn with_discard_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.discard_log = Some(path.into());
        self
    }

    /// Full run for one target. Only target-wide failures (bad rules,
    /// missing credentials, rejected login) return `Err`; everything else
    /// lands in the report.
    pub async fn run<F>(&self, fetcher: &F, target: &TargetConfig) -> Result<RunReport>
    where
        F: Fetcher + ?Sized,
    {
        info!(target = %target.name, brand = %target.brand, "Starting run");
        let ScrapeOutput { mut report, items } =
            scrape_target(fetcher, target, self.discard_log.as_ref()).await?;

        self.filter_and_persist(&mut report, &target.brand, items).await;
        report.finish();
        info!("{}", report.summary());
        Ok(report)
    }

    /// Run several targets in order. A target-wide failure such as an
    /// unreachable or rejected login skips only that target; a fatal error
    /// (see [`crate::IngestError::is_fatal`]) stops the remaining ones.
    pub async fn run_all(&self, runs: &[(&TargetConfig, &dyn Fetcher)]) -> Result<Vec<TargetRun>> {
        let mut done = Vec::with_capacity(runs.len());
        for &(target, fetcher) in runs {
            let result = match self.run(fetcher, target).await {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(target = %target.name, error = %e, "Target failed, skipping");
                    Err(e)
                }
                Ok(report) => Ok(report),
            };
            done.push(TargetRun {
                target: target.name.clone(),
                result,
            });
        }
        Ok(done)
    }

    /// Run already-scraped items (e.g. from a file) through screening, the
    /// filter, and persistence.
    pub async fn load(&self, name: &str, brand: &str, items: Vec<ScrapedItem>) -> RunReport {
        let mut extractor = Extractor::screen_only();
        if let Some(path) = &self.discard_log {
            extractor = extractor.with_discard_log(path.clone());
        }

        let mut report = RunReport::new(name);
        let extraction = extractor.screen_items(items);
        let items = record_extraction(&mut report, extraction);

        self.filter_and_persist(&mut report, brand, items).await;
        report.finish();
        info!("{}", report.summary());
        report
    }

    async fn filter_and_persist(&self, report: &mut RunReport, brand: &str, items: Vec<ScrapedItem>) {
        let filtered = self.filter.filter(self.classifier, brand, items).await;
        for (url, outcome) in filtered.dropped {
            report.record(url, outcome);
        }

        let persisted = self
            .persister
            .persist(self.records, self.embedder, self.index, brand, filtered.kept)
            .await;
        report.vectors_upserted = persisted.vectors_upserted;
        for (url, outcome) in persisted.outcomes {
            report.record(url, outcome);
        }
    }
}
