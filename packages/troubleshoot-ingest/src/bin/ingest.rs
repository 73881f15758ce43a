use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use troubleshoot_ingest::ai::OpenAIService;
use troubleshoot_ingest::stores::{PineconeVectorIndex, PostgresRecordStore};
use troubleshoot_ingest::{
    load_items, scrape_target, write_items_jsonl, FetchRecords, Fetcher, HttpFetcher, Pipeline,
    QueryClient, QueryOptions, RelevanceFilter, RunReport, Settings, TargetConfig,
};

#[derive(Parser)]
#[command(name = "ingest", about = "Scrape, filter and load troubleshooting documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, extract, filter and persist one or more targets
    Run {
        /// Target definition file (repeatable)
        #[arg(long = "target", required = true)]
        targets: Vec<PathBuf>,

        /// Keep every item without asking the classifier
        #[arg(long)]
        no_filter: bool,

        /// Print run reports as JSON
        #[arg(long)]
        json: bool,

        /// Append discarded empty items to this JSON-lines file
        #[arg(long)]
        discard_log: Option<PathBuf>,
    },

    /// Fetch and extract only, writing items as JSON lines
    Scrape {
        #[arg(long)]
        target: PathBuf,

        #[arg(long)]
        output: PathBuf,

        #[arg(long)]
        discard_log: Option<PathBuf>,
    },

    /// Filter and persist items from a JSON or JSON-lines file
    Load {
        file: PathBuf,

        /// Brand tag stored with every item
        #[arg(long)]
        brand: String,

        #[arg(long)]
        no_filter: bool,

        #[arg(long)]
        json: bool,
    },

    /// Semantic lookup against the loaded documents
    Query {
        text: String,

        #[arg(long, default_value_t = 2)]
        top_k: usize,

        /// Always fetch the full record, not just for truncated matches
        #[arg(long)]
        full_text: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,troubleshoot_ingest=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            targets,
            no_filter,
            json,
            discard_log,
        } => run(targets, no_filter, json, discard_log).await,
        Command::Scrape {
            target,
            output,
            discard_log,
        } => scrape(target, output, discard_log).await,
        Command::Load {
            file,
            brand,
            no_filter,
            json,
        } => load(file, brand, no_filter, json).await,
        Command::Query {
            text,
            top_k,
            full_text,
        } => query(text, top_k, full_text).await,
    }
}

/// Connected services shared by every subcommand that writes or reads.
struct Services {
    settings: Settings,
    ai: OpenAIService,
    records: PostgresRecordStore,
    index: PineconeVectorIndex,
}

impl Services {
    async fn connect() -> Result<Self> {
        let settings = Settings::from_env().context("Failed to load settings")?;
        let ai = OpenAIService::from_settings(&settings);
        let records = PostgresRecordStore::connect(settings.database_url.expose())
            .await
            .context("Failed to connect to the record store")?;
        let index = PineconeVectorIndex::connect(&settings)
            .await
            .context("Failed to open the vector index")?;
        Ok(Self {
            settings,
            ai,
            records,
            index,
        })
    }

    fn filter(&self, no_filter: bool) -> RelevanceFilter {
        if no_filter {
            RelevanceFilter::disabled()
        } else {
            RelevanceFilter::new(&self.settings.relevance_topic)
        }
    }
}

fn load_target(path: &PathBuf) -> Result<TargetConfig> {
    TargetConfig::from_file(path).with_context(|| format!("Failed to load target {}", path.display()))
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report.summary());
        for failure in &report.page_failures {
            println!("  page failed: {} ({})", failure.url, failure.message);
        }
    }
    Ok(())
}

async fn run(
    target_files: Vec<PathBuf>,
    no_filter: bool,
    json: bool,
    discard_log: Option<PathBuf>,
) -> Result<()> {
    // Targets and credentials are checked before anything touches the network.
    let mut targets = Vec::with_capacity(target_files.len());
    for path in &target_files {
        let target = load_target(path)?;
        let fetcher = HttpFetcher::for_target(&target)
            .with_context(|| format!("Cannot prepare target '{}'", target.name))?;
        targets.push((target, fetcher));
    }

    let services = Services::connect().await?;
    let mut pipeline = Pipeline::new(&services.ai, &services.ai, &services.records, &services.index)
        .with_filter(services.filter(no_filter));
    if let Some(path) = discard_log {
        pipeline = pipeline.with_discard_log(path);
    }

    let runs: Vec<(&TargetConfig, &dyn Fetcher)> = targets
        .iter()
        .map(|(target, fetcher)| (target, fetcher as &dyn Fetcher))
        .collect();
    let finished = pipeline.run_all(&runs).await.context("Run aborted")?;

    for run in &finished {
        match &run.result {
            Ok(report) => print_report(report, json)?,
            Err(e) => println!("{}: skipped ({})", run.target, e),
        }
    }
    Ok(())
}

async fn scrape(target_file: PathBuf, output: PathBuf, discard_log: Option<PathBuf>) -> Result<()> {
    let target = load_target(&target_file)?;
    let fetcher = HttpFetcher::for_target(&target)
        .with_context(|| format!("Cannot prepare target '{}'", target.name))?;

    let mut scraped = scrape_target(&fetcher, &target, discard_log.as_ref())
        .await
        .with_context(|| format!("Scrape failed for target '{}'", target.name))?;
    write_items_jsonl(&output, &scraped.items)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    scraped.report.finish();
    println!("{}", scraped.report.summary());
    println!("Wrote {} items to {}", scraped.items.len(), output.display());
    Ok(())
}

async fn load(file: PathBuf, brand: String, no_filter: bool, json: bool) -> Result<()> {
    let items = load_items(&file).with_context(|| format!("Failed to read {}", file.display()))?;

    let services = Services::connect().await?;
    let pipeline = Pipeline::new(&services.ai, &services.ai, &services.records, &services.index)
        .with_filter(services.filter(no_filter));

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let report = pipeline.load(&name, &brand, items).await;
    print_report(&report, json)
}

async fn query(text: String, top_k: usize, full_text: bool) -> Result<()> {
    let services = Services::connect().await?;
    let client = QueryClient::new(&services.ai, &services.index, &services.records);
    let fetch = if full_text {
        FetchRecords::Always
    } else {
        FetchRecords::WhenTruncated
    };

    let hits = client
        .query(&text, &QueryOptions::default().with_top_k(top_k).with_fetch_records(fetch))
        .await
        .context("Query failed")?;

    if hits.is_empty() {
        println!("No matches.");
    }
    for (rank, hit) in hits.iter().enumerate() {
        let meta = &hit.vector.metadata;
        println!("{}. [{:.3}] {} / {}", rank + 1, hit.vector.score, meta.brand, meta.issue);
        if !meta.product.is_empty() {
            println!("   product:  {}", meta.product);
        }
        if !meta.url.is_empty() {
            println!("   url:      {}", meta.url);
        }
        println!("   solution: {}", hit.full_solution());
        println!();
    }
    Ok(())
}
