//! Command-line entry point for the scheduler.
//!
//! Each invocation performs one action and prints its result as JSON on
//! stdout. A failed run exits non-zero after printing its metadata.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobs_etl::{EtlConfig, Orchestrator, PostgresStore, UpsertStore, UsaJobsSource};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jobs-etl")]
#[command(about = "Extract job postings from USAJOBS and load them into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one extraction cycle (applies migrations first)
    Run {
        /// Override SEARCH_KEYWORD
        #[arg(long)]
        keyword: Option<String>,

        /// Override SEARCH_LOCATION
        #[arg(long)]
        location: Option<String>,

        /// Override MAX_PAGES
        #[arg(long)]
        max_pages: Option<u32>,

        /// Override RUN_DEADLINE_SECS
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Apply database migrations
    Migrate,

    /// Print posting statistics and recent runs
    Stats {
        /// Number of recent runs to show
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[derive(Serialize)]
struct StatsResponse {
    postings: jobs_etl::PostingStats,
    recent_runs: Vec<jobs_etl::RunMetadata>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before reading LOG_FORMAT
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let mut config = EtlConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    match cli.command {
        Commands::Run {
            keyword,
            location,
            max_pages,
            deadline_secs,
        } => {
            if let Some(keyword) = keyword {
                config.query.keyword = keyword;
            }
            if let Some(location) = location {
                config.query.location = Some(location);
            }
            if let Some(max_pages) = max_pages {
                config.pipeline.run.max_pages = max_pages;
            }
            if let Some(secs) = deadline_secs {
                config.pipeline.run.deadline = (secs > 0).then(|| Duration::from_secs(secs));
            }
            run(config).await
        }
        Commands::Migrate => {
            connect(&config).await?;
            print_json(&serde_json::json!({ "migrated": true }))
        }
        Commands::Stats { runs } => {
            let store = connect(&config).await?;
            let response = StatsResponse {
                postings: store.statistics().await.context("Failed to load statistics")?,
                recent_runs: store
                    .recent_runs(runs)
                    .await
                    .context("Failed to load recent runs")?,
            };
            print_json(&response)
        }
    }
}

async fn run(config: EtlConfig) -> Result<()> {
    let store = connect(&config).await?;
    let source =
        UsaJobsSource::new(config.source.clone()).context("Failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(source, store, &config.pipeline);

    match orchestrator.run(&config.query).await {
        Ok(metadata) => print_json(&metadata),
        Err(failure) => {
            print_json(&failure.metadata)?;
            Err(anyhow::Error::new(failure))
        }
    }
}

/// Connect to the database and bring the schema up to date.
async fn connect(config: &EtlConfig) -> Result<PostgresStore> {
    tracing::info!(url = %config.database.url.redacted_url(), "Connecting to database...");
    let store = PostgresStore::new(
        config.database.url.expose(),
        config.database.max_connections,
    )
    .await
    .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    store.migrate().await.context("Failed to run migrations")?;
    Ok(store)
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobs_etl=debug,sqlx=warn".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
