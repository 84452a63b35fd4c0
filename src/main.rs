use anyhow::{Context, Result};
use catalog_scout::config::PipelineConfig;
use catalog_scout::models::CleanedRecord;
use catalog_scout::report::{self, Report, ReportFilter, ReportOptions};
use catalog_scout::store::SqliteProductStore;
use catalog_scout::{files, pipeline};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Scrape a product catalog, clean the fields and report per category
#[derive(Debug, Parser)]
#[command(name = "catalog-scout", version)]
struct Cli {
    /// JSON config file; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape all categories into the raw CSV
    Scrape {
        #[arg(long)]
        max_pages: Option<usize>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Clean the raw CSV into the cleaned CSV
    Clean {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Insert the cleaned CSV into the Products table
    Load {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        database_url: Option<String>,
    },
    /// Print aggregate tables for the cleaned CSV
    Report {
        #[arg(long)]
        input: Option<PathBuf>,
        #[command(flatten)]
        view: ReportArgs,
    },
    /// Print aggregates computed by the database
    Query {
        #[arg(long)]
        database_url: Option<String>,
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Scrape, clean, load (when a database is configured) and report
    Run {
        #[arg(long)]
        max_pages: Option<usize>,
        #[command(flatten)]
        view: ReportArgs,
    },
}

#[derive(Debug, Args)]
struct ReportArgs {
    /// Also write the report as JSON
    #[arg(long)]
    json: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    top: usize,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    min_rating: Option<f64>,
    #[arg(long)]
    max_rating: Option<f64>,
}

impl ReportArgs {
    fn options(&self) -> ReportOptions {
        ReportOptions {
            filter: ReportFilter {
                category: self.category.clone(),
                min_price: self.min_price,
                max_price: self.max_price,
                min_rating: self.min_rating,
                max_rating: self.max_rating,
            },
            top_reviewed: self.top,
            ..ReportOptions::default()
        }
    }
}

fn print_report(
    records: &[CleanedRecord],
    view: &ReportArgs,
    config: &PipelineConfig,
) -> Result<()> {
    let report = Report::build(records, &view.options());
    println!("{}", report.render_text());

    if let Some(path) = view.json.as_ref().or(config.output.report_json.as_ref()) {
        report.write_json(path)?;
    }
    Ok(())
}

fn database_url(flag: Option<String>, config: &PipelineConfig) -> Result<String> {
    flag.or_else(|| config.database_url.clone())
        .context("No database URL: pass --database-url or set DATABASE_URL")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scrape { max_pages, out } => {
            if let Some(max_pages) = max_pages {
                config.max_pages = max_pages;
            }
            let out = out.unwrap_or_else(|| config.output.raw_csv.clone());
            let run = pipeline::scrape(config).await?;
            files::write_raw(&out, &run.records)?;
            info!("✅ Scraped {} products", run.records.len());
        }
        Command::Clean { input, out } => {
            let input = input.unwrap_or_else(|| config.output.raw_csv.clone());
            let out = out.unwrap_or_else(|| config.output.cleaned_csv.clone());
            pipeline::clean_file(&input, &out)?;
        }
        Command::Load { input, database_url: flag } => {
            let input = input.unwrap_or_else(|| config.output.cleaned_csv.clone());
            let url = database_url(flag, &config)?;
            let records = files::read_cleaned(&input)?;
            pipeline::load(&records, &url).await?;
        }
        Command::Report { input, view } => {
            let input = input.unwrap_or_else(|| config.output.cleaned_csv.clone());
            let records = files::read_cleaned(&input)?;
            print_report(&records, &view, &config)?;
        }
        Command::Query { database_url: flag, top } => {
            let url = database_url(flag, &config)?;
            let store = SqliteProductStore::connect(&url).await?;
            println!("{}", report::render_summaries(&store.category_summaries().await?));
            println!("{}", report::render_top_reviewed(&store.top_reviewed(top).await?));
        }
        Command::Run { max_pages, view } => {
            if let Some(max_pages) = max_pages {
                config.max_pages = max_pages;
            }
            let run = pipeline::scrape(config.clone()).await?;
            files::write_raw(&config.output.raw_csv, &run.records)?;

            let (cleaned, _) =
                pipeline::clean_file(&config.output.raw_csv, &config.output.cleaned_csv)?;

            match &config.database_url {
                Some(url) => {
                    if let Err(e) = pipeline::load(&cleaned, url).await {
                        error!("Loading into the database failed: {:#}", e);
                    }
                }
                None => info!("No database URL configured, skipping load"),
            }

            print_report(&cleaned, &view, &config)?;
        }
    }

    Ok(())
}
