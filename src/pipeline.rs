//! Stage runners wiring config, page sources, files and the store together.

use crate::cleaning::{clean_batch, CleaningStats};
use crate::config::{FetcherKind, PipelineConfig};
use crate::files;
use crate::models::CleanedRecord;
use crate::scrapers::{CatalogScraper, ChromeSession, HttpPageSource, PageSource, ScrapeRun};
use crate::store::{ProductSink, SqliteProductStore};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Open the page source selected in the config
pub fn open_page_source(config: &PipelineConfig) -> Result<Box<dyn PageSource>> {
    Ok(match config.fetcher {
        FetcherKind::Browser => Box::new(ChromeSession::launch(
            &config.browser,
            config.selectors.consent_button.clone(),
            config.wait_timeout(),
        )?),
        FetcherKind::Http => Box::new(HttpPageSource::new(
            config.browser.user_agent.as_deref(),
            config.wait_timeout(),
        )?),
    })
}

/// Scrape every configured category with `source`, blocking until done
pub fn scrape_with<S: PageSource>(source: S, config: &PipelineConfig) -> Result<ScrapeRun> {
    let mut scraper = CatalogScraper::new(source, config)?;
    let run = scraper.scrape_all(&config.categories);

    for interrupted in run.interrupted() {
        warn!(
            "{} stopped early after {} pages: {}",
            interrupted.start_url, interrupted.pages_fetched, interrupted.stop
        );
    }
    Ok(run)
}

/// Scrape on a blocking thread. The page source lives and dies inside it.
pub async fn scrape(config: PipelineConfig) -> Result<ScrapeRun> {
    config.validate()?;
    tokio::task::spawn_blocking(move || {
        let source = open_page_source(&config)?;
        scrape_with(source, &config)
    })
    .await
    .context("Scrape task panicked")?
}

/// Read a raw CSV, clean it and write the cleaned CSV
pub fn clean_file(input: &Path, output: &Path) -> Result<(Vec<CleanedRecord>, CleaningStats)> {
    let rows = files::read_raw(input)?;
    let (cleaned, stats) = clean_batch(&rows);
    files::write_cleaned(output, &cleaned)?;
    Ok((cleaned, stats))
}

/// Push cleaned records into the database at `database_url`
pub async fn load(records: &[CleanedRecord], database_url: &str) -> Result<u64> {
    let store = SqliteProductStore::connect(database_url).await?;
    store.ensure_schema().await?;
    let written = store.insert_batch(records).await?;
    info!("Loaded {} products into {}", written, database_url);
    Ok(written)
}
