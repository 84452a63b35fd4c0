use crate::scrapers::traits::{check_container, PageFetch, PageSource, WaitFor};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use tracing::debug;

/// Page source serving canned documents by URL.
///
/// Drives the scraper without a network in tests. Unknown URLs fail like an
/// unreachable host.
#[derive(Debug, Default)]
pub struct MemoryPageSource {
    pages: HashMap<String, String>,
    requests: Vec<String>,
}

impl MemoryPageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, html: impl Into<String>) {
        self.pages.insert(url.into(), html.into());
    }

    /// Every URL fetched so far, in order
    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl PageSource for MemoryPageSource {
    fn fetch(&mut self, url: &str, wait: &WaitFor) -> Result<PageFetch> {
        self.requests.push(url.to_string());
        let html = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no page stored for {}", url))?;
        debug!("Serving {} bytes for {}", html.len(), url);
        check_container(html, wait)
    }

    fn source_name(&self) -> &'static str {
        "memory"
    }
}
