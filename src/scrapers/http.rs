use crate::scrapers::traits::{check_container, PageFetch, PageSource, WaitFor};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Plain HTTP page source for catalogs that render their listings server side
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    /// Create a client whose request timeout doubles as the container wait
    pub fn new(user_agent: Option<&str>, timeout: Duration) -> Result<Self> {
        let mut builder = Client::builder().timeout(timeout);
        if let Some(agent) = user_agent {
            builder = builder.user_agent(agent);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&mut self, url: &str, wait: &WaitFor) -> Result<PageFetch> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            warn!("{} returned status: {}", url, response.status());
            anyhow::bail!("Failed to fetch {}: {}", url, response.status());
        }

        let html = response.text().context("Failed to read response body")?;
        debug!("Downloaded {} bytes of HTML", html.len());

        check_container(html, wait)
    }

    fn source_name(&self) -> &'static str {
        "HTTP"
    }
}
