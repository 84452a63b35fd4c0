use anyhow::{anyhow, Result};
use scraper::{Html, Selector};
use std::time::Duration;

/// What a fetch waits for before handing the document back
#[derive(Debug, Clone)]
pub struct WaitFor {
    /// CSS selector of the item container
    pub selector: String,
    pub timeout: Duration,
}

/// Result of a fetch that reached the server
#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    /// Full document markup, container present
    Ready(String),
    /// The container did not show up within the timeout
    ContainerMissing,
}

/// Common trait for anything that can load a listing page.
/// Implementations block until the page is ready or the wait runs out.
pub trait PageSource {
    /// Load `url` and wait for the container. Network and navigation
    /// failures are errors; an absent container is not.
    fn fetch(&mut self, url: &str, wait: &WaitFor) -> Result<PageFetch>;

    /// Get the name of the page source
    fn source_name(&self) -> &'static str;
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    fn fetch(&mut self, url: &str, wait: &WaitFor) -> Result<PageFetch> {
        (**self).fetch(url, wait)
    }

    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }
}

/// Classify a static document by whether the container selector matches
pub fn check_container(html: String, wait: &WaitFor) -> Result<PageFetch> {
    let selector = Selector::parse(&wait.selector)
        .map_err(|e| anyhow!("invalid container selector {:?}: {}", wait.selector, e))?;
    let found = Html::parse_document(&html).select(&selector).next().is_some();
    Ok(if found {
        PageFetch::Ready(html)
    } else {
        PageFetch::ContainerMissing
    })
}
