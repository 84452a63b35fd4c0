use crate::models::ProductRecord;
use std::fmt;
use thiserror::Error;

/// Why pagination for a category ended
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// `max_pages` pages were fetched
    MaxPages,
    /// The last fetched page had no next-page link
    LastPage,
    /// The item container was absent on a page
    ContainerMissing,
    /// Navigation, network or timeout error
    FetchFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxPages => write!(f, "reached max pages"),
            StopReason::LastPage => write!(f, "no next page"),
            StopReason::ContainerMissing => write!(f, "product container missing"),
            StopReason::FetchFailed(err) => write!(f, "fetch failed: {}", err),
        }
    }
}

/// Why a single item block was dropped
#[derive(Debug, Error, PartialEq)]
pub enum ItemError {
    #[error("rating attribute is not a number: {0:?}")]
    MalformedRating(String),
    #[error("product link {href:?} cannot be resolved: {reason}")]
    UnresolvableLink { href: String, reason: String },
}

/// Items parsed from one fetched listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub url: String,
    /// Records in DOM order
    pub records: Vec<ProductRecord>,
    /// Number of item blocks found, including skipped ones
    pub item_blocks: usize,
    pub skipped: usize,
    pub next_page: Option<String>,
}

/// Outcome of paginating one start URL
#[derive(Debug, Clone)]
pub struct CategoryScrape {
    pub category: String,
    pub start_url: String,
    /// Emptied when the scrape is folded into a [`ScrapeRun`]
    pub records: Vec<ProductRecord>,
    pub pages_fetched: usize,
    pub items_skipped: usize,
    pub stop: StopReason,
}

/// Summary of a scrape across all categories
#[derive(Debug, Clone, Default)]
pub struct ScrapeRun {
    pub records: Vec<ProductRecord>,
    pub categories: Vec<CategoryScrape>,
}

impl ScrapeRun {
    /// Start URLs that ended on an error or a missing container
    pub fn interrupted(&self) -> impl Iterator<Item = &CategoryScrape> {
        self.categories.iter().filter(|c| {
            matches!(
                c.stop,
                StopReason::ContainerMissing | StopReason::FetchFailed(_)
            )
        })
    }
}
