pub mod browser;
pub mod catalog;
pub mod http;
pub mod memory;
pub mod traits;
pub mod types;

pub use browser::ChromeSession;
pub use catalog::{CatalogScraper, CategoryPages};
pub use http::HttpPageSource;
pub use memory::MemoryPageSource;
pub use traits::{PageFetch, PageSource, WaitFor};
pub use types::{CategoryScrape, ItemError, ListingPage, ScrapeRun, StopReason};
