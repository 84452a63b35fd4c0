use anyhow::{Context, Result};
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Problems that make a run impossible before any page is fetched
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no start URLs configured for any category")]
    NoStartUrls,
    #[error("max_pages must be at least 1")]
    ZeroMaxPages,
    #[error("invalid base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("selector {name} does not parse: {selector:?}")]
    InvalidSelector { name: &'static str, selector: String },
}

/// Which page source drives the extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    /// Headless Chrome, for catalogs rendered client side
    Browser,
    /// Plain HTTP GET, for server-rendered catalogs
    Http,
}

/// CSS selectors describing the catalog markup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// One item block; the fetch waits for its first match
    pub product_container: String,
    pub product_name: String,
    pub product_price: String,
    pub product_rating: String,
    /// Attribute on the rating element holding the numeric score
    pub rating_attribute: String,
    pub product_reviews: String,
    pub next_page: String,
    /// Cookie banner button clicked after navigation, if any
    pub consent_button: Option<String>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            product_container: "ul.goodlist li".to_string(),
            product_name: "a.title".to_string(),
            product_price: "span.price".to_string(),
            product_rating: "span.review-star".to_string(),
            rating_attribute: "data-rating".to_string(),
            product_reviews: "a.review".to_string(),
            next_page: "a.next".to_string(),
            consent_button: Some("button[id*=\"accept\"]".to_string()),
        }
    }
}

/// Browser launch options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub sandbox: bool,
    pub user_agent: Option<String>,
    /// Where to drop HTML and screenshots of pages whose container never appeared
    pub debug_dir: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: false,
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            debug_dir: None,
        }
    }
}

/// File locations for each pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub raw_csv: PathBuf,
    pub cleaned_csv: PathBuf,
    pub report_json: Option<PathBuf>,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            raw_csv: PathBuf::from("banggood_products_raw.csv"),
            cleaned_csv: PathBuf::from("banggood_products_cleaned.csv"),
            report_json: None,
        }
    }
}

/// Everything a pipeline run needs, passed explicitly to each stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base for resolving relative product links
    pub base_url: String,
    /// Category label to its start URLs
    pub categories: BTreeMap<String, Vec<String>>,
    pub selectors: Selectors,
    pub max_pages: usize,
    pub wait_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub fetcher: FetcherKind,
    pub browser: BrowserSettings,
    pub output: OutputPaths,
    pub database_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut categories = BTreeMap::new();
        categories.insert(
            "Electronics".to_string(),
            vec![
                "https://www.banggood.com/Wholesale-3D-Printer-and-Supplies-ca-2002.html".to_string(),
                "https://www.banggood.com/Wholesale-Module-Board-ca-2278.html".to_string(),
                "https://www.banggood.com/Wholesale-Laser-Engraver-and-Supplies-ca-18981.html"
                    .to_string(),
                "https://www.banggood.com/Wholesale-Smart-Home-ca-2218.html".to_string(),
            ],
        );
        categories.insert(
            "Sports & Outdoor".to_string(),
            vec![
                "https://www.banggood.com/Wholesale-Camping-ca-6030.html".to_string(),
                "https://www.banggood.com/Wholesale-Fitness-Wellness-ca-6016.html".to_string(),
                "https://www.banggood.com/Wholesale-Cycling-ca-6002.html".to_string(),
                "https://www.banggood.com/Wholesale-Flashlight-ca-14002.html".to_string(),
            ],
        );

        Self {
            base_url: "https://www.banggood.com".to_string(),
            categories,
            selectors: Selectors::default(),
            max_pages: 5,
            wait_timeout_secs: 20,
            page_delay_ms: 2000,
            fetcher: FetcherKind::Browser,
            browser: BrowserSettings::default(),
            output: OutputPaths::default(),
            database_url: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, or use defaults when no path is given.
    /// `DATABASE_URL` from the environment (or `.env`) overrides the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };

        let _ = dotenvy::dotenv();
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        Ok(config)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    /// Check the settings a scrape depends on
    pub fn validate(&self) -> Result<ScrapeTarget, ConfigError> {
        if self.categories.values().all(|urls| urls.is_empty()) {
            return Err(ConfigError::NoStartUrls);
        }
        if self.max_pages == 0 {
            return Err(ConfigError::ZeroMaxPages);
        }
        let base_url = Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;

        let s = &self.selectors;
        let selectors = CompiledSelectors {
            container: compile("product_container", &s.product_container)?,
            name: compile("product_name", &s.product_name)?,
            price: compile("product_price", &s.product_price)?,
            rating: compile("product_rating", &s.product_rating)?,
            rating_attribute: s.rating_attribute.clone(),
            reviews: compile("product_reviews", &s.product_reviews)?,
            next_page: compile("next_page", &s.next_page)?,
        };
        if let Some(consent) = &s.consent_button {
            compile("consent_button", consent)?;
        }

        Ok(ScrapeTarget { base_url, selectors })
    }
}

fn compile(name: &'static str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|_| ConfigError::InvalidSelector {
        name,
        selector: css.to_string(),
    })
}

/// Parsed form of [`Selectors`]
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub container: Selector,
    pub name: Selector,
    pub price: Selector,
    pub rating: Selector,
    pub rating_attribute: String,
    pub reviews: Selector,
    pub next_page: Selector,
}

/// Base URL and selectors of a config that passed [`PipelineConfig::validate`]
#[derive(Debug, Clone)]
pub struct ScrapeTarget {
    pub base_url: Url,
    pub selectors: CompiledSelectors,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let target = PipelineConfig::default().validate().unwrap();
        assert_eq!(target.base_url.host_str(), Some("www.banggood.com"));
        assert_eq!(target.selectors.rating_attribute, "data-rating");
    }

    #[test]
    fn empty_categories_are_fatal() {
        let mut config = PipelineConfig::default();
        for urls in config.categories.values_mut() {
            urls.clear();
        }
        assert!(matches!(config.validate(), Err(ConfigError::NoStartUrls)));
    }

    #[test]
    fn zero_max_pages_is_rejected() {
        let config = PipelineConfig {
            max_pages: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMaxPages)));
    }

    #[test]
    fn broken_selector_is_named() {
        let mut config = PipelineConfig::default();
        config.selectors.product_price = "span[".to_string();
        match config.validate() {
            Err(ConfigError::InvalidSelector { name, .. }) => assert_eq!(name, "product_price"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "max_pages": 2, "fetcher": "http", "categories": { "Tools": ["https://example.com/tools"] } }"#,
        )
        .unwrap();
        assert_eq!(config.max_pages, 2);
        assert_eq!(config.fetcher, FetcherKind::Http);
        assert_eq!(config.categories.len(), 1);
        assert_eq!(config.selectors, Selectors::default());
        assert_eq!(config.wait_timeout(), Duration::from_secs(20));
    }
}
