use crate::cleaning::parse_review_count;
use crate::config::{CompiledSelectors, ConfigError, PipelineConfig, ScrapeTarget};
use crate::models::{ProductRecord, NOT_AVAILABLE};
use crate::scrapers::traits::{PageFetch, PageSource, WaitFor};
use crate::scrapers::types::{CategoryScrape, ItemError, ListingPage, ScrapeRun, StopReason};
use scraper::{ElementRef, Html};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Whitespace-normalized text content of an element
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Paginating catalog scraper over any [`PageSource`]
pub struct CatalogScraper<S> {
    source: S,
    selectors: CompiledSelectors,
    base_url: Url,
    wait: WaitFor,
    max_pages: usize,
    page_delay: Duration,
}

impl<S: PageSource> CatalogScraper<S> {
    /// Create a scraper; the configuration is validated first
    pub fn new(source: S, config: &PipelineConfig) -> Result<Self, ConfigError> {
        let ScrapeTarget { base_url, selectors } = config.validate()?;

        Ok(Self {
            source,
            selectors,
            base_url,
            wait: WaitFor {
                selector: config.selectors.product_container.clone(),
                timeout: config.wait_timeout(),
            },
            max_pages: config.max_pages,
            page_delay: config.page_delay(),
        })
    }

    /// Give the page source back, e.g. to close a browser early
    pub fn into_source(self) -> S {
        self.source
    }

    /// Extract one item block. Absent fields fall back to sentinels.
    pub fn extract_product(
        &self,
        item: ElementRef,
        category: &str,
    ) -> Result<ProductRecord, ItemError> {
        let mut record = ProductRecord::placeholder(category);

        if let Some(name_el) = item.select(&self.selectors.name).next() {
            let name = element_text(name_el);
            if !name.is_empty() {
                record.name = name;
            }
            if let Some(href) = name_el
                .value()
                .attr("href")
                .map(str::trim)
                .filter(|h| !h.is_empty())
            {
                record.url = self
                    .base_url
                    .join(href)
                    .map_err(|e| ItemError::UnresolvableLink {
                        href: href.to_string(),
                        reason: e.to_string(),
                    })?
                    .to_string();
            }
        }

        if let Some(price_el) = item.select(&self.selectors.price).next() {
            let price = element_text(price_el);
            if !price.is_empty() {
                record.price = price;
            }
        }

        if let Some(rating_el) = item.select(&self.selectors.rating).next() {
            if let Some(raw) = rating_el
                .value()
                .attr(&self.selectors.rating_attribute)
                .map(str::trim)
                .filter(|r| !r.is_empty() && *r != NOT_AVAILABLE)
            {
                let rating = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|r| r.is_finite())
                    .ok_or_else(|| ItemError::MalformedRating(raw.to_string()))?;
                record.rating = Some(rating);
            }
        }

        if let Some(reviews_el) = item.select(&self.selectors.reviews).next() {
            record.reviews = parse_review_count(&element_text(reviews_el));
        }

        Ok(record)
    }

    /// Parse a fetched document into records plus the next-page link
    pub fn parse_listing_page(&self, url: &str, html: &str, category: &str) -> ListingPage {
        let document = Html::parse_document(html);
        let mut page = ListingPage {
            url: url.to_string(),
            ..ListingPage::default()
        };

        for (idx, item) in document.select(&self.selectors.container).enumerate() {
            page.item_blocks += 1;
            match self.extract_product(item, category) {
                Ok(record) => page.records.push(record),
                Err(e) => {
                    debug!("Skipped item {} on {}: {}", idx, url, e);
                    page.skipped += 1;
                }
            }
        }

        page.next_page = document
            .select(&self.selectors.next_page)
            .find_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .and_then(|href| {
                let joined = match Url::parse(url) {
                    Ok(current) => current.join(href),
                    Err(_) => self.base_url.join(href),
                };
                joined.ok().map(|u| u.to_string())
            });

        page
    }

    /// Lazily walk the pages of one category, one `Vec` of records per page
    pub fn category_pages(&mut self, start_url: &str, category: &str) -> CategoryPages<'_, S> {
        CategoryPages {
            scraper: self,
            category: category.to_string(),
            next_url: Some(start_url.to_string()),
            pages_fetched: 0,
            items_skipped: 0,
            stop: None,
        }
    }

    /// Scrape one start URL to completion. Never fails: problems end the
    /// pagination early and are reported in [`CategoryScrape::stop`].
    pub fn scrape_category(&mut self, start_url: &str, category: &str) -> CategoryScrape {
        let mut pages = self.category_pages(start_url, category);
        let mut records = Vec::new();
        for page in pages.by_ref() {
            records.extend(page);
        }
        let pages_fetched = pages.pages_fetched;
        let items_skipped = pages.items_skipped;
        let stop = pages.stop.take().unwrap_or(StopReason::LastPage);

        info!(
            "{}: {} products from {} pages ({})",
            category,
            records.len(),
            pages_fetched,
            stop
        );

        CategoryScrape {
            category: category.to_string(),
            start_url: start_url.to_string(),
            records,
            pages_fetched,
            items_skipped,
            stop,
        }
    }

    /// Scrape every start URL of every category, in order
    pub fn scrape_all<'a, I>(&mut self, categories: I) -> ScrapeRun
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<String>)>,
    {
        let mut run = ScrapeRun::default();
        for (category, urls) in categories {
            if urls.is_empty() {
                warn!("Category {} has no start URLs, skipping", category);
                continue;
            }
            for url in urls {
                let mut outcome = self.scrape_category(url, category);
                run.records.append(&mut outcome.records);
                run.categories.push(outcome);
            }
        }

        info!(
            "Scraped {} products from {} start URLs via {}",
            run.records.len(),
            run.categories.len(),
            self.source.source_name()
        );
        run
    }
}

/// Iterator over the pages of one category, see [`CatalogScraper::category_pages`]
pub struct CategoryPages<'a, S> {
    scraper: &'a mut CatalogScraper<S>,
    category: String,
    next_url: Option<String>,
    pages_fetched: usize,
    items_skipped: usize,
    stop: Option<StopReason>,
}

impl<S> CategoryPages<'_, S> {
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Why pagination ended; `None` while pages remain
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    fn halt(&mut self, reason: StopReason) -> Option<Vec<ProductRecord>> {
        self.stop = Some(reason);
        None
    }
}

impl<S: PageSource> Iterator for CategoryPages<'_, S> {
    type Item = Vec<ProductRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let url = self.next_url.take()?;

        if self.pages_fetched > 0 && !self.scraper.page_delay.is_zero() {
            thread::sleep(self.scraper.page_delay);
        }

        info!(
            "Fetching page {} for {}: {}",
            self.pages_fetched + 1,
            self.category,
            url
        );

        let html = match self.scraper.source.fetch(&url, &self.scraper.wait) {
            Ok(PageFetch::Ready(html)) => html,
            Ok(PageFetch::ContainerMissing) => {
                warn!("No product container on {}; stopping {}", url, self.category);
                return self.halt(StopReason::ContainerMissing);
            }
            Err(e) => {
                warn!("Failed to fetch {}: {:#}; stopping {}", url, e, self.category);
                return self.halt(StopReason::FetchFailed(format!("{:#}", e)));
            }
        };

        let page = self.scraper.parse_listing_page(&url, &html, &self.category);
        if page.item_blocks == 0 {
            warn!("No product items found on {}. Check selectors.", url);
            return self.halt(StopReason::ContainerMissing);
        }

        self.pages_fetched += 1;
        self.items_skipped += page.skipped;
        debug!(
            "Page {}: {} items, {} skipped, next: {:?}",
            self.pages_fetched, page.item_blocks, page.skipped, page.next_page
        );

        if self.pages_fetched >= self.scraper.max_pages {
            self.stop = Some(StopReason::MaxPages);
        } else if let Some(next) = page.next_page {
            self.next_url = Some(next);
        } else {
            self.stop = Some(StopReason::LastPage);
        }

        Some(page.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::memory::MemoryPageSource;

    fn config(max_pages: usize) -> PipelineConfig {
        PipelineConfig {
            max_pages,
            page_delay_ms: 0,
            ..PipelineConfig::default()
        }
    }

    fn listing(items: &[&str], next: Option<&str>) -> String {
        let next = next
            .map(|href| format!(r#"<a class="next" href="{}">Next</a>"#, href))
            .unwrap_or_default();
        format!(
            "<html><body><ul class=\"goodlist\">{}</ul>{}</body></html>",
            items.iter().map(|i| format!("<li>{}</li>", i)).collect::<String>(),
            next
        )
    }

    const FULL_ITEM: &str = r#"
        <a class="title" href="/Drill-p-123.html">  Cordless   Drill </a>
        <span class="price">US$49.99</span>
        <span class="review-star" data-rating="4.5"></span>
        <a class="review">(1,234+)</a>
    "#;

    #[test]
    fn extracts_every_field() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/c.html",
            &listing(&[FULL_ITEM], None),
            "Tools",
        );

        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.category, "Tools");
        assert_eq!(record.name, "Cordless Drill");
        assert_eq!(record.price, "US$49.99");
        assert_eq!(record.rating, Some(4.5));
        assert_eq!(record.reviews, 1234);
        assert_eq!(record.url, "https://www.banggood.com/Drill-p-123.html");
        assert_eq!(page.next_page, None);
    }

    #[test]
    fn empty_item_yields_sentinels() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/c.html",
            &listing(&["<div>nothing here</div>"], None),
            "Tools",
        );

        assert_eq!(page.skipped, 0);
        assert_eq!(page.records, vec![ProductRecord::placeholder("Tools")]);
        assert_eq!(page.records[0].name, "N/A");
        assert_eq!(page.records[0].price, "N/A");
        assert_eq!(page.records[0].reviews, 0);
        assert_eq!(page.records[0].url, "");
    }

    #[test]
    fn malformed_item_is_skipped_not_fatal() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let bad_rating = r#"<a class="title" href="/x.html">X</a>
            <span class="review-star" data-rating="five"></span>"#;
        let bad_link = r#"<a class="title" href="http://[oops">Y</a>"#;
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/c.html",
            &listing(&[bad_rating, FULL_ITEM, bad_link], None),
            "Tools",
        );

        assert_eq!(page.item_blocks, 3);
        assert_eq!(page.skipped, 2);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].name, "Cordless Drill");
    }

    #[test]
    fn empty_rating_attribute_is_missing() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let item = r#"<span class="review-star" data-rating=" "></span>"#;
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/c.html",
            &listing(&[item], None),
            "Tools",
        );
        assert_eq!(page.records[0].rating, None);
    }

    #[test]
    fn not_available_rating_is_missing() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let item = r#"<a class="title" href="/Lamp-p-7.html">Lamp</a>
            <span class="review-star" data-rating=" N/A "></span>"#;
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/c.html",
            &listing(&[item], None),
            "Lighting",
        );

        assert_eq!(page.skipped, 0);
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].name, "Lamp");
        assert_eq!(page.records[0].rating, None);
    }

    #[test]
    fn next_link_resolves_against_page() {
        let scraper = CatalogScraper::new(MemoryPageSource::new(), &config(5)).unwrap();
        let page = scraper.parse_listing_page(
            "https://www.banggood.com/cat/list.html",
            &listing(&[FULL_ITEM], Some("list-2.html")),
            "Tools",
        );
        assert_eq!(page.next_page.as_deref(), Some("https://www.banggood.com/cat/list-2.html"));
    }

    #[test]
    fn stops_after_max_pages_despite_next_links() {
        let mut source = MemoryPageSource::new();
        for n in 1..=4 {
            source.insert(
                format!("https://shop.test/p{}", n),
                listing(&[FULL_ITEM, FULL_ITEM], Some(format!("/p{}", n + 1).as_str())),
            );
        }
        let mut scraper = CatalogScraper::new(source, &config(2)).unwrap();
        let outcome = scraper.scrape_category("https://shop.test/p1", "Tools");

        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.stop, StopReason::MaxPages);
        assert_eq!(
            scraper.into_source().requests(),
            &["https://shop.test/p1".to_string(), "https://shop.test/p2".to_string()]
        );
    }

    #[test]
    fn yields_one_batch_per_page_until_last_page() {
        let mut source = MemoryPageSource::new();
        source.insert("https://shop.test/p1", listing(&[FULL_ITEM], Some("/p2")));
        source.insert("https://shop.test/p2", listing(&[FULL_ITEM, FULL_ITEM, FULL_ITEM], None));
        let mut scraper = CatalogScraper::new(source, &config(5)).unwrap();

        let mut pages = scraper.category_pages("https://shop.test/p1", "Tools");
        let sizes: Vec<usize> = pages.by_ref().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![1, 3]);
        assert_eq!(pages.pages_fetched(), 2);
        assert_eq!(pages.stop_reason(), Some(&StopReason::LastPage));
    }

    #[test]
    fn waits_between_pages_but_not_before_the_first() {
        let mut source = MemoryPageSource::new();
        source.insert("https://shop.test/p1", listing(&[FULL_ITEM], Some("/p2")));
        source.insert("https://shop.test/p2", listing(&[FULL_ITEM], Some("/p3")));
        source.insert("https://shop.test/p3", listing(&[FULL_ITEM], None));
        let config = PipelineConfig {
            page_delay_ms: 100,
            ..config(5)
        };
        let mut scraper = CatalogScraper::new(source, &config).unwrap();

        let started = std::time::Instant::now();
        let outcome = scraper.scrape_category("https://shop.test/p1", "Tools");
        let elapsed = started.elapsed();

        assert_eq!(outcome.pages_fetched, 3);
        assert!(elapsed >= Duration::from_millis(200), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(300), "slept before page 1: {:?}", elapsed);
    }

    #[test]
    fn missing_container_keeps_earlier_pages() {
        let mut source = MemoryPageSource::new();
        source.insert("https://shop.test/p1", listing(&[FULL_ITEM], Some("/p2")));
        source.insert("https://shop.test/p2", "<html><body>Access denied</body></html>");
        let mut scraper = CatalogScraper::new(source, &config(5)).unwrap();
        let outcome = scraper.scrape_category("https://shop.test/p1", "Tools");

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(outcome.stop, StopReason::ContainerMissing);
    }

    #[test]
    fn fetch_error_ends_category_only() {
        let mut source = MemoryPageSource::new();
        source.insert("https://shop.test/a1", listing(&[FULL_ITEM], Some("/a2")));
        source.insert("https://shop.test/b1", listing(&[FULL_ITEM, FULL_ITEM], None));
        let mut scraper = CatalogScraper::new(source, &config(5)).unwrap();

        let mut categories = std::collections::BTreeMap::new();
        categories.insert("A".to_string(), vec!["https://shop.test/a1".to_string()]);
        categories.insert("B".to_string(), vec!["https://shop.test/b1".to_string()]);
        let run = scraper.scrape_all(&categories);

        assert_eq!(run.records.len(), 3);
        assert!(matches!(run.categories[0].stop, StopReason::FetchFailed(_)));
        assert_eq!(run.categories[1].stop, StopReason::LastPage);
        assert_eq!(run.interrupted().count(), 1);
    }
}
