use serde::{Deserialize, Serialize};

/// Placeholder written for text fields that could not be extracted.
pub const NOT_AVAILABLE: &str = "N/A";

/// One product as scraped from a listing page, before any cleaning.
///
/// The serialized column names match the raw CSV layout read back by
/// [`RawRow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub category: String,
    pub name: String,
    #[serde(rename = "price_raw")]
    pub price: String,
    #[serde(rename = "rating_raw")]
    pub rating: Option<f64>,
    #[serde(rename = "reviews_raw")]
    pub reviews: u64,
    pub url: String,
}

impl ProductRecord {
    /// A record carrying only sentinels, used as the starting point for extraction
    pub fn placeholder(category: &str) -> Self {
        Self {
            category: category.to_string(),
            name: NOT_AVAILABLE.to_string(),
            price: NOT_AVAILABLE.to_string(),
            rating: None,
            reviews: 0,
            url: String::new(),
        }
    }
}

/// Flat row of the raw CSV as the cleaner sees it.
///
/// Every column is optional text, and missing columns fall back to `None`,
/// so files produced outside this crate are accepted as long as the headers match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRow {
    pub category: Option<String>,
    pub name: Option<String>,
    pub price_raw: Option<String>,
    pub rating_raw: Option<String>,
    pub reviews_raw: Option<String>,
    pub url: Option<String>,
}

impl From<&ProductRecord> for RawRow {
    fn from(record: &ProductRecord) -> Self {
        Self {
            category: Some(record.category.clone()),
            name: Some(record.name.clone()),
            price_raw: Some(record.price.clone()),
            rating_raw: record.rating.map(|r| r.to_string()),
            reviews_raw: Some(record.reviews.to_string()),
            url: Some(record.url.clone()),
        }
    }
}

/// A product after numeric coercion, imputation and ratio derivation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub category: String,
    pub name: String,
    pub price_raw: f64,
    pub rating_raw: f64,
    pub reviews_raw: u64,
    pub url: String,
    pub price_to_rating: f64,
    pub price_to_review: f64,
}
