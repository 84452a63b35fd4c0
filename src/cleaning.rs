//! Numeric coercion, imputation and derived ratios for scraped rows.
//!
//! Missing values are explicit `Option`s up to the point where the batch
//! means are known; no NaN ever reaches a [`CleanedRecord`].

use crate::models::{CleanedRecord, RawRow};
use serde::Serialize;
use tracing::info;

/// Parse a price such as `"$1,234.56"` or `"US$ 9.99"`.
///
/// Everything except ASCII digits and `.` is dropped before parsing.
pub fn parse_price(raw: &str) -> Option<f64> {
    let digits: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a rating as a plain decimal number
pub fn parse_rating(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a review count such as `"(1,234+)"`; anything unreadable counts as zero
pub fn parse_review_count(raw: &str) -> u64 {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ',' | '+') && !c.is_whitespace())
        .collect();
    digits.parse().unwrap_or(0)
}

/// `numerator / denominator`, or 0 when the quotient is undefined
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Arithmetic mean of the present values. The mean of nothing is 0.
pub fn mean_of_present(values: &[Option<f64>]) -> f64 {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// What a cleaning pass had to fill in
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleaningStats {
    pub rows: usize,
    pub imputed_prices: usize,
    pub imputed_ratings: usize,
    pub mean_price: f64,
    pub mean_rating: f64,
}

/// Clean a whole batch. Every input row yields exactly one output row, in order.
pub fn clean_batch(rows: &[RawRow]) -> (Vec<CleanedRecord>, CleaningStats) {
    let prices: Vec<Option<f64>> = rows
        .iter()
        .map(|r| r.price_raw.as_deref().and_then(parse_price))
        .collect();
    let ratings: Vec<Option<f64>> = rows
        .iter()
        .map(|r| r.rating_raw.as_deref().and_then(parse_rating))
        .collect();

    // Means come from the original values only, before any row is filled.
    let mean_price = mean_of_present(&prices);
    let mean_rating = mean_of_present(&ratings);

    let mut stats = CleaningStats {
        rows: rows.len(),
        mean_price,
        mean_rating,
        ..CleaningStats::default()
    };

    let cleaned = rows
        .iter()
        .zip(prices.into_iter().zip(ratings))
        .map(|(row, (price, rating))| {
            let price = price.unwrap_or_else(|| {
                stats.imputed_prices += 1;
                mean_price
            });
            let rating = rating.unwrap_or_else(|| {
                stats.imputed_ratings += 1;
                mean_rating
            });
            let reviews = row.reviews_raw.as_deref().map(parse_review_count).unwrap_or(0);

            CleanedRecord {
                category: row.category.clone().unwrap_or_default(),
                name: row.name.clone().unwrap_or_default(),
                price_raw: price,
                rating_raw: rating,
                reviews_raw: reviews,
                url: row.url.clone().unwrap_or_default(),
                price_to_rating: safe_ratio(price, rating),
                price_to_review: safe_ratio(price, reviews as f64),
            }
        })
        .collect();

    info!(
        "Cleaned {} rows ({} prices and {} ratings imputed; mean price {:.2}, mean rating {:.2})",
        stats.rows, stats.imputed_prices, stats.imputed_ratings, stats.mean_price, stats.mean_rating
    );

    (cleaned, stats)
}
