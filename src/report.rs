//! Per-category aggregates over cleaned products.

use crate::models::CleanedRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

/// Aggregates for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub product_count: usize,
    pub average_price: f64,
    pub average_rating: f64,
    /// Share of products with at least one review, 0-100
    pub reviewed_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedProduct {
    pub category: String,
    pub name: String,
    pub reviews: u64,
}

/// A product ranked by price paid per rating point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestValue {
    pub category: String,
    pub name: String,
    pub price: f64,
    pub rating: f64,
    pub price_to_rating: f64,
    pub url: String,
}

/// Box-plot statistics of prices in one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDistribution {
    pub category: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Row filter applied before aggregation. Ranges are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub max_rating: Option<f64>,
}

impl ReportFilter {
    pub fn matches(&self, record: &CleanedRecord) -> bool {
        self.category.as_ref().map_or(true, |c| *c == record.category)
            && self.min_price.map_or(true, |min| record.price_raw >= min)
            && self.max_price.map_or(true, |max| record.price_raw <= max)
            && self.min_rating.map_or(true, |min| record.rating_raw >= min)
            && self.max_rating.map_or(true, |max| record.rating_raw <= max)
    }

    pub fn apply<'a>(&self, records: &'a [CleanedRecord]) -> Vec<&'a CleanedRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Records grouped by category, categories sorted, rows in input order
fn by_category<'a>(records: &[&'a CleanedRecord]) -> BTreeMap<&'a str, Vec<&'a CleanedRecord>> {
    let mut groups: BTreeMap<&str, Vec<&CleanedRecord>> = BTreeMap::new();
    for &record in records {
        groups.entry(record.category.as_str()).or_default().push(record);
    }
    groups
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Quantile of sorted values with linear interpolation between neighbours
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn category_summaries(records: &[&CleanedRecord]) -> Vec<CategorySummary> {
    by_category(records)
        .into_iter()
        .map(|(category, rows)| {
            let reviewed = rows.iter().filter(|r| r.reviews_raw > 0).count();
            CategorySummary {
                category: category.to_string(),
                product_count: rows.len(),
                average_price: mean(rows.iter().map(|r| r.price_raw)),
                average_rating: mean(rows.iter().map(|r| r.rating_raw)),
                reviewed_percentage: 100.0 * reviewed as f64 / rows.len() as f64,
            }
        })
        .collect()
}

/// Global top `n` by review count. Unreviewed products never rank; ties keep input order.
pub fn top_reviewed(records: &[&CleanedRecord], n: usize) -> Vec<ReviewedProduct> {
    let mut reviewed: Vec<&CleanedRecord> = records
        .iter()
        .copied()
        .filter(|r| r.reviews_raw > 0)
        .collect();
    reviewed.sort_by(|a, b| b.reviews_raw.cmp(&a.reviews_raw));
    reviewed
        .into_iter()
        .take(n)
        .map(|r| ReviewedProduct {
            category: r.category.clone(),
            name: r.name.clone(),
            reviews: r.reviews_raw,
        })
        .collect()
}

/// Lowest `n` price-per-rating products in each category.
/// A zero ratio means the rating was zero, so those rows are left out.
pub fn best_value(records: &[&CleanedRecord], n: usize) -> Vec<BestValue> {
    by_category(records)
        .into_values()
        .flat_map(|mut rows| {
            rows.retain(|r| r.price_to_rating > 0.0);
            rows.sort_by(|a, b| a.price_to_rating.total_cmp(&b.price_to_rating));
            rows.into_iter().take(n).map(|r| BestValue {
                category: r.category.clone(),
                name: r.name.clone(),
                price: r.price_raw,
                rating: r.rating_raw,
                price_to_rating: r.price_to_rating,
                url: r.url.clone(),
            })
        })
        .collect()
}

pub fn price_distribution(records: &[&CleanedRecord]) -> Vec<PriceDistribution> {
    by_category(records)
        .into_iter()
        .map(|(category, rows)| {
            let mut prices: Vec<f64> = rows.iter().map(|r| r.price_raw).collect();
            prices.sort_by(f64::total_cmp);
            PriceDistribution {
                category: category.to_string(),
                min: quantile(&prices, 0.0),
                q1: quantile(&prices, 0.25),
                median: quantile(&prices, 0.5),
                q3: quantile(&prices, 0.75),
                max: quantile(&prices, 1.0),
            }
        })
        .collect()
}

/// How many rows each ranking keeps
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub filter: ReportFilter,
    pub top_reviewed: usize,
    pub best_value_per_category: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            filter: ReportFilter::default(),
            top_reviewed: 10,
            best_value_per_category: 5,
        }
    }
}

/// Everything shown for one batch of cleaned products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    pub summaries: Vec<CategorySummary>,
    pub top_reviewed: Vec<ReviewedProduct>,
    pub best_value: Vec<BestValue>,
    pub price_distribution: Vec<PriceDistribution>,
}

impl Report {
    pub fn build(records: &[CleanedRecord], options: &ReportOptions) -> Self {
        let rows = options.filter.apply(records);
        info!("Building report over {} of {} rows", rows.len(), records.len());

        Self {
            generated_at: Utc::now(),
            rows: rows.len(),
            summaries: category_summaries(&rows),
            top_reviewed: top_reviewed(&rows, options.top_reviewed),
            best_value: best_value(&rows, options.best_value_per_category),
            price_distribution: price_distribution(&rows),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("💾 Saved report to {}", path.display());
        Ok(())
    }

    /// Plain-text tables for the terminal
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Products: {} (generated {})",
            self.rows,
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        out.push('\n');
        out.push_str(&render_summaries(&self.summaries));

        let _ = writeln!(out, "\nPrice distribution per category");
        let _ = writeln!(
            out,
            "{:<24} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Category", "Min", "Q1", "Median", "Q3", "Max"
        );
        for d in &self.price_distribution {
            let _ = writeln!(
                out,
                "{:<24} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
                d.category, d.min, d.q1, d.median, d.q3, d.max
            );
        }

        out.push('\n');
        out.push_str(&render_top_reviewed(&self.top_reviewed));

        let _ = writeln!(out, "\nBest value (lowest price per rating point)");
        for (i, v) in self.best_value.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:>3}. [{}] {} ({:.2} / {:.2} = {:.2})",
                i + 1,
                v.category,
                v.name,
                v.price,
                v.rating,
                v.price_to_rating
            );
        }

        out
    }
}

pub fn render_summaries(summaries: &[CategorySummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:>8} {:>12} {:>12} {:>11}",
        "Category", "Products", "Avg price", "Avg rating", "Reviewed %"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<24} {:>8} {:>12.2} {:>12.2} {:>10.1}%",
            s.category, s.product_count, s.average_price, s.average_rating, s.reviewed_percentage
        );
    }
    out
}

pub fn render_top_reviewed(products: &[ReviewedProduct]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Top reviewed products");
    for (i, p) in products.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. [{}] {} ({} reviews)", i + 1, p.category, p.name, p.reviews);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: &str, name: &str, price: f64, rating: f64, reviews: u64) -> CleanedRecord {
        CleanedRecord {
            category: category.to_string(),
            name: name.to_string(),
            price_raw: price,
            rating_raw: rating,
            reviews_raw: reviews,
            url: format!("https://shop.test/{}", name),
            price_to_rating: crate::cleaning::safe_ratio(price, rating),
            price_to_review: crate::cleaning::safe_ratio(price, reviews as f64),
        }
    }

    fn sample() -> Vec<CleanedRecord> {
        vec![
            record("Tools", "drill", 40.0, 4.0, 120),
            record("Camping", "tent", 90.0, 4.5, 0),
            record("Tools", "saw", 20.0, 5.0, 8),
            record("Lighting", "torch", 12.0, 3.0, 300),
            record("Camping", "stove", 30.0, 0.0, 45),
            record("Tools", "hammer", 6.0, 4.0, 0),
        ]
    }

    #[test]
    fn summaries_match_hand_computed_values() {
        let records = sample();
        let rows = ReportFilter::default().apply(&records);
        let summaries = category_summaries(&rows);

        let categories: Vec<&str> = summaries.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(categories, vec!["Camping", "Lighting", "Tools"]);

        assert_eq!(summaries[0].product_count, 2);
        assert_eq!(summaries[0].average_price, 60.0);
        assert_eq!(summaries[0].average_rating, 2.25);
        assert_eq!(summaries[0].reviewed_percentage, 50.0);

        assert_eq!(summaries[1].product_count, 1);
        assert_eq!(summaries[1].average_price, 12.0);
        assert_eq!(summaries[1].reviewed_percentage, 100.0);

        assert_eq!(summaries[2].product_count, 3);
        assert_eq!(summaries[2].average_price, 22.0);
        assert_eq!(summaries[2].average_rating, 13.0 / 3.0);
    }

    #[test]
    fn top_reviewed_skips_unreviewed() {
        let records = sample();
        let rows = ReportFilter::default().apply(&records);
        let names: Vec<String> = top_reviewed(&rows, 3).into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["torch", "drill", "stove"]);

        assert_eq!(top_reviewed(&rows, 10).len(), 4);
    }

    #[test]
    fn best_value_orders_within_category() {
        let records = sample();
        let rows = ReportFilter::default().apply(&records);
        let best = best_value(&rows, 2);
        let picks: Vec<(&str, &str)> = best
            .iter()
            .map(|b| (b.category.as_str(), b.name.as_str()))
            .collect();
        // stove has a zero rating and no meaningful ratio
        assert_eq!(
            picks,
            vec![("Camping", "tent"), ("Lighting", "torch"), ("Tools", "hammer"), ("Tools", "saw")]
        );
    }

    #[test]
    fn price_distribution_interpolates() {
        let records = vec![
            record("A", "a", 1.0, 1.0, 0),
            record("A", "b", 2.0, 1.0, 0),
            record("A", "c", 3.0, 1.0, 0),
            record("A", "d", 4.0, 1.0, 0),
        ];
        let rows = ReportFilter::default().apply(&records);
        let dist = &price_distribution(&rows)[0];
        assert_eq!(dist.min, 1.0);
        assert_eq!(dist.q1, 1.75);
        assert_eq!(dist.median, 2.5);
        assert_eq!(dist.q3, 3.25);
        assert_eq!(dist.max, 4.0);
    }

    #[test]
    fn filter_limits_rows() {
        let records = sample();
        let options = ReportOptions {
            filter: ReportFilter {
                category: Some("Tools".to_string()),
                min_price: Some(10.0),
                ..ReportFilter::default()
            },
            ..ReportOptions::default()
        };
        let report = Report::build(&records, &options);

        assert_eq!(report.rows, 2);
        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].average_price, 30.0);
    }

    #[test]
    fn text_rendering_lists_every_category() {
        let report = Report::build(&sample(), &ReportOptions::default());
        let text = report.render_text();
        for category in ["Camping", "Lighting", "Tools"] {
            assert!(text.contains(category));
        }
        assert!(text.contains("torch (300 reviews)"));
    }

    #[test]
    fn empty_batch_reports_nothing() {
        let report = Report::build(&[], &ReportOptions::default());
        assert_eq!(report.rows, 0);
        assert!(report.summaries.is_empty());
        assert!(report.price_distribution.is_empty());
    }
}
