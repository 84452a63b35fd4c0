//! CSV files passed between pipeline stages.

use crate::models::{CleanedRecord, ProductRecord, RawRow};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Write rows with a header line taken from the field names
pub fn write_csv<W: Write, T: Serialize>(writer: W, rows: &[T]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in rows {
        csv.serialize(row).context("Failed to serialize CSV row")?;
    }
    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Read rows by header name; unknown columns are ignored
pub fn read_csv<R: Read, T: DeserializeOwned>(reader: R) -> Result<Vec<T>> {
    let mut csv = csv::Reader::from_reader(reader);
    csv.deserialize()
        .enumerate()
        .map(|(idx, row)| row.with_context(|| format!("Malformed CSV record {}", idx + 1)))
        .collect()
}

fn write_file<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(std::io::BufWriter::new(file), rows)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let rows: Vec<T> = read_csv(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to read {}", path.display()))?;
    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Raw scrape output: `category,name,price_raw,rating_raw,reviews_raw,url`
pub fn write_raw(path: &Path, records: &[ProductRecord]) -> Result<()> {
    write_file(path, records)
}

pub fn read_raw(path: &Path) -> Result<Vec<RawRow>> {
    read_file(path)
}

/// Cleaned output, raw columns plus `price_to_rating,price_to_review`
pub fn write_cleaned(path: &Path, records: &[CleanedRecord]) -> Result<()> {
    write_file(path, records)
}

pub fn read_cleaned(path: &Path) -> Result<Vec<CleanedRecord>> {
    read_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(rating: Option<f64>) -> ProductRecord {
        ProductRecord {
            category: "Sports & Outdoor".to_string(),
            name: "Tent, 2 person \"Ultra\"".to_string(),
            price: "US$1,234.56".to_string(),
            rating,
            reviews: 17,
            url: "https://www.banggood.com/Tent-p-1.html".to_string(),
        }
    }

    #[test]
    fn raw_header_matches_cleaner_columns() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[product(Some(4.5))]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("category,name,price_raw,rating_raw,reviews_raw,url\n"));
    }

    #[test]
    fn raw_rows_read_back_as_text() {
        let mut buf = Vec::new();
        write_csv(&mut buf, &[product(Some(4.5)), product(None)]).unwrap();
        let rows: Vec<RawRow> = read_csv(buf.as_slice()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawRow::from(&product(Some(4.5))));
        assert_eq!(rows[0].name.as_deref(), Some("Tent, 2 person \"Ultra\""));
        assert_eq!(rows[1].rating_raw, None);
    }

    #[test]
    fn missing_columns_default_to_none() {
        let text = "category,name,price_raw\nTools,Drill,$5\n";
        let rows: Vec<RawRow> = read_csv(text.as_bytes()).unwrap();
        assert_eq!(rows[0].price_raw.as_deref(), Some("$5"));
        assert_eq!(rows[0].reviews_raw, None);
        assert_eq!(rows[0].url, None);
    }

    #[test]
    fn cleaned_numbers_survive_round_trip() {
        let records = vec![CleanedRecord {
            category: "Tools".to_string(),
            name: "Drill".to_string(),
            price_raw: 1234.56,
            rating_raw: 13.0 / 3.0,
            reviews_raw: u64::from(u32::MAX) + 7,
            url: String::new(),
            price_to_rating: 0.1 + 0.2,
            price_to_review: 1e-300,
        }];
        let mut buf = Vec::new();
        write_csv(&mut buf, &records).unwrap();
        let back: Vec<CleanedRecord> = read_csv(buf.as_slice()).unwrap();

        assert_eq!(back, records);
        assert_eq!(back[0].rating_raw.to_bits(), records[0].rating_raw.to_bits());
        assert_eq!(back[0].price_to_rating.to_bits(), records[0].price_to_rating.to_bits());
    }

    #[test]
    fn malformed_cleaned_row_is_an_error() {
        let text = concat!(
            "category,name,price_raw,rating_raw,reviews_raw,url,price_to_rating,price_to_review\n",
            "Tools,Drill,abc,4,1,,0,0\n",
        );
        assert!(read_csv::<_, CleanedRecord>(text.as_bytes()).is_err());
    }
}
