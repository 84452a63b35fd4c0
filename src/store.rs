//! Relational sink for cleaned products and the SQL side of the report.

use crate::models::CleanedRecord;
use crate::report::{CategorySummary, ReviewedProduct};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// Destination for cleaned product batches
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Create the `Products` table if it does not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Insert a batch, returning the number of rows written
    async fn insert_batch(&self, records: &[CleanedRecord]) -> Result<u64>;
}

/// SQLite implementation of [`ProductSink`]
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url`
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL {}", database_url))?
            .create_if_missing(true);
        // An in-memory database only lives as long as its single connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}", database_url))?;
        Ok(Self::new(pool))
    }

    /// Per-category aggregates computed by the database
    pub async fn category_summaries(&self) -> Result<Vec<CategorySummary>> {
        let rows = sqlx::query(
            r#"
            SELECT category,
                   COUNT(*) AS product_count,
                   AVG(price_raw) AS average_price,
                   AVG(rating_raw) AS average_rating,
                   100.0 * SUM(CASE WHEN reviews_raw > 0 THEN 1 ELSE 0 END) / COUNT(*) AS reviewed_percentage
            FROM Products
            GROUP BY category
            ORDER BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query category summaries")?;

        rows.iter()
            .map(|r| -> Result<CategorySummary> {
                Ok(CategorySummary {
                    category: r.try_get("category")?,
                    product_count: r.try_get::<i64, _>("product_count")? as usize,
                    average_price: r.try_get("average_price")?,
                    average_rating: r.try_get("average_rating")?,
                    reviewed_percentage: r.try_get("reviewed_percentage")?,
                })
            })
            .collect()
    }

    /// Most reviewed products across all categories
    pub async fn top_reviewed(&self, limit: usize) -> Result<Vec<ReviewedProduct>> {
        let rows = sqlx::query(
            r#"
            SELECT category, name, reviews_raw
            FROM Products
            WHERE reviews_raw > 0
            ORDER BY reviews_raw DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query top reviewed products")?;

        rows.iter()
            .map(|r| -> Result<ReviewedProduct> {
                Ok(ReviewedProduct {
                    category: r.try_get("category")?,
                    name: r.try_get("name")?,
                    reviews: u64::try_from(r.try_get::<i64, _>("reviews_raw")?)
                        .context("Negative review count in Products")?,
                })
            })
            .collect()
    }

    /// Number of rows currently stored
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM Products")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count products")?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ProductSink for SqliteProductStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS Products (
                category TEXT NOT NULL,
                name TEXT NOT NULL,
                price_raw REAL NOT NULL,
                rating_raw REAL NOT NULL,
                reviews_raw INTEGER NOT NULL,
                url TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create Products table")?;
        Ok(())
    }

    async fn insert_batch(&self, records: &[CleanedRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for record in records {
            let reviews = i64::try_from(record.reviews_raw).with_context(|| {
                format!(
                    "Review count {} of {:?} does not fit an INTEGER column",
                    record.reviews_raw, record.name
                )
            })?;
            sqlx::query(
                r#"
                INSERT INTO Products (category, name, price_raw, rating_raw, reviews_raw, url)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.category)
            .bind(&record.name)
            .bind(record.price_raw)
            .bind(record.rating_raw)
            .bind(reviews)
            .bind(&record.url)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert product {:?}", record.name))?;
        }

        tx.commit().await.context("Failed to commit products")?;
        info!("Inserted {} rows into Products", records.len());
        Ok(records.len() as u64)
    }
}
