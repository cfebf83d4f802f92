//! Price catalog access for the refresh pipeline.
//!
//! Every statement that touches `price_records` here is restricted to
//! `center_id IS NULL`: manually entered, center-scoped prices are never
//! read, replaced, or deleted by this module.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::{Duration, Instant};

use crate::data::models::{AutomaticPrice, Ingredient, NewAutomaticPrice, Vendor};
use crate::utils::log_if_slow;

const SLOW_QUERY_THRESHOLD: Duration = Duration::from_millis(500);

#[async_trait]
pub trait PriceCatalog: Send + Sync {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>>;

    async fn list_vendors(&self) -> Result<Vec<Vendor>>;

    /// Replace the automatic price for the pair in `price`.
    ///
    /// Any existing automatic record for the same (ingredient, vendor) is
    /// removed first, so repeated refreshes never accumulate history.
    async fn replace_automatic_price(&self, price: &NewAutomaticPrice) -> Result<()>;

    async fn list_automatic_prices(&self) -> Result<Vec<AutomaticPrice>>;
}

/// [`PriceCatalog`] backed by Postgres.
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PriceCatalog for PgCatalog {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        sqlx::query_as::<_, Ingredient>(
            "SELECT id, name, unit FROM ingredients ORDER BY lower(name), id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ingredients")
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>> {
        sqlx::query_as::<_, Vendor>("SELECT id, name FROM vendors ORDER BY lower(name), id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list vendors")
    }

    async fn replace_automatic_price(&self, price: &NewAutomaticPrice) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            "DELETE FROM price_records \
             WHERE ingredient_id = $1 AND vendor_id = $2 AND center_id IS NULL",
        )
        .bind(price.ingredient_id)
        .bind(price.vendor_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete previous automatic price")?;

        sqlx::query(
            "INSERT INTO price_records (ingredient_id, vendor_id, center_id, price, unit, recorded_on) \
             VALUES ($1, $2, NULL, CAST($3 AS NUMERIC(10, 2)), $4, $5)",
        )
        .bind(price.ingredient_id)
        .bind(price.vendor_id)
        .bind(price.price)
        .bind(&price.unit)
        .bind(price.recorded_on)
        .execute(&mut *tx)
        .await
        .context("Failed to insert automatic price")?;

        tx.commit().await.context("Failed to commit automatic price")?;
        log_if_slow(start, SLOW_QUERY_THRESHOLD, "replace automatic price");
        Ok(())
    }

    async fn list_automatic_prices(&self) -> Result<Vec<AutomaticPrice>> {
        sqlx::query_as::<_, AutomaticPrice>(
            "SELECT p.ingredient_id, i.name AS ingredient_name, \
                    p.vendor_id, v.name AS vendor_name, \
                    p.price::FLOAT8 AS price, p.unit, p.recorded_on \
             FROM price_records p \
             JOIN ingredients i ON i.id = p.ingredient_id \
             JOIN vendors v ON v.id = p.vendor_id \
             WHERE p.center_id IS NULL \
             ORDER BY lower(i.name), lower(v.name)",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list automatic prices")
    }
}
