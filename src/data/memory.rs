//! In-memory store fakes for unit tests.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::data::kv::{KvEntry, KvStore};
use crate::data::models::{AutomaticPrice, Ingredient, NewAutomaticPrice, Vendor};
use crate::data::prices::PriceCatalog;

#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an entry's write time into the past.
    pub fn backdate(&self, key: &str, by: chrono::Duration) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(key) {
            entry.updated_at -= by;
        }
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get_entry(&self, key: &str) -> Result<Option<KvEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_owned(),
            KvEntry {
                value: value.to_owned(),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn claim(&self, key: &str, value: &str, stale_after: Duration) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = entries.get(key) {
            let stale_after = chrono::Duration::from_std(stale_after).unwrap();
            if existing.value == value && existing.updated_at >= now - stale_after {
                return Ok(false);
            }
        }
        entries.insert(
            key.to_owned(),
            KvEntry {
                value: value.to_owned(),
                updated_at: now,
            },
        );
        Ok(true)
    }
}

/// A stored price row. `center_id` is `Some` for prices entered manually by
/// a center and `None` for automatic ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub id: i64,
    pub ingredient_id: i32,
    pub vendor_id: i32,
    pub center_id: Option<i32>,
    pub price: f64,
    pub unit: String,
    pub recorded_on: NaiveDate,
}

impl PriceRecord {
    pub fn is_automatic(&self) -> bool {
        self.center_id.is_none()
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    pub ingredients: Vec<Ingredient>,
    pub vendors: Vec<Vendor>,
    records: Mutex<Vec<PriceRecord>>,
    /// Ingredient ids whose persist step should fail.
    failing_ingredients: HashSet<i32>,
    fail_listing: bool,
}

impl MemoryCatalog {
    pub fn new(ingredients: Vec<Ingredient>, vendors: Vec<Vendor>) -> Self {
        Self {
            ingredients,
            vendors,
            ..Self::default()
        }
    }

    pub fn with_records(self, records: Vec<PriceRecord>) -> Self {
        *self.records.lock().unwrap() = records;
        self
    }

    pub fn failing_persist_for(mut self, ingredient_id: i32) -> Self {
        self.failing_ingredients.insert(ingredient_id);
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn records(&self) -> Vec<PriceRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn automatic_records(&self) -> Vec<PriceRecord> {
        self.records()
            .into_iter()
            .filter(PriceRecord::is_automatic)
            .collect()
    }

    pub fn manual_records(&self) -> Vec<PriceRecord> {
        self.records()
            .into_iter()
            .filter(|r| !r.is_automatic())
            .collect()
    }
}

#[async_trait]
impl PriceCatalog for MemoryCatalog {
    async fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        if self.fail_listing {
            bail!("ingredient table unavailable");
        }
        Ok(self.ingredients.clone())
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>> {
        Ok(self.vendors.clone())
    }

    async fn replace_automatic_price(&self, price: &NewAutomaticPrice) -> Result<()> {
        if self.failing_ingredients.contains(&price.ingredient_id) {
            bail!("insert rejected for ingredient {}", price.ingredient_id);
        }
        let mut records = self.records.lock().unwrap();
        records.retain(|r| {
            !(r.center_id.is_none()
                && r.ingredient_id == price.ingredient_id
                && r.vendor_id == price.vendor_id)
        });
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        records.push(PriceRecord {
            id: next_id,
            ingredient_id: price.ingredient_id,
            vendor_id: price.vendor_id,
            center_id: None,
            price: price.price,
            unit: price.unit.clone(),
            recorded_on: price.recorded_on,
        });
        Ok(())
    }

    async fn list_automatic_prices(&self) -> Result<Vec<AutomaticPrice>> {
        let name_of_ingredient = |id: i32| {
            self.ingredients
                .iter()
                .find(|i| i.id == id)
                .map(|i| i.name.clone())
                .unwrap_or_default()
        };
        let name_of_vendor = |id: i32| {
            self.vendors
                .iter()
                .find(|v| v.id == id)
                .map(|v| v.name.clone())
                .unwrap_or_default()
        };
        Ok(self
            .automatic_records()
            .into_iter()
            .map(|r| AutomaticPrice {
                ingredient_id: r.ingredient_id,
                ingredient_name: name_of_ingredient(r.ingredient_id),
                vendor_id: r.vendor_id,
                vendor_name: name_of_vendor(r.vendor_id),
                price: r.price,
                unit: r.unit,
                recorded_on: r.recorded_on,
            })
            .collect())
    }
}
