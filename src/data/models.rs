//! Row types for the price catalog.

use chrono::NaiveDate;
use serde::Serialize;
use ts_rs::TS;

/// A food item tracked for purchasing.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Ingredient {
    pub id: i32,
    pub name: String,
    /// Default unit of measure, used when an extracted price carries none.
    pub unit: String,
}

/// A supplier prices are sourced from.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Vendor {
    pub id: i32,
    pub name: String,
}

/// Replacement automatic price for one (ingredient, vendor) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAutomaticPrice {
    pub ingredient_id: i32,
    pub vendor_id: i32,
    pub price: f64,
    pub unit: String,
    pub recorded_on: NaiveDate,
}

/// An automatic price joined with its ingredient and vendor names.
#[derive(Debug, Clone, PartialEq, Serialize, TS, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AutomaticPrice {
    pub ingredient_id: i32,
    pub ingredient_name: String,
    pub vendor_id: i32,
    pub vendor_name: String,
    pub price: f64,
    pub unit: String,
    #[ts(type = "string")]
    pub recorded_on: NaiveDate,
}
