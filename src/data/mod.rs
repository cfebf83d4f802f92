//! Database access and row types.

pub mod health;
pub mod kv;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod prices;
