//! Database queries.

pub mod health;
