//! Core domain types and logic.

pub mod account;
pub mod benchmark;
pub mod cancel;
pub mod config_validation;
pub mod error;
pub mod executor;
pub mod forecast;
pub mod normalizer;
pub mod performance;
pub mod price_series;
pub mod regression;
pub mod sizing;
pub mod walk_forward;
