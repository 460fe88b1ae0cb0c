#![forbid(unsafe_code)]

//! Core domain model and business logic for Nutrilook.
//!
//! This crate provides:
//! - Domain types (foods, nutrients, food-nutrient facts, result rows)
//! - The pooled SQLite schema store and its queries
//! - The nutrient exclusion engine
//! - Ingestion from CSV exports and the FoodData Central API
//! - The dashboard event router

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod store;
pub mod query;
pub mod exclusion;
pub mod csv_import;
pub mod usda;
pub mod ingest;
pub mod dashboard;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::Store;
pub use exclusion::{apply_exclusions, ExclusionEntry, SessionExclusions};
pub use csv_import::{load_csv_dir, ImportSummary};
pub use usda::{FoodPageSource, UsdaClient};
pub use ingest::{ingest_from_api, IngestSummary, PaginationOptions, StopReason};
pub use dashboard::{Dashboard, Event, View};
