#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for daily company metric lookups.
//!
//! - [`MetricStore`](store::MetricStore) - Point-lookup access to the daily metrics table
//! - [`MetricRecord`](types::MetricRecord) - One row of the table
//! - [`CellInput`](cell::CellInput) / [`CellValue`](cell::CellValue) - Spreadsheet cell boundary

/// Spreadsheet cell boundary types and sentinels.
pub mod cell;
/// Error types for lookup operations.
pub mod error;
/// Store trait for point lookups.
pub mod store;
/// Core data types (EntityId, MetricRecord, Attribute, etc.).
pub mod types;

pub use cell::{CellInput, CellValue, LookupResult, Sentinel};
pub use error::{LookupError, Result};
pub use store::MetricStore;
pub use types::{Attribute, AttributeValue, EntityId, MetricRecord};
