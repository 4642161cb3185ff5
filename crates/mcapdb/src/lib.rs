#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached daily company metric lookups for spreadsheet functions.
//!
//! A [`LookupContext`] owns one store, one bounded LRU cache and one call log,
//! and exposes the spreadsheet-facing functions:
//!
//! - [`lookup_mcap`](LookupContext::lookup_mcap)
//! - [`lookup_sector`](LookupContext::lookup_sector)
//! - [`lookup_mcap_category`](LookupContext::lookup_mcap_category)
//! - [`lookup_company_name`](LookupContext::lookup_company_name)
//! - [`lookup`](LookupContext::lookup) - any attribute by column name
//!
//! Every function takes raw cell inputs and returns a single [`CellValue`];
//! failures come back as sentinel cells (`#N/A_DATA`, `#INPUT_ERROR`,
//! `#QUERY_ERROR`) because the host cannot receive structured errors.
//!
//! # Features
//!
//! - `sqlite` (default) - [`LookupContext::open`] over a SQLite store file

// Core types and traits
pub use mcapdb_core::*;

// Store implementations
pub use mcapdb_store::InMemoryStore;
#[cfg(feature = "sqlite")]
pub use mcapdb_store::SqliteStore;

/// Bounded LRU lookup cache.
pub mod cache;
/// Append-only call log.
pub mod call_log;
/// Process configuration.
pub mod config;
/// Diagnostic tracing setup.
pub mod telemetry;

mod context;

pub use cache::{CacheKey, CacheStats, CachedValue, LookupCache};
pub use call_log::{CallLog, CallOutcome, CallRecord, FileCallLog, MemoryCallLog};
pub use config::LookupConfig;
pub use context::LookupContext;
pub use telemetry::init_tracing;
