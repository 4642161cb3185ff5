//! Store trait for point lookups against the daily metrics table.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{EntityId, MetricRecord},
};

/// Read-only access to the `daily_metrics` table.
///
/// Implementations serve exact-key point lookups only and never write.
#[async_trait]
pub trait MetricStore: Send + Sync + Debug {
    /// Returns the name of this store backend (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Fetches the row for `(entity_id, date)`.
    ///
    /// Returns `Ok(Some(record))` if the row exists and `Ok(None)` if it does not.
    /// A missing row is not an error.
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`](crate::LookupError::StoreUnavailable)
    /// if the store cannot be reached or the query fails.
    async fn fetch(&self, entity_id: EntityId, date: NaiveDate) -> Result<Option<MetricRecord>>;
}
