//! In-memory store implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use mcapdb_core::{EntityId, LookupError, MetricRecord, MetricStore, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Key for stored rows.
type RowKey = (EntityId, NaiveDate);

/// Simple in-memory store for testing and development.
///
/// Rows live in a `RwLock`-protected `HashMap`. The store counts every `fetch`
/// call and can be switched into a failing mode to simulate an unreachable
/// database.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<RowKey, MetricRecord>>,
    fetches: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row while building the store.
    #[must_use]
    pub fn with_record(mut self, record: MetricRecord) -> Self {
        self.rows
            .get_mut()
            .insert((record.entity_id, record.date), record);
        self
    }

    /// Insert or replace a row.
    pub async fn insert(&self, record: MetricRecord) {
        let mut rows = self.rows.write().await;
        rows.insert((record.entity_id, record.date), record);
    }

    /// Number of `fetch` calls served so far, including failed ones.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Make every subsequent `fetch` fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    #[instrument(skip(self), fields(entity_id = %entity_id, date = %date))]
    async fn fetch(&self, entity_id: EntityId, date: NaiveDate) -> Result<Option<MetricRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }

        let rows = self.rows.read().await;
        match rows.get(&(entity_id, date)) {
            Some(record) => {
                debug!("Found metrics row");
                Ok(Some(record.clone()))
            }
            None => {
                debug!("No metrics row found");
                Ok(None)
            }
        }
    }
}
