//! The process-wide lookup context and its spreadsheet-facing functions.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use mcapdb_core::{
    Attribute, CellInput, CellValue, EntityId, LookupResult, MetricStore, Result,
};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStats, CachedValue, LookupCache};
use crate::call_log::{CallLog, CallOutcome, CallRecord};

#[cfg(feature = "sqlite")]
use crate::call_log::FileCallLog;
#[cfg(feature = "sqlite")]
use crate::config::LookupConfig;
#[cfg(feature = "sqlite")]
use mcapdb_store::SqliteStore;
#[cfg(feature = "sqlite")]
use tracing::info;

/// Shared state behind the spreadsheet functions: one store, one cache, one call log.
///
/// Every lookup validates its arguments, consults the cache, falls back to the
/// store on a miss and records exactly one [`CallRecord`] before returning. Errors
/// never escape a lookup; they come back as sentinel cells.
///
/// # Example
///
/// ```rust,ignore
/// use mcapdb::{LookupConfig, LookupContext};
///
/// let config = LookupConfig::load("config.toml")?;
/// let ctx = LookupContext::open(&config)?;
///
/// let mcap = ctx.lookup_mcap(1234, "2024-01-15").await;
/// println!("{mcap}");
///
/// ctx.shutdown()?;
/// ```
#[derive(Debug)]
pub struct LookupContext<S> {
    store: S,
    cache: LookupCache,
    log: Arc<dyn CallLog>,
    date_format: String,
}

impl<S: MetricStore> LookupContext<S> {
    /// Create a context over an already opened store.
    #[must_use]
    pub fn new(
        store: S,
        log: Arc<dyn CallLog>,
        cache_size: usize,
        date_format: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache: LookupCache::new(cache_size),
            log,
            date_format: date_format.into(),
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The lookup cache.
    pub const fn cache(&self) -> &LookupCache {
        &self.cache
    }

    /// Snapshot of cache counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Market capitalization of `entity_id` on `date`.
    pub async fn lookup_mcap(
        &self,
        entity_id: impl Into<CellInput>,
        date: impl Into<CellInput>,
    ) -> CellValue {
        self.lookup_attribute("lookup_mcap", Attribute::Mcap, entity_id.into(), date.into())
            .await
    }

    /// Sector of `entity_id` on `date`.
    pub async fn lookup_sector(
        &self,
        entity_id: impl Into<CellInput>,
        date: impl Into<CellInput>,
    ) -> CellValue {
        self.lookup_attribute("lookup_sector", Attribute::Sector, entity_id.into(), date.into())
            .await
    }

    /// Market capitalization category of `entity_id` on `date`.
    pub async fn lookup_mcap_category(
        &self,
        entity_id: impl Into<CellInput>,
        date: impl Into<CellInput>,
    ) -> CellValue {
        self.lookup_attribute(
            "lookup_mcap_category",
            Attribute::McapCategory,
            entity_id.into(),
            date.into(),
        )
        .await
    }

    /// Company name of `entity_id` on `date`.
    pub async fn lookup_company_name(
        &self,
        entity_id: impl Into<CellInput>,
        date: impl Into<CellInput>,
    ) -> CellValue {
        self.lookup_attribute(
            "lookup_company_name",
            Attribute::CompanyName,
            entity_id.into(),
            date.into(),
        )
        .await
    }

    /// Any attribute of `entity_id` on `date`, selected by column name.
    ///
    /// `field` must name one of the retrievable attributes (`company_name`,
    /// `sector`, `mcap_category`, `mcap`); anything else is an input error.
    pub async fn lookup(
        &self,
        entity_id: impl Into<CellInput>,
        field: impl Into<CellInput>,
        date: impl Into<CellInput>,
    ) -> CellValue {
        let started = Instant::now();
        let (entity_id, field, date) = (entity_id.into(), field.into(), date.into());

        let request = entity_id.to_entity_id().and_then(|id| {
            let attribute = field.to_attribute()?;
            let date = date.to_date(&self.date_format)?;
            Ok(CacheKey::new(id, date, attribute))
        });

        let arguments = vec![entity_id.to_string(), field.to_string(), date.to_string()];
        self.dispatch("lookup", arguments, request, started).await
    }

    async fn lookup_attribute(
        &self,
        function: &'static str,
        attribute: Attribute,
        entity_id: CellInput,
        date: CellInput,
    ) -> CellValue {
        let started = Instant::now();

        let request = self
            .parse_key(&entity_id, &date)
            .map(|(id, date)| CacheKey::new(id, date, attribute));

        let arguments = vec![entity_id.to_string(), date.to_string()];
        self.dispatch(function, arguments, request, started).await
    }

    fn parse_key(&self, entity_id: &CellInput, date: &CellInput) -> Result<(EntityId, NaiveDate)> {
        let entity_id = entity_id.to_entity_id()?;
        let date = date.to_date(&self.date_format)?;
        Ok((entity_id, date))
    }

    async fn dispatch(
        &self,
        function: &'static str,
        arguments: Vec<String>,
        request: Result<CacheKey>,
        started: Instant,
    ) -> CellValue {
        let call = PendingCall {
            log: &*self.log,
            function,
            arguments,
            started,
            outcome: None,
        };

        let result = match request {
            Ok(key) => self.resolve(key).await,
            Err(e) => {
                debug!(function, error = %e, "Rejected call");
                e.into()
            }
        };

        call.finish(CallOutcome::from(&result));
        result.into_cell()
    }

    async fn resolve(&self, key: CacheKey) -> LookupResult {
        let store = &self.store;
        let cached = self
            .cache
            .get_or_compute(key, || async move {
                let record = store.fetch(key.entity_id, key.date).await?;
                Ok(record.map_or(CachedValue::Absent, |r| {
                    CachedValue::Found(r.attribute(key.attribute))
                }))
            })
            .await;

        match cached {
            Ok(CachedValue::Found(value)) => LookupResult::Value(value),
            Ok(CachedValue::Absent) => LookupResult::NotFound,
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    entity_id = %key.entity_id,
                    date = %key.date,
                    error = %e,
                    "Store query failed"
                );
                e.into()
            }
        }
    }
}

/// One in-flight call. The record is written when this is dropped, so a lookup
/// whose future is abandoned before completion is still logged.
struct PendingCall<'a> {
    log: &'a dyn CallLog,
    function: &'static str,
    arguments: Vec<String>,
    started: Instant,
    outcome: Option<CallOutcome>,
}

impl PendingCall<'_> {
    fn finish(mut self, outcome: CallOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            warn!(function = self.function, "Call cancelled before completion");
            CallOutcome::Failure("cancelled".to_string())
        });
        let record = CallRecord::new(
            self.function,
            std::mem::take(&mut self.arguments),
            self.started.elapsed(),
            outcome,
        );
        self.log.record(&record);
    }
}

#[cfg(feature = "sqlite")]
impl LookupContext<SqliteStore> {
    /// Open the store, check its schema, allocate the cache and open the call log.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the store cannot be
    /// opened or lacks the expected table, or the call log cannot be created.
    pub fn open(config: &LookupConfig) -> Result<Self> {
        config.validate()?;

        let store = SqliteStore::open(&config.db_path, config.busy_timeout())?;
        store.verify_schema()?;

        let log = FileCallLog::open(
            &config.log_path,
            config.log_max_bytes,
            config.log_backup_count,
        )?;

        info!(
            db_path = %config.db_path.display(),
            log_path = %config.log_path.display(),
            cache_size = config.cache_size,
            "Lookup context ready"
        );
        Ok(Self::new(
            store,
            Arc::new(log),
            config.cache_size,
            config.date_format.clone(),
        ))
    }

    /// Flush the call log and close the store connection.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be closed cleanly.
    pub fn shutdown(self) -> Result<()> {
        self.log.flush();
        self.store.close()?;
        info!("Lookup context shut down");
        Ok(())
    }
}


#[cfg(all(test, feature = "sqlite"))]
mod sqlite_tests {
    use super::*;
    use mcapdb_core::{MetricRecord, Sentinel};
    use rusqlite::Connection;
    use std::path::Path;

    fn provision(path: &Path) {
        let store = SqliteStore::create(path).unwrap();
        store
            .insert(
                &MetricRecord::new(
                    EntityId::new(1234).unwrap(),
                    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                )
                .with_company_name("Acme Ltd")
                .with_sector("Industrials")
                .with_mcap_category("Large Cap")
                .with_mcap(5000.0),
            )
            .unwrap();
        store.close().unwrap();
    }

    fn config(dir: &Path) -> LookupConfig {
        LookupConfig {
            db_path: dir.join("mcap.db"),
            log_path: dir.join("query_log.txt"),
            cache_size: 64,
            ..LookupConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_lookup_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        provision(&config.db_path);

        let ctx = LookupContext::open(&config).unwrap();
        assert_eq!(ctx.lookup_mcap(1234, "2024-01-15").await, CellValue::Number(5000.0));
        assert_eq!(ctx.lookup_mcap(1234, "2024-01-15").await, CellValue::Number(5000.0));
        assert_eq!(
            ctx.lookup_sector(9999, "2024-01-15").await.sentinel(),
            Some(Sentinel::NoData)
        );
        assert_eq!(
            ctx.lookup_mcap("abc", "2024-01-15").await.sentinel(),
            Some(Sentinel::InputError)
        );
        assert_eq!(ctx.cache_stats().await.hits, 1);
        ctx.shutdown().unwrap();

        let log = std::fs::read_to_string(&config.log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("| INFO | lookup_mcap | P: (1234, 2024-01-15) |"));
        assert!(lines[2].ends_with("Status: FAILURE | Error: Data not found."));
        assert!(lines[3].contains("| ERROR | lookup_mcap | P: (abc, 2024-01-15) |"));
    }

    #[tokio::test]
    async fn test_locked_store_yields_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        provision(&config.db_path);
        let ctx = LookupContext::open(&config).unwrap();

        let writer = Connection::open(&config.db_path).unwrap();
        writer
            .execute_batch(
                "BEGIN EXCLUSIVE; UPDATE daily_metrics SET mcap = 1.0 WHERE entity_id = 1234;",
            )
            .unwrap();

        let started = Instant::now();
        let value = ctx.lookup_mcap(1234, "2024-01-15").await;
        assert_eq!(value.sentinel(), Some(Sentinel::QueryError));
        assert_eq!(value.to_string(), "#QUERY_ERROR");
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
        assert!(ctx.cache().is_empty().await);

        writer.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(ctx.lookup_mcap(1234, "2024-01-15").await, CellValue::Number(5000.0));
        ctx.shutdown().unwrap();

        let log = std::fs::read_to_string(&config.log_path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Status: FAILURE | Error: Database error:"));
        assert!(lines[1].ends_with("Status: SUCCESS"));
    }

    #[test]
    fn test_open_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let err = LookupContext::open(&config(dir.path())).unwrap_err();
        assert!(matches!(err, mcapdb_core::LookupError::StoreUnavailable(_)));
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = LookupConfig {
            cache_size: 0,
            ..config(dir.path())
        };
        provision(&config.db_path);
        let err = LookupContext::open(&config).unwrap_err();
        assert!(matches!(err, mcapdb_core::LookupError::Config(_)));
    }
}
