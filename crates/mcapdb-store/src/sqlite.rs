//! SQLite-based store implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use mcapdb_core::{Attribute, EntityId, LookupError, MetricRecord, MetricStore, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

/// Table holding one row per `(entity_id, date)`.
pub const TABLE_NAME: &str = "daily_metrics";

/// One-time setup script for the store file.
///
/// The runtime never executes this; it documents the layout the store expects
/// and is used to provision fixture databases.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS daily_metrics (
    entity_id INTEGER NOT NULL,
    company_name TEXT,
    sector TEXT,
    mcap_category TEXT,
    date TEXT NOT NULL,
    mcap REAL,
    PRIMARY KEY (entity_id, date)
);
CREATE INDEX IF NOT EXISTS idx_daily_metrics_entity_date
    ON daily_metrics(entity_id, date);
";

const SELECT_ROW: &str = "SELECT company_name, sector, mcap_category, mcap
     FROM daily_metrics
     WHERE entity_id = ?1 AND date = ?2";

/// Read-only SQLite store for daily company metrics.
///
/// A single connection is opened once and shared; access is serialized through a
/// `Mutex`. Every query binds caller values as parameters.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open the store file at the given path in read-only mode.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    /// * `busy_timeout` - Upper bound on how long a query waits for a locked database
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if the file does not exist or cannot be opened.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            LookupError::StoreUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        })
    }

    /// Create (or open) a writable store file and provision the schema.
    ///
    /// Used to build fixture databases; lookups should go through [`SqliteStore::open`].
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if the file cannot be created or schema creation fails.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            LookupError::StoreUnavailable(format!("cannot create {}: {e}", path.display()))
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Create a writable in-memory store with the schema provisioned.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Run the [`SCHEMA`] setup script.
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if the connection is read-only or the script fails.
    pub fn create_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        debug!("SQLite store schema initialized");
        Ok(())
    }

    /// Insert or replace a row.
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if the connection is read-only or the write fails.
    pub fn insert(&self, record: &MetricRecord) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO daily_metrics
             (entity_id, company_name, sector, mcap_category, date, mcap)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.entity_id.get(),
                record.company_name,
                record.sector,
                record.mcap_category,
                record.date.format("%Y-%m-%d").to_string(),
                record.mcap
            ],
        )
        .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Returns the path of the store file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the metrics table exists and exposes every required column.
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if the table or a column is missing.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn verify_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info(?1)")
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        let columns = stmt
            .query_map(params![TABLE_NAME], |row| row.get::<_, String>(0))
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        if columns.is_empty() {
            return Err(LookupError::StoreUnavailable(format!(
                "table {TABLE_NAME} not found"
            )));
        }

        let missing: Vec<&str> = ["entity_id", "date"]
            .into_iter()
            .chain(Attribute::ALL.iter().map(|a| a.column()))
            .filter(|required| !columns.iter().any(|c| c.eq_ignore_ascii_case(required)))
            .collect();
        if !missing.is_empty() {
            return Err(LookupError::StoreUnavailable(format!(
                "table {TABLE_NAME} is missing columns: {}",
                missing.join(", ")
            )));
        }

        debug!(columns = columns.len(), "Store schema verified");
        Ok(())
    }

    /// Close the underlying connection.
    ///
    /// # Errors
    /// Returns [`LookupError::StoreUnavailable`] if SQLite refuses to close the connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;
        conn.close()
            .map_err(|(_, e)| LookupError::StoreUnavailable(e.to_string()))?;
        debug!(path = %self.path.display(), "Closed SQLite store");
        Ok(())
    }
}

#[async_trait]
impl MetricStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self), fields(entity_id = %entity_id, date = %date))]
    async fn fetch(&self, entity_id: EntityId, date: NaiveDate) -> Result<Option<MetricRecord>> {
        let date_str = date.format("%Y-%m-%d").to_string();

        let conn = self
            .conn
            .lock()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        let mut stmt = conn
            .prepare_cached(SELECT_ROW)
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        let result = stmt
            .query_row(params![entity_id.get(), date_str], |row| {
                Ok(MetricRecord {
                    entity_id,
                    date,
                    company_name: row.get(0)?,
                    sector: row.get(1)?,
                    mcap_category: row.get(2)?,
                    mcap: row.get(3)?,
                })
            })
            .optional()
            .map_err(|e| LookupError::StoreUnavailable(e.to_string()))?;

        match &result {
            Some(_) => debug!("Found metrics row"),
            None => debug!("No metrics row found"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_millis(50);

    fn fixture() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcap.db");
        let store = SqliteStore::create(&path).unwrap();
        store
            .insert(
                &MetricRecord::new(EntityId::new(1234).unwrap(), date(2024, 1, 15))
                    .with_company_name("Acme Ltd")
                    .with_sector("Industrials")
                    .with_mcap_category("Large Cap")
                    .with_mcap(5000.0),
            )
            .unwrap();
        store
            .insert(&MetricRecord::new(EntityId::new(77).unwrap(), date(2024, 1, 15)))
            .unwrap();
        store.close().unwrap();
        (dir, path)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_existing_row() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();

        let record = store
            .fetch(EntityId::new(1234).unwrap(), date(2024, 1, 15))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.company_name.as_deref(), Some("Acme Ltd"));
        assert_eq!(record.sector.as_deref(), Some("Industrials"));
        assert_eq!(record.mcap_category.as_deref(), Some("Large Cap"));
        assert_eq!(record.mcap, Some(5000.0));
    }

    #[tokio::test]
    async fn test_fetch_null_columns() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();

        let record = store
            .fetch(EntityId::new(77).unwrap(), date(2024, 1, 15))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record, MetricRecord::new(record.entity_id, record.date));
    }

    #[tokio::test]
    async fn test_fetch_missing_row() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();

        let missing_entity = store
            .fetch(EntityId::new(9999).unwrap(), date(2024, 1, 15))
            .await
            .unwrap();
        assert!(missing_entity.is_none());

        let missing_date = store
            .fetch(EntityId::new(1234).unwrap(), date(2024, 1, 16))
            .await
            .unwrap();
        assert!(missing_date.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        let id = EntityId::new(5).unwrap();
        store.verify_schema().unwrap();

        assert!(store.fetch(id, date(2024, 3, 1)).await.unwrap().is_none());

        store
            .insert(&MetricRecord::new(id, date(2024, 3, 1)).with_sector("Energy"))
            .unwrap();
        store
            .insert(&MetricRecord::new(id, date(2024, 3, 1)).with_sector("Utilities"))
            .unwrap();

        let record = store.fetch(id, date(2024, 3, 1)).await.unwrap().unwrap();
        assert_eq!(record.sector.as_deref(), Some("Utilities"));
        assert_eq!(record.mcap, None);
    }

    #[tokio::test]
    async fn test_locked_store_fails_within_busy_timeout() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();

        let writer = Connection::open(&path).unwrap();
        writer
            .execute_batch(
                "BEGIN EXCLUSIVE; UPDATE daily_metrics SET mcap = 1.0 WHERE entity_id = 1234;",
            )
            .unwrap();

        let started = std::time::Instant::now();
        let err = store
            .fetch(EntityId::new(1234).unwrap(), date(2024, 1, 15))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, LookupError::StoreUnavailable(_)));
        assert!(err.to_string().contains("locked"));
        assert!(elapsed >= TIMEOUT / 2, "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "returned after {elapsed:?}");

        writer.execute_batch("ROLLBACK;").unwrap();
        let record = store
            .fetch(EntityId::new(1234).unwrap(), date(2024, 1, 15))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.mcap, Some(5000.0));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SqliteStore::open(dir.path().join("absent.db"), TIMEOUT).unwrap_err();
        assert!(matches!(err, LookupError::StoreUnavailable(_)));
    }

    #[test]
    fn test_verify_schema() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();
        store.verify_schema().unwrap();
        store.close().unwrap();
    }

    #[test]
    fn test_verify_schema_rejects_incomplete_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE daily_metrics (entity_id INTEGER, date TEXT, mcap REAL);")
            .unwrap();
        drop(conn);

        let store = SqliteStore::open(&path, TIMEOUT).unwrap();
        let err = store.verify_schema().unwrap_err();
        assert!(err.to_string().contains("company_name"));
    }

    #[test]
    fn test_verify_schema_rejects_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (x INTEGER);")
            .unwrap();

        let store = SqliteStore::open(&path, TIMEOUT).unwrap();
        assert!(store.verify_schema().is_err());
    }

    #[tokio::test]
    async fn test_store_is_read_only() {
        let (_dir, path) = fixture();
        let store = SqliteStore::open(&path, TIMEOUT).unwrap();
        let record = MetricRecord::new(EntityId::new(9).unwrap(), date(2024, 1, 15));
        assert!(matches!(
            store.insert(&record),
            Err(LookupError::StoreUnavailable(_))
        ));

        let conn = store.conn.lock().unwrap();
        let result = conn.execute("DELETE FROM daily_metrics", []);
        assert!(result.is_err());
    }
}
