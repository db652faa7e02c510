//! `SQLite`-backed report store.
//!
//! Each report is one row; `likes` and `rates` are stored as JSON arrays.
//! All access goes through a single connection behind a mutex, and
//! conditional writes run in an immediate transaction so the revision check
//! and the replacement cannot interleave with another writer. The async
//! [`ReportStore`] methods run the blocking calls on tokio's blocking pool.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::report::{Report, ReportId, UserId};

use super::schema::REPORT_COLUMNS;
use super::{migrations, sort_feed, ConditionalWrite, ReportStore, StoreStats, StoredReport};

/// Report store on a local `SQLite` database.
///
/// Clones share the same connection.
#[derive(Debug, Clone)]
pub struct SqliteReportStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportStore {
    /// Open or create a report database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening report database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Report database opened at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("report database lock poisoned"))
    }

    /// Run `op` against a clone of this store on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| Error::internal(format!("report database task failed: {e}")))?
    }

    /// Get a report by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: &ReportId) -> Result<Option<Report>> {
        let conn = self.lock()?;
        select_one(&conn, id)
    }

    /// Get every report, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn all(&self) -> Result<Vec<Report>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY timestamp DESC, report_id ASC"
        ))?;
        let mut reports = stmt
            .query_map([], row_to_report)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        sort_feed(&mut reports);
        Ok(reports)
    }

    /// Replace (or create) the row for `report.id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert(&self, report: &Report) -> Result<()> {
        let conn = self.lock()?;
        replace_row(&conn, report)?;
        debug!("Replaced report {}", report.id);
        Ok(())
    }

    /// Replace the row for `report.id` only if its revision is `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReportNotFound`] if there is no such row, or an error
    /// if the database operation fails.
    pub fn replace_if(&self, report: &Report, expected: &str) -> Result<ConditionalWrite> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = select_one(&tx, &report.id)?
            .ok_or_else(|| Error::report_not_found(report.id.as_str()))?;
        if current.revision()? != expected {
            debug!("Stale conditional write to report {}", report.id);
            return Ok(ConditionalWrite::Stale);
        }

        replace_row(&tx, report)?;
        tx.commit()?;
        debug!("Conditionally replaced report {}", report.id);
        Ok(ConditionalWrite::Written)
    }

    /// Insert a new report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PreconditionViolation`] if the id is already taken, or
    /// an error if the database operation fails.
    pub fn insert(&self, report: &Report) -> Result<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            r"
            INSERT OR IGNORE INTO reports
                (report_id, address, timestamp, report_image, likes, rates, rating)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                report.id.as_str(),
                report.address,
                report.timestamp.timestamp(),
                report.image_ref,
                serde_json::to_string(&report.likes)?,
                serde_json::to_string(&report.rates)?,
                report.rating,
            ],
        )?;

        if affected == 0 {
            return Err(Error::precondition(format!(
                "report '{}' already exists",
                report.id
            )));
        }
        info!("Inserted report {}", report.id);
        Ok(())
    }

    /// Count stored reports.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Aggregate statistics about the stored feed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn compute_stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let (total_reports, total_likes, total_ratings, oldest, newest): (
            i64,
            i64,
            i64,
            Option<i64>,
            Option<i64>,
        ) = conn.query_row(
            r"
            SELECT COUNT(*),
                   COALESCE(SUM(json_array_length(likes)), 0),
                   COALESCE(SUM(json_array_length(rates)), 0),
                   MIN(timestamp),
                   MAX(timestamp)
            FROM reports
            ",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(StoreStats {
            total_reports: u64::try_from(total_reports).unwrap_or(0),
            total_likes: u64::try_from(total_likes).unwrap_or(0),
            total_ratings: u64::try_from(total_ratings).unwrap_or(0),
            oldest_report: oldest.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            newest_report: newest.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn fetch_all_reports(&self) -> Result<Vec<Report>> {
        self.blocking(Self::all).await
    }

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>> {
        let id = id.clone();
        self.blocking(move |store| store.get(&id)?.map(StoredReport::new).transpose())
            .await
    }

    async fn write_report(&self, report: &Report) -> Result<()> {
        let report = report.clone();
        self.blocking(move |store| store.upsert(&report)).await
    }

    async fn write_report_if(
        &self,
        report: &Report,
        expected_revision: &str,
    ) -> Result<ConditionalWrite> {
        let report = report.clone();
        let expected_revision = expected_revision.to_string();
        self.blocking(move |store| store.replace_if(&report, &expected_revision))
            .await
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let report = report.clone();
        self.blocking(move |store| store.insert(&report)).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.blocking(Self::compute_stats).await
    }
}

fn select_one(conn: &Connection, id: &ReportId) -> Result<Option<Report>> {
    let report = conn
        .query_row(
            &format!("SELECT {REPORT_COLUMNS} FROM reports WHERE report_id = ?1"),
            [id.as_str()],
            row_to_report,
        )
        .optional()?;
    Ok(report)
}

fn replace_row(conn: &Connection, report: &Report) -> Result<()> {
    conn.execute(
        r"
        INSERT OR REPLACE INTO reports
            (report_id, address, timestamp, report_image, likes, rates, rating, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ",
        params![
            report.id.as_str(),
            report.address,
            report.timestamp.timestamp(),
            report.image_ref,
            serde_json::to_string(&report.likes)?,
            serde_json::to_string(&report.rates)?,
            report.rating,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Convert a database row to a Report.
fn row_to_report(row: &rusqlite::Row) -> rusqlite::Result<Report> {
    let id: String = row.get(0)?;
    let address: String = row.get(1)?;
    let secs: i64 = row.get(2)?;
    let image_ref: String = row.get(3)?;
    let likes = parse_users(row, 4)?;
    let rates = parse_users(row, 5)?;
    let rating: f64 = row.get(6)?;

    let timestamp =
        DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(2, secs))?;

    Ok(Report {
        id: ReportId::new(id),
        address,
        timestamp,
        image_ref,
        likes,
        rates,
        rating,
    })
}

fn parse_users(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<UserId>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
