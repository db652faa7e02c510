//! Record store contract for geofeed.
//!
//! The engagement core never talks to a concrete database. It consumes the
//! [`ReportStore`] trait, which models a bag of independent documents keyed by
//! report id, each replaced wholesale on write. Two implementations ship with
//! the crate: [`SqliteReportStore`] and [`MemoryReportStore`].

pub mod memory;
pub mod migrations;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::report::{Report, ReportId};

pub use memory::MemoryReportStore;
pub use sqlite::SqliteReportStore;

/// A report as currently stored, with its revision token.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    /// The stored document.
    pub report: Report,
    /// Token identifying this exact version of the document.
    pub revision: String,
}

impl StoredReport {
    /// Pair a report with its computed revision token.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized.
    pub fn new(report: Report) -> Result<Self> {
        let revision = report.revision()?;
        Ok(Self { report, revision })
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionalWrite {
    /// The stored revision matched and the document was replaced.
    Written,
    /// Someone else wrote first; nothing was changed.
    Stale,
}

/// Aggregate statistics about the stored feed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of reports stored.
    pub total_reports: u64,
    /// Sum of like counts over all reports.
    pub total_likes: u64,
    /// Sum of rating counts over all reports.
    pub total_ratings: u64,
    /// Creation time of the oldest report.
    pub oldest_report: Option<DateTime<Utc>>,
    /// Creation time of the newest report.
    pub newest_report: Option<DateTime<Utc>>,
}

/// Persistence contract for reports.
///
/// Implementations must be safe to share between tasks. Writes are full
/// document replacements keyed by `report.id`.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Fetch every report, newest first.
    async fn fetch_all_reports(&self) -> Result<Vec<Report>>;

    /// Fetch one report with its revision token.
    async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>>;

    /// Replace the stored document with `report` (last writer wins).
    async fn write_report(&self, report: &Report) -> Result<()>;

    /// Replace the stored document only if it is still at `expected_revision`.
    ///
    /// Returns [`crate::Error::ReportNotFound`] if the document does not exist.
    async fn write_report_if(
        &self,
        report: &Report,
        expected_revision: &str,
    ) -> Result<ConditionalWrite>;

    /// Create a new report. Fails if the id is taken.
    async fn insert_report(&self, report: &Report) -> Result<()>;

    /// Aggregate statistics about the stored feed.
    async fn stats(&self) -> Result<StoreStats>;
}

pub(crate) fn sort_feed(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}
