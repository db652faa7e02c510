//! In-process report store.
//!
//! Keeps every report in a map behind an async read/write lock. Useful for
//! tests and for embedding the engagement core without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::report::{Report, ReportId};

use super::{sort_feed, ConditionalWrite, ReportStore, StoreStats, StoredReport};

/// Report store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    reports: RwLock<HashMap<ReportId, Report>>,
}

impl MemoryReportStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `reports`. Later duplicates of an id win.
    #[must_use]
    pub fn with_reports(reports: impl IntoIterator<Item = Report>) -> Self {
        let map = reports
            .into_iter()
            .map(|report| (report.id.clone(), report))
            .collect();
        Self {
            reports: RwLock::new(map),
        }
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn fetch_all_reports(&self) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = self.reports.read().await.values().cloned().collect();
        sort_feed(&mut reports);
        Ok(reports)
    }

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>> {
        let report = self.reports.read().await.get(id).cloned();
        report.map(StoredReport::new).transpose()
    }

    async fn write_report(&self, report: &Report) -> Result<()> {
        self.reports
            .write()
            .await
            .insert(report.id.clone(), report.clone());
        debug!("Replaced report {} in memory", report.id);
        Ok(())
    }

    async fn write_report_if(
        &self,
        report: &Report,
        expected_revision: &str,
    ) -> Result<ConditionalWrite> {
        let mut reports = self.reports.write().await;
        let current = reports
            .get(&report.id)
            .ok_or_else(|| Error::report_not_found(report.id.as_str()))?;

        if current.revision()? != expected_revision {
            return Ok(ConditionalWrite::Stale);
        }

        reports.insert(report.id.clone(), report.clone());
        Ok(ConditionalWrite::Written)
    }

    async fn insert_report(&self, report: &Report) -> Result<()> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(Error::precondition(format!(
                "report '{}' already exists",
                report.id
            )));
        }
        reports.insert(report.id.clone(), report.clone());
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let reports = self.reports.read().await;
        let total_likes: usize = reports.values().map(Report::like_count).sum();
        let total_ratings: usize = reports.values().map(Report::rating_count).sum();

        Ok(StoreStats {
            total_reports: reports.len() as u64,
            total_likes: total_likes as u64,
            total_ratings: total_ratings as u64,
            oldest_report: reports.values().map(|r| r.timestamp).min(),
            newest_report: reports.values().map(|r| r.timestamp).max(),
        })
    }
}
