//! Reconciliation of the displayed feed with the store.
//!
//! After every successful mutation the whole collection is read again and
//! republished as a new [`FeedSnapshot`]. Observers replace what they show
//! wholesale; there is no merging or diffing.
//!
//! Each refresh draws a ticket before reading. When refreshes overlap, a read
//! that started earlier than the one already published is dropped instead of
//! replacing newer data.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::report::{Report, ReportId};
use crate::store::ReportStore;

/// One published version of the feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    /// Every report, newest first.
    pub reports: Vec<Report>,
    /// Incremented on every successful refresh; 0 before the first one.
    pub generation: u64,
    /// When the reports were read. `None` before the first refresh.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl FeedSnapshot {
    /// Find a report by id.
    #[must_use]
    pub fn find(&self, id: &ReportId) -> Option<&Report> {
        self.reports.iter().find(|report| &report.id == id)
    }

    /// Number of reports in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether the snapshot holds no reports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Re-reads the feed and publishes it to subscribers.
///
/// Cloning yields another handle to the same published snapshot.
#[derive(Clone)]
pub struct FeedReconciler {
    store: Arc<dyn ReportStore>,
    sender: Arc<watch::Sender<FeedSnapshot>>,
    /// Last ticket handed out to a refresh.
    issued: Arc<AtomicU64>,
    /// Ticket of the read behind the published snapshot.
    published: Arc<AtomicU64>,
}

impl std::fmt::Debug for FeedReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedReconciler")
            .field("generation", &self.sender.borrow().generation)
            .finish_non_exhaustive()
    }
}

impl FeedReconciler {
    /// Create a reconciler over `store` with an empty initial snapshot.
    #[must_use]
    pub fn new(store: Arc<dyn ReportStore>) -> Self {
        let (sender, _) = watch::channel(FeedSnapshot::default());
        Self {
            store,
            sender: Arc::new(sender),
            issued: Arc::new(AtomicU64::new(0)),
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Receive every snapshot published from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.sender.subscribe()
    }

    /// The most recently published snapshot.
    #[must_use]
    pub fn current(&self) -> FeedSnapshot {
        self.sender.borrow().clone()
    }

    /// Fetch every report and publish the result.
    ///
    /// Reports that break a data-model invariant are logged and kept; the
    /// store is authoritative.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the fetch fails. The published snapshot
    /// is left as it was.
    ///
    /// If a refresh that started later has already published, this read is
    /// discarded and the current snapshot is returned.
    pub async fn refresh(&self) -> Result<FeedSnapshot> {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let reports = self.store.fetch_all_reports().await?;

        for report in &reports {
            if let Err(e) = report.validate() {
                warn!("Fetched report does not hold: {}", e);
            }
        }

        let fetched_at = Utc::now();
        let mut published = FeedSnapshot::default();
        let fresh = self.sender.send_if_modified(|snapshot| {
            // The watch lock is held here, so the ticket check and the
            // replacement happen as one step.
            if ticket < self.published.load(Ordering::SeqCst) {
                published = snapshot.clone();
                return false;
            }
            self.published.store(ticket, Ordering::SeqCst);
            snapshot.reports = reports;
            snapshot.generation += 1;
            snapshot.fetched_at = Some(fetched_at);
            published = snapshot.clone();
            true
        });

        if !fresh {
            debug!(
                "Discarded feed read {} behind generation {}",
                ticket, published.generation
            );
            return Ok(published);
        }

        debug!(
            "Published feed generation {} with {} reports",
            published.generation,
            published.len()
        );
        Ok(published)
    }
}
