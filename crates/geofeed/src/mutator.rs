//! The engagement mutator.
//!
//! Turns one user action (like, unlike, rate) into a new version of the
//! report, writes it to the store and asks the reconciler to republish the
//! feed. Two write strategies are available:
//!
//! - [`WriteMode::Overwrite`] derives from the caller's copy and replaces the
//!   stored document. Concurrent writers overwrite each other.
//! - [`WriteMode::Optimistic`] derives from the latest stored copy and writes
//!   only if that copy is still current, re-deriving on conflict.
//!
//! Every call emits `BusyStarted`, one outcome event and `BusyEnded`, in that
//! order, on the shared [`EventBus`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::busy::BusyIndicator;
use crate::engagement::{apply_like, apply_rating, RatingOutcome, StarRating};
use crate::error::{Error, Result};
use crate::events::{EngagementEvent, EventBus};
use crate::reconcile::{FeedReconciler, FeedSnapshot};
use crate::report::{Report, UserId};
use crate::store::{ConditionalWrite, ReportStore};

/// Default number of re-derivations after a lost conditional write.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How derived reports are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Replace the stored document; last writer wins.
    Overwrite,
    /// Compare-and-swap on the document revision, retrying on conflict.
    #[default]
    Optimistic,
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overwrite => write!(f, "overwrite"),
            Self::Optimistic => write!(f, "optimistic"),
        }
    }
}

impl FromStr for WriteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(Error::ConfigValidation {
                message: format!("unknown write mode '{other}'"),
            }),
        }
    }
}

/// Tuning for [`EngagementMutator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutatorOptions {
    /// Write strategy.
    pub write_mode: WriteMode,
    /// Re-derivations allowed after a lost conditional write.
    pub max_retries: u32,
    /// Re-read the feed after every successful write.
    pub refetch_after_mutation: bool,
}

impl Default for MutatorOptions {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            refetch_after_mutation: true,
        }
    }
}

/// Result of a mutation that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The new report was written.
    Applied {
        /// The report as written.
        report: Report,
        /// The feed republished afterwards; `None` if refetching is disabled
        /// or failed.
        snapshot: Option<FeedSnapshot>,
    },
    /// The user had already rated the report. Nothing was written.
    AlreadyRated,
}

impl MutationOutcome {
    /// The written report, if any.
    #[must_use]
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Applied { report, .. } => Some(report),
            Self::AlreadyRated => None,
        }
    }
}

/// Applies engagement changes for one user action at a time.
#[derive(Clone)]
pub struct EngagementMutator {
    store: Arc<dyn ReportStore>,
    reconciler: FeedReconciler,
    events: EventBus,
    busy: BusyIndicator,
    options: MutatorOptions,
}

impl fmt::Debug for EngagementMutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngagementMutator")
            .field("reconciler", &self.reconciler)
            .field("busy", &self.busy)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl EngagementMutator {
    /// Create a mutator writing to `store` and republishing through `reconciler`.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReportStore>,
        reconciler: FeedReconciler,
        events: EventBus,
        options: MutatorOptions,
    ) -> Self {
        Self {
            store,
            reconciler,
            events,
            busy: BusyIndicator::new(),
            options,
        }
    }

    /// The event bus this mutator reports on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The busy indicator this mutator drives.
    #[must_use]
    pub fn busy(&self) -> &BusyIndicator {
        &self.busy
    }

    /// The reconciler that republishes the feed.
    #[must_use]
    pub fn reconciler(&self) -> &FeedReconciler {
        &self.reconciler
    }

    /// The options in effect.
    #[must_use]
    pub fn options(&self) -> MutatorOptions {
        self.options
    }

    /// Like (`like == true`) or unlike `report` on behalf of `user`.
    ///
    /// # Errors
    ///
    /// - [`Error::PreconditionViolation`] if `user` is empty; announced as
    ///   `MutationFailed` without touching the busy indicator
    /// - [`Error::WriteFailure`] if the store did not complete the write
    /// - [`Error::VersionConflict`] if optimistic retries ran out
    pub async fn toggle_like(
        &self,
        report: &Report,
        user: &UserId,
        like: bool,
    ) -> Result<MutationOutcome> {
        self.require_user(report, user)?;
        debug!(
            "{} report {} for {}",
            if like { "Liking" } else { "Unliking" },
            report.id,
            user
        );
        self.run(report, |current| Some(apply_like(current, user, like)))
            .await
    }

    /// Submit a star rating for `report` on behalf of `user`.
    ///
    /// Returns [`MutationOutcome::AlreadyRated`] without writing when
    /// `already_rated` is set or `user` is already among the raters.
    ///
    /// # Errors
    ///
    /// - [`Error::PreconditionViolation`] if `user` is empty; announced as
    ///   `MutationFailed` without touching the busy indicator
    /// - [`Error::WriteFailure`] if the store did not complete the write
    /// - [`Error::VersionConflict`] if optimistic retries ran out
    pub async fn submit_rating(
        &self,
        report: &Report,
        user: &UserId,
        already_rated: bool,
        stars: StarRating,
    ) -> Result<MutationOutcome> {
        self.require_user(report, user)?;
        debug!("Rating report {} with {} for {}", report.id, stars.value(), user);
        self.run(report, |current| {
            match apply_rating(current, user, already_rated, stars) {
                RatingOutcome::Applied(next) => Some(next),
                RatingOutcome::AlreadyRated => None,
            }
        })
        .await
    }

    fn require_user(&self, report: &Report, user: &UserId) -> Result<()> {
        if !user.is_empty() {
            return Ok(());
        }
        let err = Error::precondition("user id must not be empty");
        warn!("Rejected mutation of report {}: {}", report.id, err);
        self.events.emit(EngagementEvent::MutationFailed {
            report_id: report.id.clone(),
            reason: err.to_string(),
        });
        Err(err)
    }

    /// One full operation: busy on, write, notify, reconcile, busy off.
    async fn run<F>(&self, report: &Report, derive: F) -> Result<MutationOutcome>
    where
        F: Fn(&Report) -> Option<Report> + Send + Sync,
    {
        let _busy = self.busy.begin(&report.id, &self.events);

        let written = match self.commit(report, &derive).await {
            Ok(Some(written)) => written,
            Ok(None) => {
                info!("Report {} already rated; nothing written", report.id);
                self.events.emit(EngagementEvent::RatingSkipped {
                    report_id: report.id.clone(),
                });
                return Ok(MutationOutcome::AlreadyRated);
            }
            Err(err) => {
                warn!("Mutation of report {} failed: {}", report.id, err);
                self.events.emit(EngagementEvent::MutationFailed {
                    report_id: report.id.clone(),
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        info!("Report {} updated", written.id);
        self.events.emit(EngagementEvent::MutationSucceeded {
            report_id: written.id.clone(),
        });

        let snapshot = if self.options.refetch_after_mutation {
            self.reconcile(&written).await
        } else {
            None
        };

        Ok(MutationOutcome::Applied {
            report: written,
            snapshot,
        })
    }

    async fn reconcile(&self, written: &Report) -> Option<FeedSnapshot> {
        match self.reconciler.refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!("Refetch after updating report {} failed: {}", written.id, err);
                self.events.emit(EngagementEvent::ReconcileFailed {
                    report_id: written.id.clone(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }

    /// Derive and write. `Ok(None)` means the derivation declined to change anything.
    async fn commit<F>(&self, report: &Report, derive: &F) -> Result<Option<Report>>
    where
        F: Fn(&Report) -> Option<Report> + Send + Sync,
    {
        match self.options.write_mode {
            WriteMode::Overwrite => self.commit_overwrite(report, derive).await,
            WriteMode::Optimistic => self.commit_optimistic(report, derive).await,
        }
    }

    async fn commit_overwrite<F>(&self, report: &Report, derive: &F) -> Result<Option<Report>>
    where
        F: Fn(&Report) -> Option<Report> + Send + Sync,
    {
        let Some(next) = derive(report) else {
            return Ok(None);
        };
        next.validate()?;

        self.store
            .write_report(&next)
            .await
            .map_err(|e| as_write_failure(&next, e))?;
        Ok(Some(next))
    }

    async fn commit_optimistic<F>(&self, report: &Report, derive: &F) -> Result<Option<Report>>
    where
        F: Fn(&Report) -> Option<Report> + Send + Sync,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;

            let stored = self
                .store
                .fetch_report(&report.id)
                .await
                .map_err(|e| as_write_failure(report, e))?
                .ok_or_else(|| Error::report_not_found(report.id.as_str()))?;

            let Some(next) = derive(&stored.report) else {
                return Ok(None);
            };
            next.validate()?;

            let outcome = self
                .store
                .write_report_if(&next, &stored.revision)
                .await
                .map_err(|e| as_write_failure(&next, e))?;

            match outcome {
                ConditionalWrite::Written => return Ok(Some(next)),
                ConditionalWrite::Stale if attempts > self.options.max_retries => {
                    return Err(Error::VersionConflict {
                        report_id: report.id.to_string(),
                        attempts,
                    });
                }
                ConditionalWrite::Stale => {
                    debug!(
                        "Report {} changed underneath attempt {}; re-deriving",
                        report.id, attempts
                    );
                }
            }
        }
    }
}

/// Store errors during a write become `WriteFailure`; conflicts and missing
/// reports keep their own kind.
fn as_write_failure(report: &Report, err: Error) -> Error {
    match err {
        Error::WriteFailure { .. } | Error::VersionConflict { .. } | Error::ReportNotFound { .. } => {
            err
        }
        other => Error::write_failure(report.id.as_str(), other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportId;
    use crate::store::{MemoryReportStore, StoreStats, StoredReport};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::{broadcast, Notify};

    fn report() -> Report {
        let ts = DateTime::from_timestamp(1_650_000_000, 0).unwrap();
        Report::new("r1", "Main St 1", ts, "img://r1")
    }

    fn stars(value: f64) -> StarRating {
        StarRating::new(value).unwrap()
    }

    fn mutator_over(store: Arc<dyn ReportStore>, options: MutatorOptions) -> EngagementMutator {
        let reconciler = FeedReconciler::new(store.clone());
        EngagementMutator::new(store, reconciler, EventBus::new(32), options)
    }

    fn overwrite() -> MutatorOptions {
        MutatorOptions {
            write_mode: WriteMode::Overwrite,
            ..MutatorOptions::default()
        }
    }

    fn drain(rx: &mut broadcast::Receiver<EngagementEvent>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind());
        }
        kinds
    }

    /// Store that can be told to fail writes or feed reads.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryReportStore,
        fail_writes: AtomicBool,
        fail_feed: AtomicBool,
    }

    impl FailingStore {
        fn with_report(report: Report) -> Self {
            Self {
                inner: MemoryReportStore::with_reports([report]),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ReportStore for FailingStore {
        async fn fetch_all_reports(&self) -> Result<Vec<Report>> {
            if self.fail_feed.load(Ordering::SeqCst) {
                return Err(Error::internal("feed read refused"));
            }
            self.inner.fetch_all_reports().await
        }

        async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>> {
            self.inner.fetch_report(id).await
        }

        async fn write_report(&self, report: &Report) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::internal("disk on fire"));
            }
            self.inner.write_report(report).await
        }

        async fn write_report_if(&self, report: &Report, expected: &str) -> Result<ConditionalWrite> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::internal("disk on fire"));
            }
            self.inner.write_report_if(report, expected).await
        }

        async fn insert_report(&self, report: &Report) -> Result<()> {
            self.inner.insert_report(report).await
        }

        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    /// Store where another user likes the report just before each of the
    /// first `races` conditional writes lands.
    struct RacingStore {
        inner: MemoryReportStore,
        races: usize,
        raced: AtomicUsize,
    }

    impl RacingStore {
        fn new(report: Report, races: usize) -> Self {
            Self {
                inner: MemoryReportStore::with_reports([report]),
                races,
                raced: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReportStore for RacingStore {
        async fn fetch_all_reports(&self) -> Result<Vec<Report>> {
            self.inner.fetch_all_reports().await
        }

        async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>> {
            self.inner.fetch_report(id).await
        }

        async fn write_report(&self, report: &Report) -> Result<()> {
            self.inner.write_report(report).await
        }

        async fn write_report_if(&self, report: &Report, expected: &str) -> Result<ConditionalWrite> {
            let n = self.raced.fetch_add(1, Ordering::SeqCst);
            if n < self.races {
                let current = self.inner.fetch_report(&report.id).await?.unwrap().report;
                let rival = UserId::new(format!("rival{n}"));
                self.inner.write_report(&apply_like(&current, &rival, true)).await?;
            }
            self.inner.write_report_if(report, expected).await
        }

        async fn insert_report(&self, report: &Report) -> Result<()> {
            self.inner.insert_report(report).await
        }

        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    /// Store that holds the conditional write of one report until released.
    struct GatedStore {
        inner: MemoryReportStore,
        held: ReportId,
        reached: Notify,
        gate: Notify,
    }

    impl GatedStore {
        fn new(reports: impl IntoIterator<Item = Report>, held: &str) -> Self {
            Self {
                inner: MemoryReportStore::with_reports(reports),
                held: ReportId::new(held),
                reached: Notify::new(),
                gate: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl ReportStore for GatedStore {
        async fn fetch_all_reports(&self) -> Result<Vec<Report>> {
            self.inner.fetch_all_reports().await
        }

        async fn fetch_report(&self, id: &ReportId) -> Result<Option<StoredReport>> {
            self.inner.fetch_report(id).await
        }

        async fn write_report(&self, report: &Report) -> Result<()> {
            self.inner.write_report(report).await
        }

        async fn write_report_if(&self, report: &Report, expected: &str) -> Result<ConditionalWrite> {
            if report.id == self.held {
                self.reached.notify_one();
                self.gate.notified().await;
            }
            self.inner.write_report_if(report, expected).await
        }

        async fn insert_report(&self, report: &Report) -> Result<()> {
            self.inner.insert_report(report).await
        }

        async fn stats(&self) -> Result<StoreStats> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_like_writes_and_reconciles() {
        let store = Arc::new(MemoryReportStore::with_reports([report()]));
        let mutator = mutator_over(store.clone(), MutatorOptions::default());

        let outcome = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap();

        let MutationOutcome::Applied { report: written, snapshot } = outcome else {
            panic!("expected the like to apply");
        };
        assert_eq!(written.likes, vec![UserId::new("u1")]);
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.generation, 1);
        assert_eq!(snapshot.find(&written.id), Some(&written));

        let stored = store.fetch_report(&written.id).await.unwrap().unwrap();
        assert_eq!(stored.report, written);
    }

    #[tokio::test]
    async fn test_event_order_on_success() {
        let store = Arc::new(MemoryReportStore::with_reports([report()]));
        let mutator = mutator_over(store, MutatorOptions::default());
        let mut rx = mutator.events().subscribe();

        mutator.toggle_like(&report(), &"u1".into(), true).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec!["busy-started", "mutation-succeeded", "busy-ended"]
        );
        assert!(!mutator.busy().is_busy());
    }

    #[tokio::test]
    async fn test_write_failure_leaves_state_untouched() {
        let original = report();
        let store = Arc::new(FailingStore::with_report(original.clone()));
        store.fail_writes.store(true, Ordering::SeqCst);
        let mutator = mutator_over(store.clone(), overwrite());
        let mut rx = mutator.events().subscribe();

        let caller_copy = original.clone();
        let err = mutator
            .toggle_like(&caller_copy, &"u1".into(), true)
            .await
            .unwrap_err();

        assert!(err.is_write_failure());
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(caller_copy, original);
        assert_eq!(
            store.fetch_report(&original.id).await.unwrap().unwrap().report,
            original
        );
        assert_eq!(mutator.reconciler().current().generation, 0);
        assert_eq!(
            drain(&mut rx),
            vec!["busy-started", "mutation-failed", "busy-ended"]
        );
        assert!(!mutator.busy().is_busy());
    }

    #[tokio::test]
    async fn test_optimistic_write_failure_is_write_failure() {
        let store = Arc::new(FailingStore::with_report(report()));
        store.fail_writes.store(true, Ordering::SeqCst);
        let mutator = mutator_over(store, MutatorOptions::default());

        let err = mutator
            .submit_rating(&report(), &"u1".into(), false, stars(3.0))
            .await
            .unwrap_err();
        assert!(err.is_write_failure());
    }

    #[tokio::test]
    async fn test_refetch_failure_still_applies() {
        crate::logging::init_test_logging();
        let store = Arc::new(FailingStore::with_report(report()));
        store.fail_feed.store(true, Ordering::SeqCst);
        let mutator = mutator_over(store, MutatorOptions::default());
        let mut rx = mutator.events().subscribe();

        let outcome = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap();

        assert!(matches!(outcome, MutationOutcome::Applied { snapshot: None, .. }));
        assert_eq!(
            drain(&mut rx),
            vec![
                "busy-started",
                "mutation-succeeded",
                "reconcile-failed",
                "busy-ended"
            ]
        );
    }

    #[tokio::test]
    async fn test_refetch_disabled() {
        let store = Arc::new(MemoryReportStore::with_reports([report()]));
        let options = MutatorOptions {
            refetch_after_mutation: false,
            ..MutatorOptions::default()
        };
        let mutator = mutator_over(store, options);

        let outcome = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap();
        assert!(matches!(outcome, MutationOutcome::Applied { snapshot: None, .. }));
        assert_eq!(mutator.reconciler().current().generation, 0);
    }

    #[tokio::test]
    async fn test_rating_end_to_end() {
        let mut base = report();
        base.likes = vec!["u1".into()];
        base.rates = vec!["u1".into(), "u2".into()];
        base.rating = 3.5;
        let store = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let mutator = mutator_over(store, MutatorOptions::default());
        let u3 = UserId::new("u3");

        let liked = mutator.toggle_like(&base, &u3, true).await.unwrap();
        let liked = liked.report().unwrap().clone();
        assert_eq!(liked.likes, vec![UserId::new("u3"), UserId::new("u1")]);

        let rated = mutator
            .submit_rating(&liked, &u3, false, stars(5.0))
            .await
            .unwrap();
        let rated = rated.report().unwrap();
        assert_eq!(rated.rating, 4.0);
        assert_eq!(rated.rates.len(), 3);
        assert_eq!(rated.likes, liked.likes);
    }

    #[tokio::test]
    async fn test_already_rated_is_explicit() {
        let mut base = report();
        base.rates = vec!["u1".into()];
        base.rating = 2.0;
        let store = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let mutator = mutator_over(store.clone(), MutatorOptions::default());
        let mut rx = mutator.events().subscribe();

        let outcome = mutator
            .submit_rating(&base, &"u1".into(), false, stars(5.0))
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::AlreadyRated);
        assert_eq!(
            drain(&mut rx),
            vec!["busy-started", "rating-skipped", "busy-ended"]
        );
        let stored = store.fetch_report(&base.id).await.unwrap().unwrap().report;
        assert_eq!(stored, base);
    }

    #[tokio::test]
    async fn test_already_rated_flag_skips_write() {
        let store = Arc::new(FailingStore::with_report(report()));
        store.fail_writes.store(true, Ordering::SeqCst);
        let mutator = mutator_over(store, overwrite());

        let outcome = mutator
            .submit_rating(&report(), &"u1".into(), true, stars(5.0))
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::AlreadyRated);
    }

    #[tokio::test]
    async fn test_empty_user_rejected() {
        let store = Arc::new(MemoryReportStore::with_reports([report()]));
        let mutator = mutator_over(store, MutatorOptions::default());
        let mut rx = mutator.events().subscribe();

        let err = mutator
            .toggle_like(&report(), &UserId::new(""), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionViolation { .. }));
        assert_eq!(drain(&mut rx), vec!["mutation-failed"]);
        assert!(!mutator.busy().is_busy());

        let err = mutator
            .submit_rating(&report(), &UserId::new(""), false, stars(3.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PreconditionViolation { .. }));
        assert_eq!(drain(&mut rx), vec!["mutation-failed"]);
    }

    #[tokio::test]
    async fn test_busy_until_overlapping_operations_finish() {
        let ts = DateTime::from_timestamp(1_650_000_000, 0).unwrap();
        let slow = Report::new("slow", "Main St 1", ts, "img://slow");
        let fast = Report::new("fast", "Main St 2", ts, "img://fast");
        let store = Arc::new(GatedStore::new([slow.clone(), fast.clone()], "slow"));
        let mutator = mutator_over(store.clone(), MutatorOptions::default());

        let held = tokio::spawn({
            let mutator = mutator.clone();
            async move { mutator.toggle_like(&slow, &"u1".into(), true).await }
        });
        store.reached.notified().await;

        mutator.toggle_like(&fast, &"u1".into(), true).await.unwrap();
        assert!(mutator.busy().is_busy());

        store.gate.notify_one();
        held.await.unwrap().unwrap();
        assert!(!mutator.busy().is_busy());
    }

    #[tokio::test]
    async fn test_optimistic_keeps_concurrent_like() {
        let store = Arc::new(RacingStore::new(report(), 1));
        let mutator = mutator_over(store.clone(), MutatorOptions::default());

        let outcome = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap();

        let written = outcome.report().unwrap();
        assert!(written.is_liked_by(&"u1".into()));
        assert!(written.is_liked_by(&"rival0".into()));
        let stored = store.fetch_report(&written.id).await.unwrap().unwrap().report;
        assert_eq!(stored.like_count(), 2);
    }

    #[tokio::test]
    async fn test_optimistic_rating_uses_latest_aggregate() {
        let mut base = report();
        base.rates = vec!["u1".into()];
        base.rating = 4.0;
        let store = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let mutator = mutator_over(store.clone(), MutatorOptions::default());

        // Someone else rated after the caller's copy was fetched.
        let mut newer = base.clone();
        newer.rates.insert(0, "u2".into());
        newer.rating = 2.0;
        store.write_report(&newer).await.unwrap();

        let outcome = mutator
            .submit_rating(&base, &"u3".into(), false, stars(5.0))
            .await
            .unwrap();
        let written = outcome.report().unwrap();
        assert_eq!(written.rates.len(), 3);
        assert_eq!(written.rating, (2.0 * 2.0 + 5.0) / 3.0);
    }

    #[tokio::test]
    async fn test_zero_retries_surfaces_conflict() {
        let store = Arc::new(RacingStore::new(report(), 1));
        let options = MutatorOptions {
            max_retries: 0,
            ..MutatorOptions::default()
        };
        let mutator = mutator_over(store, options);
        let mut rx = mutator.events().subscribe();

        let err = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap_err();

        assert!(err.is_version_conflict());
        assert!(matches!(err, Error::VersionConflict { attempts: 1, .. }));
        assert_eq!(
            drain(&mut rx),
            vec!["busy-started", "mutation-failed", "busy-ended"]
        );
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let store = Arc::new(RacingStore::new(report(), 10));
        let options = MutatorOptions {
            max_retries: 2,
            ..MutatorOptions::default()
        };
        let mutator = mutator_over(store, options);

        let err = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::VersionConflict { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_optimistic_missing_report() {
        let store = Arc::new(MemoryReportStore::new());
        let mutator = mutator_over(store, MutatorOptions::default());

        let err = mutator
            .toggle_like(&report(), &"u1".into(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReportNotFound { .. }));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let store = Arc::new(MemoryReportStore::with_reports([report()]));
        let mutator = mutator_over(store.clone(), overwrite());
        let stale = report();

        mutator.toggle_like(&stale, &"u1".into(), true).await.unwrap();
        mutator.toggle_like(&stale, &"u2".into(), true).await.unwrap();

        let stored = store.fetch_report(&stale.id).await.unwrap().unwrap().report;
        assert_eq!(stored.likes, vec![UserId::new("u2")]);
    }

    #[tokio::test]
    async fn test_optimistic_single_writer_matches_overwrite() {
        let mut base = report();
        base.likes = vec!["u1".into()];
        let a = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let b = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let optimistic = mutator_over(a, MutatorOptions::default());
        let plain = mutator_over(b, overwrite());

        let x = optimistic.toggle_like(&base, &"u2".into(), true).await.unwrap();
        let y = plain.toggle_like(&base, &"u2".into(), true).await.unwrap();
        assert_eq!(x.report(), y.report());
    }

    #[tokio::test]
    async fn test_unlike_removes_user() {
        let mut base = report();
        base.likes = vec!["u1".into(), "u2".into()];
        let store = Arc::new(MemoryReportStore::with_reports([base.clone()]));
        let mutator = mutator_over(store, MutatorOptions::default());

        let outcome = mutator
            .toggle_like(&base, &"u1".into(), false)
            .await
            .unwrap();
        assert_eq!(outcome.report().unwrap().likes, vec![UserId::new("u2")]);
    }

    #[test]
    fn test_write_mode_parse_and_display() {
        assert_eq!("overwrite".parse::<WriteMode>().unwrap(), WriteMode::Overwrite);
        assert_eq!("optimistic".parse::<WriteMode>().unwrap(), WriteMode::Optimistic);
        assert!("sometimes".parse::<WriteMode>().is_err());
        assert_eq!(WriteMode::default().to_string(), "optimistic");
    }

    #[test]
    fn test_as_write_failure_keeps_conflicts() {
        let r = report();
        let conflict = Error::VersionConflict {
            report_id: "r1".to_string(),
            attempts: 2,
        };
        assert!(as_write_failure(&r, conflict).is_version_conflict());
        assert!(as_write_failure(&r, Error::internal("x")).is_write_failure());
    }
}
