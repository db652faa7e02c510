//! A signed-in user's view of the feed.
//!
//! [`FeedSession`] is what a presentation layer holds: it resolves the
//! current user, derives their flags from the report they are looking at,
//! and forwards to the mutator, the reconciler and the share target.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::engagement::StarRating;
use crate::error::Result;
use crate::events::EngagementEvent;
use crate::identity::IdentityProvider;
use crate::mutator::{EngagementMutator, MutationOutcome};
use crate::reconcile::FeedSnapshot;
use crate::report::{Report, UserId};
use crate::share::{share_report, ShareOutcome, ShareTarget};
use crate::summary::ReportSummary;

/// Feed operations on behalf of the current user.
#[derive(Clone)]
pub struct FeedSession {
    identity: Arc<dyn IdentityProvider>,
    mutator: EngagementMutator,
    share_target: Arc<dyn ShareTarget>,
}

impl std::fmt::Debug for FeedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSession")
            .field("mutator", &self.mutator)
            .finish_non_exhaustive()
    }
}

impl FeedSession {
    /// Assemble a session.
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        mutator: EngagementMutator,
        share_target: Arc<dyn ShareTarget>,
    ) -> Self {
        Self {
            identity,
            mutator,
            share_target,
        }
    }

    /// The user this session acts for.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotAuthenticated`] if nobody is signed in.
    pub fn user(&self) -> Result<UserId> {
        self.identity.current_user_id()
    }

    /// The mutator behind this session.
    #[must_use]
    pub fn mutator(&self) -> &EngagementMutator {
        &self.mutator
    }

    /// Subscribe to busy and outcome notifications.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<EngagementEvent> {
        self.mutator.events().subscribe()
    }

    /// Subscribe to republished feed snapshots.
    #[must_use]
    pub fn feed(&self) -> watch::Receiver<FeedSnapshot> {
        self.mutator.reconciler().subscribe()
    }

    /// Whether an operation is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.mutator.busy().is_busy()
    }

    /// Re-read the whole feed and publish it.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the fetch fails.
    pub async fn refresh(&self) -> Result<FeedSnapshot> {
        self.mutator.reconciler().refresh().await
    }

    /// Summarise `report` for the current user, or anonymously if nobody is signed in.
    #[must_use]
    pub fn summary(&self, report: &Report) -> ReportSummary {
        let viewer = self.user().ok();
        ReportSummary::for_viewer(report, viewer.as_ref())
    }

    /// Like `report` if the current user does not like it yet, otherwise unlike it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotAuthenticated`] if nobody is signed in, or
    /// any error from [`EngagementMutator::toggle_like`].
    pub async fn toggle_like(&self, report: &Report) -> Result<MutationOutcome> {
        let user = self.user()?;
        let like = !report.flags_for(&user).liked_by_me;
        self.mutator.toggle_like(report, &user, like).await
    }

    /// Set the current user's like on `report` explicitly.
    ///
    /// # Errors
    ///
    /// Same as [`FeedSession::toggle_like`].
    pub async fn set_like(&self, report: &Report, like: bool) -> Result<MutationOutcome> {
        let user = self.user()?;
        self.mutator.toggle_like(report, &user, like).await
    }

    /// Rate `report` as the current user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotAuthenticated`] if nobody is signed in, or
    /// any error from [`EngagementMutator::submit_rating`].
    pub async fn rate(&self, report: &Report, stars: StarRating) -> Result<MutationOutcome> {
        let user = self.user()?;
        let already_rated = report.flags_for(&user).rated_by_me;
        self.mutator
            .submit_rating(report, &user, already_rated, stars)
            .await
    }

    /// Share `report`'s image reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ShareFailure`] if the share target fails.
    pub async fn share(&self, report: &Report) -> Result<ShareOutcome> {
        share_report(self.share_target.as_ref(), report, self.mutator.events()).await
    }
}
