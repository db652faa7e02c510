//! Notifications for the presentation layer.
//!
//! Every user action produces a short sequence of [`EngagementEvent`]s on a
//! broadcast channel: `BusyStarted`, one outcome event, then `BusyEnded`.
//! Subscribers that fall behind lose the oldest events; the core never blocks
//! on them.

use std::fmt;

use tokio::sync::broadcast;

use crate::report::ReportId;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Something the presentation layer may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngagementEvent {
    /// An operation on the report began; show a busy indicator.
    BusyStarted {
        /// Report the operation concerns.
        report_id: ReportId,
    },
    /// The operation finished, successfully or not; hide the busy indicator.
    BusyEnded {
        /// Report the operation concerns.
        report_id: ReportId,
    },
    /// The new engagement state was written.
    MutationSucceeded {
        /// Report that was written.
        report_id: ReportId,
    },
    /// The write did not happen.
    MutationFailed {
        /// Report that was being written.
        report_id: ReportId,
        /// Human-readable cause.
        reason: String,
    },
    /// The user had already rated this report; nothing was written.
    RatingSkipped {
        /// Report that was not rated.
        report_id: ReportId,
    },
    /// The write succeeded but the feed could not be re-read.
    ReconcileFailed {
        /// Report whose mutation triggered the refetch.
        report_id: ReportId,
        /// Human-readable cause.
        reason: String,
    },
    /// The platform share facility reported an error.
    ShareFailed {
        /// Report being shared.
        report_id: ReportId,
        /// Human-readable cause.
        reason: String,
    },
}

impl EngagementEvent {
    /// The report this event concerns.
    #[must_use]
    pub fn report_id(&self) -> &ReportId {
        match self {
            Self::BusyStarted { report_id }
            | Self::BusyEnded { report_id }
            | Self::MutationSucceeded { report_id }
            | Self::MutationFailed { report_id, .. }
            | Self::RatingSkipped { report_id }
            | Self::ReconcileFailed { report_id, .. }
            | Self::ShareFailed { report_id, .. } => report_id,
        }
    }

    /// Short machine-friendly name of the event kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BusyStarted { .. } => "busy-started",
            Self::BusyEnded { .. } => "busy-ended",
            Self::MutationSucceeded { .. } => "mutation-succeeded",
            Self::MutationFailed { .. } => "mutation-failed",
            Self::RatingSkipped { .. } => "rating-skipped",
            Self::ReconcileFailed { .. } => "reconcile-failed",
            Self::ShareFailed { .. } => "share-failed",
        }
    }
}

impl fmt::Display for EngagementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MutationFailed { report_id, reason }
            | Self::ReconcileFailed { report_id, reason }
            | Self::ShareFailed { report_id, reason } => {
                write!(f, "{} {report_id}: {reason}", self.kind())
            }
            _ => write!(f, "{} {}", self.kind(), self.report_id()),
        }
    }
}

/// Sending side of the event stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngagementEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngagementEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EngagementEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
