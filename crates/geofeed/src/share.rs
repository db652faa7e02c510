//! Delegation to a platform share facility.
//!
//! The core only supplies the message (the report's image reference) and
//! reports what happened. Dismissal is a normal outcome, not an error, and
//! nothing is retried.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{EngagementEvent, EventBus};
use crate::report::Report;

/// How a share sheet was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOutcome {
    /// The user shared the message, optionally through a named activity.
    Shared {
        /// Activity or app the platform reported, if any.
        activity: Option<String>,
    },
    /// The user closed the share sheet without sharing.
    Dismissed,
}

/// A platform facility able to share a text message.
#[async_trait]
pub trait ShareTarget: Send + Sync {
    /// Offer `message` to the user for sharing.
    ///
    /// # Errors
    ///
    /// Returns an error if the facility fails for a reason other than dismissal.
    async fn share(&self, message: &str) -> Result<ShareOutcome>;
}

/// Share `report`'s image reference through `target`.
///
/// Failures become [`Error::ShareFailure`] and are announced as
/// [`EngagementEvent::ShareFailed`].
///
/// # Errors
///
/// Returns [`Error::ShareFailure`] if the target fails.
pub async fn share_report(
    target: &dyn ShareTarget,
    report: &Report,
    events: &EventBus,
) -> Result<ShareOutcome> {
    match target.share(&report.image_ref).await {
        Ok(outcome) => {
            debug!("Share of report {} finished: {:?}", report.id, outcome);
            Ok(outcome)
        }
        Err(err) => {
            let err = match err {
                Error::ShareFailure { .. } => err,
                other => Error::share_failure(other.to_string()),
            };
            warn!("Share of report {} failed: {}", report.id, err);
            events.emit(EngagementEvent::ShareFailed {
                report_id: report.id.clone(),
                reason: err.to_string(),
            });
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::Mutex;

    /// Share target that records messages and replays a fixed answer.
    struct ScriptedTarget {
        answer: fn() -> Result<ShareOutcome>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedTarget {
        fn new(answer: fn() -> Result<ShareOutcome>) -> Self {
            Self {
                answer,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ShareTarget for ScriptedTarget {
        async fn share(&self, message: &str) -> Result<ShareOutcome> {
            self.seen.lock().unwrap().push(message.to_string());
            (self.answer)()
        }
    }

    fn report() -> Report {
        Report::new("r1", "A", DateTime::from_timestamp(0, 0).unwrap(), "img://r1.jpg")
    }

    #[tokio::test]
    async fn test_share_passes_image_ref() {
        let target = ScriptedTarget::new(|| {
            Ok(ShareOutcome::Shared {
                activity: Some("mail".to_string()),
            })
        });
        let events = EventBus::default();

        let outcome = share_report(&target, &report(), &events).await.unwrap();
        assert_eq!(
            outcome,
            ShareOutcome::Shared {
                activity: Some("mail".to_string())
            }
        );
        assert_eq!(*target.seen.lock().unwrap(), vec!["img://r1.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_dismissed_is_not_an_error() {
        let target = ScriptedTarget::new(|| Ok(ShareOutcome::Dismissed));
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let outcome = share_report(&target, &report(), &events).await.unwrap();
        assert_eq!(outcome, ShareOutcome::Dismissed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_maps_and_notifies() {
        let target = ScriptedTarget::new(|| Err(Error::internal("no share sheet")));
        let events = EventBus::default();
        let mut rx = events.subscribe();

        let err = share_report(&target, &report(), &events).await.unwrap_err();
        assert!(matches!(err, Error::ShareFailure { .. }));
        assert!(err.to_string().contains("no share sheet"));

        match rx.recv().await.unwrap() {
            EngagementEvent::ShareFailed { report_id, reason } => {
                assert_eq!(report_id.as_str(), "r1");
                assert!(reason.contains("no share sheet"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(target.seen.lock().unwrap().len(), 1);
    }
}
