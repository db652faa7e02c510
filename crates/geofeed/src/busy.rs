//! Busy indicator shared between the core and the presentation layer.
//!
//! [`BusyIndicator`] is a lightweight, cloneable handle around a count of
//! operations in flight. Operations hold a [`BusyGuard`] for their whole
//! duration; dropping the guard releases its share of the count and announces
//! `BusyEnded`, whichever way the operation exits. The indicator reads busy
//! until the last overlapping operation has finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::events::{EngagementEvent, EventBus};
use crate::report::ReportId;

/// A handle to the busy state.
#[derive(Debug, Clone, Default)]
pub struct BusyIndicator {
    in_flight: Arc<AtomicUsize>,
}

impl BusyIndicator {
    /// Create a cleared indicator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is in progress.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight() > 0
    }

    /// Number of operations currently holding a guard.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Mark an operation on `report_id` as started.
    ///
    /// Emits `BusyStarted` now and `BusyEnded` when the guard is dropped.
    #[must_use = "the operation counts as finished as soon as the guard is dropped"]
    pub fn begin(&self, report_id: &ReportId, events: &EventBus) -> BusyGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        events.emit(EngagementEvent::BusyStarted {
            report_id: report_id.clone(),
        });
        BusyGuard {
            in_flight: Arc::clone(&self.in_flight),
            report_id: report_id.clone(),
            events: events.clone(),
        }
    }
}

/// Keeps one operation counted while alive.
#[derive(Debug)]
pub struct BusyGuard {
    in_flight: Arc<AtomicUsize>,
    report_id: ReportId,
    events: EventBus,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.events.emit(EngagementEvent::BusyEnded {
            report_id: self.report_id.clone(),
        });
    }
}
