//! `geofeed` - Engagement core for a geotagged report feed
//!
//! Users view reports, like them, rate them once and share their images. This
//! library computes the next engagement state for each action, writes it to a
//! shared record store without losing concurrent updates, and republishes the
//! feed to observers.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod busy;
pub mod cli;
pub mod config;
pub mod engagement;
pub mod error;
pub mod events;
pub mod identity;
pub mod logging;
pub mod mutator;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod share;
pub mod store;
pub mod summary;

pub use busy::BusyIndicator;
pub use config::Config;
pub use engagement::StarRating;
pub use error::{Error, Result};
pub use events::{EngagementEvent, EventBus};
pub use identity::{IdentityProvider, StaticIdentity};
pub use logging::init_logging;
pub use mutator::{EngagementMutator, MutationOutcome, MutatorOptions, WriteMode};
pub use reconcile::{FeedReconciler, FeedSnapshot};
pub use report::{EngagementFlags, Report, ReportId, UserId};
pub use session::FeedSession;
pub use share::{ShareOutcome, ShareTarget};
pub use store::{MemoryReportStore, ReportStore, SqliteReportStore, StoreStats};
pub use summary::ReportSummary;
