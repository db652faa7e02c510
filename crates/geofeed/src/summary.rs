//! What a feed item shows to one viewer.

use chrono::{Datelike, Timelike};
use serde::Serialize;

use crate::report::{EngagementFlags, Report, ReportId, UserId};

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Display-ready view of a report for one viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Report identifier.
    pub id: ReportId,
    /// Display address.
    pub address: String,
    /// Creation time as `"{day} {month} {hour}:{minute}"`, UTC.
    pub posted: String,
    /// Image reference.
    pub image_ref: String,
    /// Mean rating rounded to two decimals; 0 when unrated.
    pub rating: f64,
    /// Number of ratings folded into `rating`.
    pub rating_count: usize,
    /// Number of likes.
    pub like_count: usize,
    /// The viewer's engagement flags. All false for an anonymous viewer.
    pub flags: EngagementFlags,
    /// Label of the like button.
    pub like_label: &'static str,
    /// Label of the rate button.
    pub rate_label: &'static str,
}

impl ReportSummary {
    /// Summarise `report` as seen by `viewer`.
    #[must_use]
    pub fn for_viewer(report: &Report, viewer: Option<&UserId>) -> Self {
        let flags = viewer.map(|u| report.flags_for(u)).unwrap_or_default();

        Self {
            id: report.id.clone(),
            address: report.address.clone(),
            posted: posted_label(report),
            image_ref: report.image_ref.clone(),
            rating: round2(report.display_rating()),
            rating_count: report.rating_count(),
            like_count: report.like_count(),
            flags,
            like_label: if flags.liked_by_me { "Dislike" } else { "Like" },
            rate_label: if flags.rated_by_me { "Rated" } else { "Rate" },
        }
    }
}

/// Format the creation time of `report` as `"16 April 5:07"`.
///
/// Uses English month names in UTC with two-digit minutes.
#[must_use]
pub fn posted_label(report: &Report) -> String {
    let ts = report.timestamp;
    let month = MONTH_NAMES[ts.month0() as usize];
    format!("{} {} {}:{:02}", ts.day(), month, ts.hour(), ts.minute())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
