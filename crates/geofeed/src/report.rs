//! Core report types for geofeed.
//!
//! This module defines the feed item record shared through the document store,
//! the identifiers it refers to, and the engagement flags derived from it.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Highest star value a rating may hold.
pub const MAX_STARS: f64 = 5.0;

/// Opaque identifier of a user, as handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier of a report, assigned when the report is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Wrap an identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a stable identifier from a report's immutable fields.
    ///
    /// Used when a report is created without an externally assigned id.
    #[must_use]
    pub fn derive(address: &str, image_ref: &str, timestamp: DateTime<Utc>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(address.as_bytes());
        hasher.update(&[0]);
        hasher.update(image_ref.as_bytes());
        hasher.update(&[0]);
        hasher.update(&timestamp.timestamp().to_le_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..20].to_string())
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReportId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ReportId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A geotagged feed item and its engagement aggregate.
///
/// Field names on the wire follow the external document schema
/// (`reportId`, `reportImage`, timestamp in whole seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique identifier, immutable.
    #[serde(rename = "reportId")]
    pub id: ReportId,

    /// Display address of the reported location.
    pub address: String,

    /// When the report was created, immutable.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,

    /// Reference to the report's image, immutable.
    #[serde(rename = "reportImage")]
    pub image_ref: String,

    /// Users who like this report. No duplicates, newest first.
    #[serde(default)]
    pub likes: Vec<UserId>,

    /// Users who have rated this report. No duplicates, newest first.
    #[serde(default)]
    pub rates: Vec<UserId>,

    /// Running mean of all submitted star values.
    #[serde(default)]
    pub rating: f64,
}

impl Report {
    /// Create a report with no engagement yet.
    #[must_use]
    pub fn new(
        id: impl Into<ReportId>,
        address: impl Into<String>,
        timestamp: DateTime<Utc>,
        image_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            timestamp,
            image_ref: image_ref.into(),
            likes: Vec::new(),
            rates: Vec::new(),
            rating: 0.0,
        }
    }

    /// Whether `user` is in the likes set.
    #[must_use]
    pub fn is_liked_by(&self, user: &UserId) -> bool {
        self.likes.contains(user)
    }

    /// Whether `user` has already contributed a rating.
    #[must_use]
    pub fn is_rated_by(&self, user: &UserId) -> bool {
        self.rates.contains(user)
    }

    /// Number of users who like this report.
    #[must_use]
    pub fn like_count(&self) -> usize {
        self.likes.len()
    }

    /// Number of star submissions folded into `rating`.
    #[must_use]
    pub fn rating_count(&self) -> usize {
        self.rates.len()
    }

    /// The rating as shown to users; an unrated report shows 0.
    #[must_use]
    pub fn display_rating(&self) -> f64 {
        if self.rates.is_empty() || !self.rating.is_finite() {
            0.0
        } else {
            self.rating
        }
    }

    /// Engagement flags of `user` for this version of the report.
    #[must_use]
    pub fn flags_for(&self, user: &UserId) -> EngagementFlags {
        EngagementFlags {
            liked_by_me: self.is_liked_by(user),
            rated_by_me: self.is_rated_by(user),
        }
    }

    /// Compute the revision token of this document.
    ///
    /// The token is the BLAKE3 digest of the document's JSON form, so two
    /// reports share a token exactly when every field is equal.
    ///
    /// # Errors
    ///
    /// Returns an error if the report cannot be serialized.
    pub fn revision(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Check the data-model invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidReport`] naming the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::invalid_report(self.id.as_str(), message));

        if self.id.as_str().is_empty() {
            return invalid("report id is empty".to_string());
        }
        if let Some(message) = duplicate_or_empty("likes", &self.likes) {
            return invalid(message);
        }
        if let Some(message) = duplicate_or_empty("rates", &self.rates) {
            return invalid(message);
        }
        if !self.rating.is_finite() || !(0.0..=MAX_STARS).contains(&self.rating) {
            return invalid(format!("rating {} is outside 0..=5", self.rating));
        }
        if self.rates.is_empty() && self.rating > 0.0 {
            return invalid(format!("rating {} without any raters", self.rating));
        }
        Ok(())
    }
}

fn duplicate_or_empty(field: &str, users: &[UserId]) -> Option<String> {
    let mut seen = HashSet::with_capacity(users.len());
    for user in users {
        if user.is_empty() {
            return Some(format!("{field} contains an empty user id"));
        }
        if !seen.insert(user.as_str()) {
            return Some(format!("{field} lists '{user}' more than once"));
        }
    }
    None
}

/// What the current user has already done to a report.
///
/// Always derived from a fetched [`Report`], never stored on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngagementFlags {
    /// The user is in `likes`.
    pub liked_by_me: bool,
    /// The user is in `rates`.
    pub rated_by_me: bool,
}
