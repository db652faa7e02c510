//! Engagement state derivation.
//!
//! Pure functions that compute the next version of a [`Report`] for one user
//! action. Nothing here touches the store; the mutator decides which version
//! of the report to derive from and how to write the result.

use crate::error::{Error, Result};
use crate::report::{Report, UserId, MAX_STARS};

/// A star value in `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct StarRating(f64);

impl StarRating {
    /// Validate a star value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidStarValue`] for values outside `0..=5` and for NaN.
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (0.0..=MAX_STARS).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidStarValue { value })
        }
    }

    /// The star value.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for StarRating {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

/// Result of deriving a rating submission.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingOutcome {
    /// The submission was folded into the aggregate.
    Applied(Report),
    /// The user has already rated; nothing changes.
    AlreadyRated,
}

/// Derive the report after `user` likes (`like == true`) or unlikes it.
///
/// Liking prepends the user unless already present; unliking removes every
/// occurrence. All other fields are carried over.
#[must_use]
pub fn apply_like(report: &Report, user: &UserId, like: bool) -> Report {
    let mut next = report.clone();
    if like {
        if !next.is_liked_by(user) {
            next.likes.insert(0, user.clone());
        }
    } else {
        next.likes.retain(|liker| liker != user);
    }
    next
}

/// Derive the report after `user` submits `stars`.
///
/// The caller's `already_rated` flag and the report's own `rates` set are both
/// honoured: either one being set makes the submission a no-op.
#[must_use]
pub fn apply_rating(
    report: &Report,
    user: &UserId,
    already_rated: bool,
    stars: StarRating,
) -> RatingOutcome {
    if already_rated || report.is_rated_by(user) {
        return RatingOutcome::AlreadyRated;
    }

    let mut next = report.clone();
    next.rating = incremental_mean(report.rating, report.rates.len(), stars.value());
    next.rates.insert(0, user.clone());
    RatingOutcome::Applied(next)
}

/// Fold one more sample into a mean of `count` samples.
///
/// `(mean * count + sample) / (count + 1)`; with no prior samples the result
/// is the sample itself.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn incremental_mean(mean: f64, count: usize, sample: f64) -> f64 {
    if count == 0 {
        return sample;
    }
    let n = count as f64;
    (mean * n + sample) / (n + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn report() -> Report {
        let ts = DateTime::from_timestamp(1_650_000_000, 0).unwrap();
        Report::new("r1", "Main St 1", ts, "img://r1")
    }

    fn stars(value: f64) -> StarRating {
        StarRating::new(value).unwrap()
    }

    fn applied(outcome: RatingOutcome) -> Report {
        match outcome {
            RatingOutcome::Applied(report) => report,
            RatingOutcome::AlreadyRated => panic!("expected the rating to apply"),
        }
    }

    #[test]
    fn test_star_rating_bounds() {
        assert!(StarRating::new(0.0).is_ok());
        assert!(StarRating::new(5.0).is_ok());
        assert!(StarRating::new(2.5).is_ok());
        assert!(StarRating::new(-0.1).is_err());
        assert!(StarRating::new(5.01).is_err());
        assert!(StarRating::new(f64::NAN).is_err());
        assert!(StarRating::try_from(f64::INFINITY).is_err());
    }

    #[test]
    fn test_like_then_unlike_removes_user() {
        let mut base = report();
        base.likes = vec!["u1".into(), "u2".into()];
        let user = UserId::new("u2");

        let liked = apply_like(&base, &user, true);
        let unliked = apply_like(&liked, &user, false);

        assert!(!unliked.is_liked_by(&user));
        assert_eq!(unliked.likes, vec![UserId::new("u1")]);
    }

    #[test]
    fn test_like_is_set_union() {
        let mut base = report();
        base.likes = vec!["u1".into()];

        let liked = apply_like(&base, &"u3".into(), true);
        assert_eq!(liked.likes, vec![UserId::new("u3"), UserId::new("u1")]);

        let again = apply_like(&liked, &"u3".into(), true);
        assert_eq!(again.likes, liked.likes);
    }

    #[test]
    fn test_unlike_absent_user_is_noop() {
        let mut base = report();
        base.likes = vec!["u1".into()];
        assert_eq!(apply_like(&base, &"u9".into(), false), base);
    }

    #[test]
    fn test_like_keeps_other_fields() {
        let mut base = report();
        base.rates = vec!["u1".into()];
        base.rating = 4.0;

        let liked = apply_like(&base, &"u2".into(), true);
        assert_eq!(liked.id, base.id);
        assert_eq!(liked.address, base.address);
        assert_eq!(liked.timestamp, base.timestamp);
        assert_eq!(liked.image_ref, base.image_ref);
        assert_eq!(liked.rates, base.rates);
        assert_eq!(liked.rating, base.rating);
    }

    #[test]
    fn test_incremental_mean_sequence() {
        let first = applied(apply_rating(&report(), &"u1".into(), false, stars(4.0)));
        assert_eq!(first.rating, 4.0);
        assert_eq!(first.rates, vec![UserId::new("u1")]);

        let second = applied(apply_rating(&first, &"u2".into(), false, stars(2.0)));
        assert_eq!(second.rating, 3.0);
        assert_eq!(second.rates.len(), 2);
    }

    #[test]
    fn test_rating_formula_is_exact() {
        let mut base = report();
        base.rates = vec!["u1".into(), "u2".into(), "u3".into()];
        base.rating = 3.7;

        let next = applied(apply_rating(&base, &"u4".into(), false, stars(1.3)));
        assert_eq!(next.rating, (3.7 * 3.0 + 1.3) / 4.0);
    }

    #[test]
    fn test_rating_stays_in_bounds() {
        let mut current = report();
        let values = [5.0, 0.0, 5.0, 5.0, 0.5, 4.999, 0.0, 5.0];
        for (i, value) in values.iter().enumerate() {
            let user = UserId::new(format!("u{i}"));
            current = applied(apply_rating(&current, &user, false, stars(*value)));
            assert!((0.0..=5.0).contains(&current.rating), "rating {}", current.rating);
        }

        let mut all_five = report();
        for i in 0..50 {
            let user = UserId::new(format!("v{i}"));
            all_five = applied(apply_rating(&all_five, &user, false, stars(5.0)));
        }
        assert!(all_five.rating <= 5.0);
    }

    #[test]
    fn test_rate_once_guard_by_set() {
        let mut base = report();
        base.rates = vec!["u1".into()];
        base.rating = 2.0;

        let outcome = apply_rating(&base, &"u1".into(), false, stars(5.0));
        assert_eq!(outcome, RatingOutcome::AlreadyRated);
    }

    #[test]
    fn test_rate_once_guard_by_flag() {
        let outcome = apply_rating(&report(), &"u1".into(), true, stars(5.0));
        assert_eq!(outcome, RatingOutcome::AlreadyRated);
    }

    #[test]
    fn test_end_to_end_like_then_rate() {
        let mut base = report();
        base.likes = vec!["u1".into()];
        base.rates = vec!["u1".into(), "u2".into()];
        base.rating = 3.5;
        let u3 = UserId::new("u3");

        let liked = apply_like(&base, &u3, true);
        assert_eq!(liked.likes, vec![UserId::new("u3"), UserId::new("u1")]);
        assert_eq!(liked.rates, base.rates);
        assert_eq!(liked.rating, 3.5);

        let rated = applied(apply_rating(&liked, &u3, false, stars(5.0)));
        assert_eq!(rated.rating, 4.0);
        assert!(rated.is_rated_by(&"u1".into()));
        assert!(rated.is_rated_by(&"u2".into()));
        assert!(rated.is_rated_by(&u3));
        assert_eq!(rated.rates.len(), 3);
        assert_eq!(rated.likes, liked.likes);
    }

    #[test]
    fn test_incremental_mean_ignores_stale_mean_without_samples() {
        assert_eq!(incremental_mean(f64::NAN, 0, 3.0), 3.0);
        assert_eq!(incremental_mean(2.0, 0, 3.0), 3.0);
    }
}
