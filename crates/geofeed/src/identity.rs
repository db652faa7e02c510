//! Who is acting.

use crate::error::{Error, Result};
use crate::report::UserId;

/// Supplies the identifier of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    /// The current user's identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] if nobody is signed in.
    fn current_user_id(&self) -> Result<UserId>;
}

/// Identity fixed at construction, e.g. from configuration or a CLI flag.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user: Option<UserId>,
}

impl StaticIdentity {
    /// Identity for `user`.
    #[must_use]
    pub fn new(user: impl Into<UserId>) -> Self {
        Self {
            user: Some(user.into()),
        }
    }

    /// No one is signed in.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Identity from an optional configured value; empty strings count as absent.
    #[must_use]
    pub fn from_option(user: Option<String>) -> Self {
        Self {
            user: user.filter(|u| !u.is_empty()).map(UserId::from),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Result<UserId> {
        self.user.clone().ok_or(Error::NotAuthenticated)
    }
}
