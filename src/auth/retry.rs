//! Retry state for Active Directory logins that time out.
//!
//! An AD login can outlast the server's or the client's wait and fail with
//! a timeout even though token acquisition succeeded. In that case the login
//! is attempted exactly once more, reusing the token already obtained.
//!
//! ```text
//! NotStarted ──► Retrying ──► HasLoggedIn
//!     │                           ▲
//!     └───────────────────────────┘
//! ```

use std::future::Future;

use super::AuthToken;
use crate::error::{Result, TdsError};

/// Where a login is in the timeout-retry cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRetryState {
    /// First attempt in progress.
    NotStarted,
    /// First attempt timed out; second attempt in progress.
    Retrying,
    /// Login completed. Terminal.
    HasLoggedIn,
}

/// Per-connection retry bookkeeping.
#[derive(Debug)]
pub struct AuthRetryHelper {
    state: AuthRetryState,
    cached_token: Option<AuthToken>,
}

impl Default for AuthRetryHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthRetryHelper {
    pub fn new() -> Self {
        Self {
            state: AuthRetryState::NotStarted,
            cached_token: None,
        }
    }

    pub fn state(&self) -> AuthRetryState {
        self.state
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// [`TdsError::InvalidStateTransition`] for anything but
    /// `NotStarted → Retrying`, `NotStarted → HasLoggedIn` and
    /// `Retrying → HasLoggedIn`.
    pub fn set_state(&mut self, to: AuthRetryState) -> Result<()> {
        use AuthRetryState::*;

        let from = self.state;
        match (from, to) {
            (NotStarted, Retrying) | (NotStarted, HasLoggedIn) | (Retrying, HasLoggedIn) => {
                tracing::debug!(?from, ?to, "AD login retry state changed");
                self.state = to;
                Ok(())
            }
            _ => Err(TdsError::InvalidStateTransition { from, to }),
        }
    }

    pub fn cached_token(&self) -> Option<&AuthToken> {
        self.cached_token.as_ref()
    }

    pub fn set_cached_token(&mut self, token: AuthToken) {
        self.cached_token = Some(token);
    }

    /// Whether a login that failed with `error` should be attempted again.
    ///
    /// Only the first attempt may be retried, only with a token in hand, and
    /// only for the server-side (10054) or client-side (258) timeout numbers.
    pub fn can_retry(&self, error: &TdsError) -> bool {
        self.state == AuthRetryState::NotStarted
            && self.cached_token.is_some()
            && error.is_login_timeout()
    }

    /// Token for the current attempt.
    ///
    /// While retrying, the cached token is reused. Otherwise `acquire` runs
    /// and its token is cached for a possible retry.
    pub async fn token_for_attempt<F, Fut>(&mut self, acquire: F) -> Result<AuthToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AuthToken>>,
    {
        if self.state == AuthRetryState::Retrying {
            if let Some(token) = &self.cached_token {
                tracing::debug!("Reusing cached token for AD login retry");
                return Ok(token.clone());
            }
        }

        let token = acquire().await?;
        self.cached_token = Some(token.clone());
        Ok(token)
    }
}
