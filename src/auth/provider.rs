//! AuthProvider trait definition.
//!
//! A provider turns connection parameters into an access token for one or
//! more [`AuthenticationMethod`]s. Providers are registered per method in the
//! [`AuthProviderRegistry`](super::AuthProviderRegistry).

use std::fmt;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{AuthenticationMethod, SecureString};
use crate::error::Result;

/// Everything a provider needs to request a token.
#[derive(Debug, Clone)]
pub struct AuthParameters {
    pub method: AuthenticationMethod,
    pub server: String,
    pub database: String,
    /// Resource (audience) the token is for.
    pub resource: String,
    /// Authority (STS) URL.
    pub authority: String,
    pub user_id: Option<String>,
    pub password: Option<SecureString>,
    pub connection_id: Uuid,
    /// Time budget for the whole acquisition.
    pub connection_timeout: Duration,
}

impl AuthParameters {
    pub fn new(
        method: AuthenticationMethod,
        server: impl Into<String>,
        resource: impl Into<String>,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            method,
            server: server.into(),
            database: String::new(),
            resource: resource.into(),
            authority: authority.into(),
            user_id: None,
            password: None,
            connection_id: Uuid::nil(),
            connection_timeout: Duration::from_secs(15),
        }
    }
}

/// Access token returned by a provider.
///
/// Clones are independent copies, each wiped on drop.
#[derive(Clone)]
pub struct AuthToken {
    access_token: Zeroizing<String>,
    expires_on: SystemTime,
}

impl AuthToken {
    pub fn new(access_token: impl Into<String>, expires_on: SystemTime) -> Self {
        Self {
            access_token: Zeroizing::new(access_token.into()),
            expires_on,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn expires_on(&self) -> SystemTime {
        self.expires_on
    }

    /// True once `expires_on` has passed.
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_on
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Trait for pluggable authentication providers.
///
/// Object-safe so registries can hold `Arc<dyn AuthProvider>`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this provider can serve `method`.
    fn is_supported(&self, method: AuthenticationMethod) -> bool;

    /// Called before the provider is installed for `method`.
    fn before_load(&self, _method: AuthenticationMethod) {}

    /// Called before the provider is replaced for `method`.
    fn before_unload(&self, _method: AuthenticationMethod) {}

    /// Acquire a token.
    ///
    /// `cancel` fires when the caller's time budget runs out; long-running
    /// providers should stop work when it does.
    async fn acquire_token(
        &self,
        params: &AuthParameters,
        cancel: CancellationToken,
    ) -> Result<AuthToken>;
}
