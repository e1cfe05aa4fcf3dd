//! Driver context: the process-wide objects every connection shares.
//!
//! One [`DriverContext`] owns the configuration, the backend selector, the
//! session factory, the authentication provider registry and the enclave
//! session cache. Everything is behind `Arc`, so the context is cheap to
//! clone into connection tasks.
//!
//! # Example
//!
//! ```ignore
//! let context = DriverContext::builder()
//!     .config(DriverConfig::from_json(&json)?.with_env_overrides())
//!     .default_provider(Arc::new(MyAdProvider::new()))
//!     .build()?;
//!
//! let parser = context.parser("db.example.com");
//! let mut session = context.session_factory().create_session(&parser);
//! ```

use std::sync::Arc;

use crate::auth::{
    acquire_token_with_timeout, AuthParameters, AuthProvider, AuthProviderRegistry, AuthToken,
    AuthenticationMethod,
};
use crate::config::DriverConfig;
use crate::enclave::EnclaveSessionCache;
use crate::error::{Result, TdsError};
use crate::session::{SessionFactory, TdsParser};
use crate::transport::BackendSelector;

/// Builder for a [`DriverContext`].
#[derive(Default)]
pub struct DriverContextBuilder {
    config: DriverConfig,
    app_providers: Vec<(AuthenticationMethod, Arc<dyn AuthProvider>)>,
    default_provider: Option<Arc<dyn AuthProvider>>,
}

impl DriverContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Application provider for `method`. It can never be replaced later.
    pub fn app_provider(
        mut self,
        method: AuthenticationMethod,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        self.app_providers.push((method, provider));
        self
    }

    /// Provider installed for every Active Directory method the application
    /// did not claim.
    pub fn default_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Build the context.
    ///
    /// Fails if an application or default provider does not support a
    /// method it is installed for.
    pub fn build(self) -> Result<DriverContext> {
        let config = Arc::new(self.config);

        let mut registry = AuthProviderRegistry::builder();
        if let Some(id) = &config.auth.application_client_id {
            registry = registry.application_client_id(id.clone());
        }
        for (method, provider) in self.app_providers {
            registry = registry.app_provider(method, provider);
        }
        let registry = registry.build()?;
        if let Some(provider) = self.default_provider {
            registry.install_defaults(provider)?;
        }

        let selector = Arc::new(BackendSelector::new(config.clone()));
        let sessions = SessionFactory::new(selector.clone(), config.writer.clone());

        tracing::debug!(
            packet_size = config.effective_packet_size(),
            application_client_id = registry.application_client_id(),
            "Driver context initialized"
        );

        Ok(DriverContext {
            config,
            selector,
            sessions,
            registry: Arc::new(registry),
            enclave_sessions: Arc::new(EnclaveSessionCache::new()),
        })
    }
}

/// Shared driver state.
#[derive(Debug, Clone)]
pub struct DriverContext {
    config: Arc<DriverConfig>,
    selector: Arc<BackendSelector>,
    sessions: SessionFactory,
    registry: Arc<AuthProviderRegistry>,
    enclave_sessions: Arc<EnclaveSessionCache>,
}

impl DriverContext {
    pub fn builder() -> DriverContextBuilder {
        DriverContextBuilder::new()
    }

    /// Context with `config` and no authentication providers.
    pub fn new(config: DriverConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn backend_selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    pub fn session_factory(&self) -> &SessionFactory {
        &self.sessions
    }

    pub fn auth_providers(&self) -> &Arc<AuthProviderRegistry> {
        &self.registry
    }

    pub fn enclave_sessions(&self) -> &Arc<EnclaveSessionCache> {
        &self.enclave_sessions
    }

    /// Parser settings for `server` using the configured packet size.
    pub fn parser(&self, server: impl Into<String>) -> TdsParser {
        TdsParser::new(server).with_packet_size(self.config.effective_packet_size())
    }

    /// Acquire a token through the provider registered for `params.method`.
    pub async fn acquire_token(&self, params: &AuthParameters) -> Result<AuthToken> {
        let provider = self.registry.get_provider(params.method).ok_or_else(|| {
            TdsError::UnsupportedAuthentication {
                method: params.method,
                provider: "none".to_string(),
            }
        })?;
        acquire_token_with_timeout(provider.as_ref(), params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::{Duration, SystemTime};
    use tokio_util::sync::CancellationToken;

    struct Static;

    #[async_trait]
    impl AuthProvider for Static {
        fn is_supported(&self, method: AuthenticationMethod) -> bool {
            method.is_active_directory()
        }

        async fn acquire_token(
            &self,
            params: &AuthParameters,
            _cancel: CancellationToken,
        ) -> Result<AuthToken> {
            Ok(AuthToken::new(
                format!("token-for-{}", params.server),
                SystemTime::now() + Duration::from_secs(3600),
            ))
        }
    }

    #[test]
    fn test_builds_from_config() {
        let config = DriverConfig::from_json(
            r#"{ "packet_size": 100, "auth": { "application_client_id": "client" } }"#,
        )
        .unwrap();
        let context = DriverContext::new(config).unwrap();
        assert_eq!(context.auth_providers().application_client_id(), "client");
        assert_eq!(context.parser("srv").packet_size, 512);
        assert!(context.enclave_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_token_through_registry() {
        let context = DriverContext::builder()
            .default_provider(Arc::new(Static))
            .build()
            .unwrap();

        let params = AuthParameters::new(
            AuthenticationMethod::ActiveDirectoryDefault,
            "db.example.com",
            "https://database.windows.net/",
            "https://login.microsoftonline.com/common",
        );
        let token = context.acquire_token(&params).await.unwrap();
        assert_eq!(token.access_token(), "token-for-db.example.com");

        let params = AuthParameters::new(AuthenticationMethod::SqlPassword, "db", "", "");
        assert!(matches!(
            context.acquire_token(&params).await,
            Err(TdsError::UnsupportedAuthentication { .. })
        ));
    }
}
