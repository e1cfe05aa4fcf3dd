//! Authentication provider registry.
//!
//! One slot per [`AuthenticationMethod`], created up front, so lookups never
//! touch a lock: each slot holds an `ArcSwapOption` that readers load and
//! writers replace. Writers for the same method serialize on that slot's
//! mutex; writers for different methods do not contend.
//!
//! Providers supplied by the application when the registry is built are
//! final. Later attempts to replace them are logged and refused.
//!
//! # Example
//!
//! ```ignore
//! let registry = AuthProviderRegistry::builder()
//!     .app_provider(AuthenticationMethod::ActiveDirectoryPassword, my_provider)
//!     .build()?;
//!
//! // Refused: the application already chose a provider for this method
//! assert!(!registry.set_provider(AuthenticationMethod::ActiveDirectoryPassword, other)?);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use super::{AuthProvider, AuthenticationMethod};
use crate::error::{Result, TdsError};

/// Client id used for AD token requests when none is configured.
pub const DEFAULT_APPLICATION_CLIENT_ID: &str = "2fd908ad-0664-4344-b9be-cd3e8b574c38";

/// A provider installed for a method.
pub struct Registration {
    pub provider: Arc<dyn AuthProvider>,
    /// Installed by the application at build time; never replaced.
    pub app_specified: bool,
}

#[derive(Default)]
struct Slot {
    current: ArcSwapOption<Registration>,
    write_lock: Mutex<()>,
}

/// Registry mapping authentication methods to providers.
pub struct AuthProviderRegistry {
    slots: HashMap<AuthenticationMethod, Slot>,
    application_client_id: String,
}

impl AuthProviderRegistry {
    /// Empty registry with the default application client id.
    pub fn new() -> Self {
        Self {
            slots: AuthenticationMethod::ALL
                .iter()
                .map(|m| (*m, Slot::default()))
                .collect(),
            application_client_id: DEFAULT_APPLICATION_CLIENT_ID.to_string(),
        }
    }

    pub fn builder() -> AuthProviderRegistryBuilder {
        AuthProviderRegistryBuilder::default()
    }

    /// Client id to present to Active Directory.
    pub fn application_client_id(&self) -> &str {
        &self.application_client_id
    }

    fn slot(&self, method: AuthenticationMethod) -> &Slot {
        // Every method has a slot from construction on
        &self.slots[&method]
    }

    /// Provider currently installed for `method`. Lock-free.
    pub fn get_provider(&self, method: AuthenticationMethod) -> Option<Arc<dyn AuthProvider>> {
        self.slot(method)
            .current
            .load_full()
            .map(|r| r.provider.clone())
    }

    /// Current registration for `method`. Lock-free.
    pub fn registration(&self, method: AuthenticationMethod) -> Option<Arc<Registration>> {
        self.slot(method).current.load_full()
    }

    /// Whether the application fixed the provider for `method`.
    pub fn is_app_specified(&self, method: AuthenticationMethod) -> bool {
        self.registration(method).map_or(false, |r| r.app_specified)
    }

    /// Install `provider` for `method`.
    ///
    /// Returns `Ok(false)` without changing anything when the application
    /// already installed a provider for `method`.
    ///
    /// # Errors
    ///
    /// [`TdsError::UnsupportedAuthentication`] if the provider does not
    /// support `method`. Nothing is changed in that case.
    pub fn set_provider(
        &self,
        method: AuthenticationMethod,
        provider: Arc<dyn AuthProvider>,
    ) -> Result<bool> {
        if !provider.is_supported(method) {
            return Err(TdsError::UnsupportedAuthentication {
                method,
                provider: provider.name().to_string(),
            });
        }

        let slot = self.slot(method);

        // App registrations are only stored at build time
        if let Some(existing) = slot.current.load_full().filter(|r| r.app_specified) {
            tracing::error!(
                %method,
                provider = provider.name(),
                existing = existing.provider.name(),
                "Failed to add provider because a user-defined provider already exists"
            );
            return Ok(false);
        }

        let _guard = slot.write_lock.lock();
        let previous = slot.current.load_full();
        if let Some(previous) = &previous {
            previous.provider.before_unload(method);
        }
        provider.before_load(method);

        tracing::debug!(
            %method,
            provider = provider.name(),
            previous = previous.as_ref().map(|r| r.provider.name()).unwrap_or("none"),
            "Installed authentication provider"
        );
        slot.current.store(Some(Arc::new(Registration {
            provider,
            app_specified: false,
        })));
        Ok(true)
    }

    /// Install `provider` for every Active Directory method the application
    /// has not claimed.
    pub fn install_defaults(&self, provider: Arc<dyn AuthProvider>) -> Result<()> {
        for method in AuthenticationMethod::ACTIVE_DIRECTORY {
            if !self.is_app_specified(method) {
                self.set_provider(method, provider.clone())?;
            }
        }
        Ok(())
    }
}

impl Default for AuthProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed: Vec<_> = AuthenticationMethod::ALL
            .iter()
            .filter(|m| self.get_provider(**m).is_some())
            .collect();
        let app_specified: Vec<_> = AuthenticationMethod::ALL
            .iter()
            .filter(|m| self.is_app_specified(**m))
            .collect();
        f.debug_struct("AuthProviderRegistry")
            .field("installed", &installed)
            .field("app_specified", &app_specified)
            .finish()
    }
}

/// Builds a registry with application-specified providers.
#[derive(Default)]
pub struct AuthProviderRegistryBuilder {
    application_client_id: Option<String>,
    app_providers: Vec<(AuthenticationMethod, Arc<dyn AuthProvider>)>,
}

impl AuthProviderRegistryBuilder {
    pub fn application_client_id(mut self, id: impl Into<String>) -> Self {
        self.application_client_id = Some(id.into());
        self
    }

    /// Fix the provider for `method`. A later call for the same method wins.
    pub fn app_provider(
        mut self,
        method: AuthenticationMethod,
        provider: Arc<dyn AuthProvider>,
    ) -> Self {
        self.app_providers.push((method, provider));
        self
    }

    /// Build the registry.
    ///
    /// # Errors
    ///
    /// [`TdsError::UnsupportedAuthentication`] if an application provider
    /// does not support the method it was given for.
    pub fn build(self) -> Result<AuthProviderRegistry> {
        let mut registry = AuthProviderRegistry::new();
        if let Some(id) = self.application_client_id.filter(|id| !id.is_empty()) {
            registry.application_client_id = id;
        }

        for (method, provider) in self.app_providers {
            if !provider.is_supported(method) {
                return Err(TdsError::UnsupportedAuthentication {
                    method,
                    provider: provider.name().to_string(),
                });
            }
            tracing::info!(%method, provider = provider.name(), "Added user-defined auth provider");
            registry.slot(method).current.store(Some(Arc::new(Registration {
                provider,
                app_specified: true,
            })));
        }
        Ok(registry)
    }
}
