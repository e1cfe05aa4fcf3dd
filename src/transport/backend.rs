//! Networking backend selection.
//!
//! The choice between the managed and the native stack is made once, the
//! first time anything asks, from the `Switch.Tds.UseManagedNetworking`
//! switch. After that the selector always answers the same way.

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::{EncryptionOptions, ManagedBackend, NativeBackend, NetworkBackend};
use crate::config::DriverConfig;

/// Switch consulted on first use. `true` selects the managed backend.
pub const USE_MANAGED_NETWORKING_SWITCH: &str = "Switch.Tds.UseManagedNetworking";

/// The two terminal backend configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkingBackend {
    Managed,
    Native,
}

impl fmt::Display for NetworkingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkingBackend::Managed => write!(f, "managed"),
            NetworkingBackend::Native => write!(f, "native"),
        }
    }
}

type SwitchLookup = Box<dyn Fn(&str) -> Option<bool> + Send + Sync>;

/// Lazily selects and caches the networking backend.
pub struct BackendSelector {
    lookup: SwitchLookup,
    selected: OnceLock<NetworkingBackend>,
    managed: Arc<ManagedBackend>,
    native: Arc<NativeBackend>,
}

impl BackendSelector {
    /// Selector reading the switch from `config`.
    pub fn new(config: Arc<DriverConfig>) -> Self {
        Self::with_lookup(move |name| config.switch(name))
    }

    /// Selector reading switches through `lookup`.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<bool> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
            selected: OnceLock::new(),
            managed: Arc::new(ManagedBackend::new()),
            native: Arc::new(NativeBackend::new()),
        }
    }

    /// The selected backend, deciding on first call.
    pub fn current(&self) -> NetworkingBackend {
        *self.selected.get_or_init(|| {
            let use_managed = (self.lookup)(USE_MANAGED_NETWORKING_SWITCH).unwrap_or(false);
            let selected = if use_managed {
                NetworkingBackend::Managed
            } else {
                NetworkingBackend::Native
            };
            tracing::debug!(backend = %selected, "Selected networking backend");
            selected
        })
    }

    /// True when the managed backend is in use.
    pub fn use_managed_networking(&self) -> bool {
        self.current() == NetworkingBackend::Managed
    }

    /// Implementation of the selected backend.
    pub fn backend(&self) -> Arc<dyn NetworkBackend> {
        match self.current() {
            NetworkingBackend::Managed => self.managed.clone(),
            NetworkingBackend::Native => self.native.clone(),
        }
    }

    /// Encryption options of the selected backend.
    pub fn encryption_options(&self) -> EncryptionOptions {
        self.backend().encryption_options()
    }

    /// Status of the selected backend.
    pub fn status(&self) -> u32 {
        self.backend().status()
    }
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("selected", &self.selected.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::STATUS_SUCCESS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_is_native() {
        let selector = BackendSelector::with_lookup(|_| None);
        assert_eq!(selector.current(), NetworkingBackend::Native);
        assert!(!selector.use_managed_networking());
        assert_eq!(selector.backend().kind(), NetworkingBackend::Native);
    }

    #[test]
    fn test_switch_selects_managed() {
        let selector = BackendSelector::with_lookup(|name| {
            (name == USE_MANAGED_NETWORKING_SWITCH).then_some(true)
        });
        assert_eq!(selector.current(), NetworkingBackend::Managed);
        assert_eq!(selector.encryption_options(), EncryptionOptions::Off);
        assert_eq!(selector.status(), STATUS_SUCCESS);
    }

    #[test]
    fn test_switch_read_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let selector = BackendSelector::with_lookup(move |_| {
            // Flip on every read; only the first answer may count
            Some(counter.fetch_add(1, Ordering::SeqCst) % 2 == 0)
        });

        for _ in 0..5 {
            assert_eq!(selector.current(), NetworkingBackend::Managed);
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_access_agrees() {
        let selector = Arc::new(BackendSelector::with_lookup(|_| Some(true)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let selector = selector.clone();
                std::thread::spawn(move || selector.current())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), NetworkingBackend::Managed);
        }
    }
}
