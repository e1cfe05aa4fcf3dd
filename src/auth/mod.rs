//! Authentication: methods, providers, the provider registry, token
//! acquisition under a deadline and the AD login retry state.
//!
//! | Type                     | Role                                             |
//! |--------------------------|--------------------------------------------------|
//! | [`AuthenticationMethod`] | Closed set of ways a connection authenticates    |
//! | [`AuthProvider`]         | Pluggable token source for one or more methods   |
//! | [`AuthProviderRegistry`] | Method → provider map, lock-free lookups         |
//! | [`AuthRetryHelper`]      | One-shot retry of an AD login that timed out     |
//! | [`SecureString`]         | Password storage wiped on drop                   |

mod method;
mod provider;
mod registry;
mod retry;
mod secret;
mod token;

pub use method::AuthenticationMethod;
pub use provider::{AuthParameters, AuthProvider, AuthToken};
pub use registry::{
    AuthProviderRegistry, AuthProviderRegistryBuilder, Registration, DEFAULT_APPLICATION_CLIENT_ID,
};
pub use retry::{AuthRetryHelper, AuthRetryState};
pub use secret::SecureString;
pub use token::acquire_token_with_timeout;
