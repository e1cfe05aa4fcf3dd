//! Authentication methods.

use std::fmt;
use std::str::FromStr;

use crate::error::TdsError;

/// How a connection authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthenticationMethod {
    NotSpecified,
    SqlPassword,
    ActiveDirectoryPassword,
    ActiveDirectoryIntegrated,
    ActiveDirectoryInteractive,
    ActiveDirectoryServicePrincipal,
    ActiveDirectoryDeviceCodeFlow,
    ActiveDirectoryManagedIdentity,
    ActiveDirectoryMsi,
    ActiveDirectoryDefault,
    ActiveDirectoryWorkloadIdentity,
}

impl AuthenticationMethod {
    /// Every method, in declaration order.
    pub const ALL: [AuthenticationMethod; 11] = [
        AuthenticationMethod::NotSpecified,
        AuthenticationMethod::SqlPassword,
        AuthenticationMethod::ActiveDirectoryPassword,
        AuthenticationMethod::ActiveDirectoryIntegrated,
        AuthenticationMethod::ActiveDirectoryInteractive,
        AuthenticationMethod::ActiveDirectoryServicePrincipal,
        AuthenticationMethod::ActiveDirectoryDeviceCodeFlow,
        AuthenticationMethod::ActiveDirectoryManagedIdentity,
        AuthenticationMethod::ActiveDirectoryMsi,
        AuthenticationMethod::ActiveDirectoryDefault,
        AuthenticationMethod::ActiveDirectoryWorkloadIdentity,
    ];

    /// Methods that obtain a token from Active Directory.
    pub const ACTIVE_DIRECTORY: [AuthenticationMethod; 9] = [
        AuthenticationMethod::ActiveDirectoryPassword,
        AuthenticationMethod::ActiveDirectoryIntegrated,
        AuthenticationMethod::ActiveDirectoryInteractive,
        AuthenticationMethod::ActiveDirectoryServicePrincipal,
        AuthenticationMethod::ActiveDirectoryDeviceCodeFlow,
        AuthenticationMethod::ActiveDirectoryManagedIdentity,
        AuthenticationMethod::ActiveDirectoryMsi,
        AuthenticationMethod::ActiveDirectoryDefault,
        AuthenticationMethod::ActiveDirectoryWorkloadIdentity,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthenticationMethod::NotSpecified => "not specified",
            AuthenticationMethod::SqlPassword => "sql password",
            AuthenticationMethod::ActiveDirectoryPassword => "active directory password",
            AuthenticationMethod::ActiveDirectoryIntegrated => "active directory integrated",
            AuthenticationMethod::ActiveDirectoryInteractive => "active directory interactive",
            AuthenticationMethod::ActiveDirectoryServicePrincipal => {
                "active directory service principal"
            }
            AuthenticationMethod::ActiveDirectoryDeviceCodeFlow => {
                "active directory device code flow"
            }
            AuthenticationMethod::ActiveDirectoryManagedIdentity => {
                "active directory managed identity"
            }
            AuthenticationMethod::ActiveDirectoryMsi => "active directory msi",
            AuthenticationMethod::ActiveDirectoryDefault => "active directory default",
            AuthenticationMethod::ActiveDirectoryWorkloadIdentity => {
                "active directory workload identity"
            }
        }
    }

    pub fn is_active_directory(&self) -> bool {
        Self::ACTIVE_DIRECTORY.contains(self)
    }
}

impl fmt::Display for AuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthenticationMethod {
    type Err = TdsError;

    /// Parse a provider configuration name. Only Active Directory methods can
    /// have a configured provider, so only their names are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ACTIVE_DIRECTORY
            .iter()
            .copied()
            .find(|m| m.as_str() == lower)
            .ok_or_else(|| TdsError::UnknownAuthenticationMethod(s.to_string()))
    }
}
