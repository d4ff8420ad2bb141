//! Error types for the FQDN manager
//!
//! This module defines all error types used throughout the crate.
//! User-visible variants carry the concrete remediation step in their
//! message; transient classifications (unknown status, ambiguous
//! registrar) are modelled as values, not errors.

use thiserror::Error;

/// Result type alias for FQDN manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the FQDN manager
#[derive(Error, Debug)]
pub enum Error {
    /// Backing storage for a store has not been provisioned
    #[error(
        "store not initialized: {path}. Run the provisioning step (`fqdnmgr init` / `fqdn-credd init`) to create it"
    )]
    StoreNotInitialized {
        /// Path of the missing backing file
        path: String,
    },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// No stored credentials for a resolved registrar
    #[error(
        "no credentials stored for provider {provider}. Add them with: fqdn-credd add {provider} <username> <secret>"
    )]
    CredentialsUnavailable {
        /// Canonical provider name
        provider: String,
    },

    /// Credential broker client errors (socket, wire protocol)
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The WAN IP is needed but has not been configured
    #[error("WAN IP is not configured. Set FQDN_WAN_IP or the wan_ip config field")]
    WanIpUnknown,

    /// No registrar could be resolved for a domain
    #[error(
        "could not resolve a registrar for {domain}. Pass one explicitly or add credentials for it"
    )]
    RegistrarUnresolved {
        /// The domain being operated on
        domain: String,
    },

    /// A provider does not implement an optional capability
    #[error("provider {provider} does not implement {operation}")]
    NotImplemented {
        /// Canonical provider name
        provider: String,
        /// The missing operation
        operation: String,
    },

    /// Provider-specific error, surfaced verbatim
    #[error("provider error ({provider}): {message}")]
    Provider {
        /// Canonical provider name
        provider: String,
        /// Error message from the plugin
        message: String,
    },

    /// DNS propagation did not complete within the configured timeout
    #[error("DNS propagation timed out for {domain} after {waited_secs}s")]
    PropagationTimeout {
        /// The domain that failed to propagate
        domain: String,
        /// Seconds waited before giving up
        waited_secs: u64,
    },

    /// DNS query errors
    #[error("DNS error: {0}")]
    Dns(String),

    /// WHOIS query errors
    #[error("WHOIS error: {0}")]
    Whois(String),

    /// Cache read/write errors
    #[error("cache error: {0}")]
    Cache(String),

    /// State store read/write errors
    #[error("state store error: {0}")]
    StateStore(String),

    /// Row not found where one is required (credential update/delete)
    #[error("not found: {0}")]
    NotFound(String),

    /// A required environment variable is absent
    #[error("required environment variable {0} is not set")]
    MissingEnv(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a DNS error
    pub fn dns(msg: impl Into<String>) -> Self {
        Self::Dns(msg.into())
    }

    /// Create a WHOIS error
    pub fn whois(msg: impl Into<String>) -> Self {
        Self::Whois(msg.into())
    }

    /// Create a cache error
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a "not implemented" error for a missing provider capability
    pub fn not_implemented(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            provider: provider.into(),
            operation: operation.into(),
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Credential broker client error taxonomy.
///
/// Every caller of the broker surfaces exactly one of these variants;
/// raw transport errors never escape the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker socket does not exist or refuses connections
    #[error(
        "credential broker socket not available at {path}. Start the broker: fqdn-credd serve"
    )]
    SocketNotFound {
        /// Configured socket path
        path: String,
    },

    /// The broker has no row for the requested provider
    #[error("no credentials for provider {0}")]
    NoCredentials(String),

    /// The broker's credential database has not been provisioned
    #[error("credential database not found. Run `fqdn-credd init` to create it")]
    DatabaseNotFound,

    /// Any other error reported by the broker
    #[error("credential broker error: {0}")]
    Generic(String),

    /// The broker answered with something outside the wire protocol
    #[error("invalid response from credential broker")]
    InvalidResponse,

    /// The broker returned an OK response missing the username or secret
    #[error("incomplete credentials for provider {0}")]
    IncompleteCredentials(String),
}
