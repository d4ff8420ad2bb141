//! Credential broker: a privileged daemon serving credentials over a
//! local Unix socket so unprivileged callers never read the store
//! directly.
//!
//! Wire protocol, one line each way:
//!
//! ```text
//! -> GET_CREDS:<provider>
//! <- OK:<username>|<secret>
//! <- ERROR:no credentials for provider <provider>
//! <- ERROR:database not found
//! <- ERROR:unknown command
//! <- ERROR:<other>
//! ```

pub mod client;
pub mod server;

pub use client::BrokerClient;
pub use server::BrokerServer;

/// Request prefix for credential lookups
pub(crate) const GET_CREDS_PREFIX: &str = "GET_CREDS:";
/// Response prefix for successful lookups
pub(crate) const OK_PREFIX: &str = "OK:";
/// Response prefix for every error
pub(crate) const ERROR_PREFIX: &str = "ERROR:";
/// Error detail for a provider without a stored row
pub(crate) const ERR_NO_CREDS_PREFIX: &str = "no credentials for provider ";
/// Error detail for a missing credential database
pub(crate) const ERR_DB_NOT_FOUND: &str = "database not found";
/// Error detail for anything that is not a well-formed request
pub(crate) const ERR_UNKNOWN_COMMAND: &str = "unknown command";
