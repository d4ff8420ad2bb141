//! Credential lookup seam
//!
//! The engine reaches credentials only through this trait; in production
//! that is the broker client, in tests an in-memory map.

use async_trait::async_trait;

use crate::error::BrokerError;
use crate::state::Credential;

/// Source of provider credentials
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetch the credential for a provider
    async fn get(&self, provider: &str) -> Result<Credential, BrokerError>;

    /// Non-mutating availability probe; never an error path
    async fn has_credentials(&self, provider: &str) -> bool {
        self.get(provider).await.is_ok()
    }
}
