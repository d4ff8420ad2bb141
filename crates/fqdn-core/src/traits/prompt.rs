//! Interactive prompting seam
//!
//! The resolution decision function is pure; everything that touches a
//! terminal goes through this trait so the engine stays testable
//! without one.

use async_trait::async_trait;

use crate::error::Result;
use crate::state::Credential;

/// Choice offered when WHOIS and the caller's hint disagree and the
/// WHOIS registrar has no stored credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchChoice {
    /// Capture credentials for the WHOIS registrar now
    SupplyWhoisCredentials,
    /// Give up and classify the domain as unknown
    GiveUp,
    /// Fall back to the hinted registrar's credentials
    FallBackToHint,
}

/// Interactive credential capture and conflict resolution
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    /// Ask the operator for credentials for a provider.
    ///
    /// `None` means the operator declined; the resolution then degrades
    /// to unknown.
    async fn capture_credentials(&self, provider: &str) -> Result<Option<Credential>>;

    /// Ask the operator how to resolve a WHOIS/hint registrar conflict
    async fn resolve_mismatch(&self, whois: &str, hint: &str) -> Result<MismatchChoice>;
}
