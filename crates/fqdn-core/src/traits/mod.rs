//! Trait seams for external collaborators: registrar provider plugins,
//! DNS queries, credential lookup, and interactive prompting.

pub mod credential_source;
pub mod dns_query;
pub mod prompt;
pub mod registrar_provider;

pub use credential_source::CredentialSource;
pub use dns_query::{DnsQuery, RecordKind};
pub use prompt::{CredentialPrompt, MismatchChoice};
pub use registrar_provider::{
    Capability, PurchaseOutcome, RegistrarProvider, RegistrarProviderFactory,
};
