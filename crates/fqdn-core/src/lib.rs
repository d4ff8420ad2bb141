// # fqdn-core
//
// Core library for domain-registration lifecycle management:
//
// - **ExpiringCache**: typed key/value store with per-kind TTL
// - **DomainStore**: durable domain → status/registrar table
// - **CredentialStore** + broker: provider credentials behind a local socket
// - **Registrar resolution**: WHOIS + hint + credential availability → action
// - **Propagation pollers**: adaptive single-domain and parallel batch waits
// - **FqdnEngine**: orchestrates the user-facing operations
// - **RegistrarProvider**: trait seam for per-registrar plugins, with a
//   registry keyed by canonical provider name
//
// ## Design Principles
//
// 1. **Separation of Concerns**: decision logic is pure; side effects
//    (prompting, DNS, registrar APIs) live behind injected traits
// 2. **Plugin-Based**: registrar providers are registered dynamically
// 3. **Idempotency**: expected DNS state is checked before any registrar
//    push, so re-runs never re-push or poison the timing model
// 4. **Degradation over failure**: ambiguous or transient classifications
//    become an explicit "unknown", never a crash

pub mod broker;
pub mod cache;
pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod propagation;
pub mod registry;
pub mod resolve;
pub mod state;
pub mod traits;
pub mod whois;

// Re-export core types for convenience
pub use broker::{BrokerClient, BrokerServer};
pub use cache::{CacheKind, ExpiringCache};
pub use config::FqdnConfig;
pub use dns::HickoryDns;
pub use engine::{CheckOutcome, FqdnEngine, InitDnsOutcome};
pub use error::{BrokerError, Error, Result};
pub use propagation::{ExpectedRecord, PropagationOutcome};
pub use registry::ProviderRegistry;
pub use state::{Credential, CredentialStore, DomainStatus, DomainStore};
pub use traits::{Capability, CredentialPrompt, CredentialSource, RegistrarProvider};
pub use whois::{WhoisClient, WhoisLookup};
