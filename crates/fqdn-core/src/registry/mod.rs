//! Plugin-based registrar provider registry
//!
//! Providers register a factory under their canonical name; the engine
//! instantiates one per operation from the credentials the broker
//! served. No hardcoded if-else chains over registrar names.
//!
//! ```rust,ignore
//! use fqdn_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! registry.register("namecheap.com", Box::new(NamecheapFactory));
//!
//! let provider = registry.create("namecheap.com", &credentials)?;
//! ```

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::state::Credential;
use crate::traits::{RegistrarProvider, RegistrarProviderFactory};

/// Registry of registrar provider factories, keyed by canonical name
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, Box<dyn RegistrarProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory under a canonical registrar name
    pub fn register(&self, name: impl Into<String>, factory: Box<dyn RegistrarProviderFactory>) {
        let name = name.into();
        let mut factories = self.factories.write().unwrap();
        factories.insert(name, factory);
    }

    /// Create a provider bound to the given credentials
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn RegistrarProvider>)`: created provider instance
    /// - `Err(Error)`: no factory registered for the name, or creation
    ///   failed
    pub fn create(&self, name: &str, credentials: &Credential) -> Result<Box<dyn RegistrarProvider>> {
        let factories = self.factories.read().unwrap();
        let factory = factories.get(name).ok_or_else(|| {
            Error::config(format!(
                "no provider plugin registered for {name}. Install the plugin or pick another registrar"
            ))
        })?;
        factory.create(credentials)
    }

    /// Whether a provider is registered under this name
    pub fn has_provider(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap();
        factories.contains_key(name)
    }

    /// All registered provider names
    pub fn list_providers(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap();
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }
}
