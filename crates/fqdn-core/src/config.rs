//! Configuration types for the FQDN manager
//!
//! This module defines all configuration structures used throughout the
//! crate. Binaries assemble an [`FqdnConfig`] from environment variables
//! and flags; the library never reads ambient global state itself (the
//! WAN IP in particular is an explicit field, not a hidden lookup).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

/// Main FQDN manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FqdnConfig {
    /// Path of the expiring DNS/WHOIS cache file
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,

    /// Path of the domain status store
    #[serde(default = "default_domains_path")]
    pub domains_path: PathBuf,

    /// Path of the credential store (read directly only by privileged
    /// tooling; everything else goes through the broker socket)
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,

    /// Path of the credential broker's Unix socket
    #[serde(default = "default_broker_socket")]
    pub broker_socket: PathBuf,

    /// Public WAN IP of this host, if known
    ///
    /// Required for `setInitDNSRecords` and for provider certify/cleanup
    /// hooks; operations that need it fail with an explicit error when
    /// it is unset.
    #[serde(default)]
    pub wan_ip: Option<IpAddr>,

    /// Fixed public resolver queried after authoritative confirmation
    #[serde(default = "default_public_resolver")]
    pub public_resolver: IpAddr,

    /// TLD → ordered registrar preference list, consulted when neither
    /// WHOIS nor a hint names a registrar
    #[serde(default = "default_tld_priority")]
    pub tld_priority: HashMap<String, Vec<String>>,

    /// Per-registrar propagation profiles (canonical name → profile)
    #[serde(default = "default_registrar_profiles")]
    pub registrars: HashMap<String, RegistrarProfile>,

    /// Propagation polling settings
    #[serde(default)]
    pub propagation: PropagationSettings,

    /// Seconds between sweeps of non-owned rows in the domain store
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl FqdnConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            cache_path: default_cache_path(),
            domains_path: default_domains_path(),
            credentials_path: default_credentials_path(),
            broker_socket: default_broker_socket(),
            wan_ip: None,
            public_resolver: default_public_resolver(),
            tld_priority: default_tld_priority(),
            registrars: default_registrar_profiles(),
            propagation: PropagationSettings::default(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.propagation.timeout_secs == 0 {
            return Err(crate::Error::config("propagation timeout must be > 0"));
        }
        if self.propagation.min_interval_secs == 0 {
            return Err(crate::Error::config(
                "propagation minimum poll interval must be > 0",
            ));
        }
        if self.propagation.min_interval_secs > self.propagation.timeout_secs {
            return Err(crate::Error::config(
                "propagation minimum poll interval exceeds the timeout",
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(crate::Error::config("sweep interval must be > 0"));
        }
        Ok(())
    }

    /// Propagation profile for a registrar, if one is configured
    pub fn registrar_profile(&self, registrar: &str) -> Option<&RegistrarProfile> {
        self.registrars.get(registrar)
    }

    /// Buffer applied after confirmed propagation, per registrar
    pub fn buffer_secs(&self, registrar: Option<&str>) -> u64 {
        registrar
            .and_then(|r| self.registrars.get(r))
            .and_then(|p| p.buffer_secs)
            .unwrap_or(self.propagation.default_buffer_secs)
    }
}

impl Default for FqdnConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-registrar propagation profile
///
/// Used as the fallback when the cache has no measured average for the
/// registrar's nameservers yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrarProfile {
    /// Expected propagation time in seconds
    pub average_propagation_secs: Option<u64>,

    /// Extra delay after confirmed propagation, giving slower secondary
    /// resolvers (the CA's included) a margin
    pub buffer_secs: Option<u64>,
}

/// Propagation polling settings shared by both poller variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationSettings {
    /// Floor for the adaptive wait interval, in seconds
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Average propagation time assumed when neither the cache nor a
    /// registrar profile has a value, in seconds
    #[serde(default = "default_average_secs")]
    pub default_average_secs: u64,

    /// Buffer after confirmed propagation when the registrar profile has
    /// none, in seconds
    #[serde(default = "default_buffer_secs")]
    pub default_buffer_secs: u64,

    /// Wall-clock timeout per domain, measured from the first check
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            default_average_secs: default_average_secs(),
            default_buffer_secs: default_buffer_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("/var/lib/fqdnmgr/dns.cache")
}

fn default_domains_path() -> PathBuf {
    PathBuf::from("/var/lib/fqdnmgr/domains.json")
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("/var/lib/fqdnmgr/credentials.json")
}

fn default_broker_socket() -> PathBuf {
    PathBuf::from("/run/fqdn-credd.sock")
}

fn default_public_resolver() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))
}

fn default_tld_priority() -> HashMap<String, Vec<String>> {
    let mut map = HashMap::new();
    map.insert(
        "com".to_string(),
        vec!["namecheap.com".to_string(), "wedos.com".to_string()],
    );
    map.insert(
        "org".to_string(),
        vec!["namecheap.com".to_string(), "wedos.com".to_string()],
    );
    map.insert("cz".to_string(), vec!["wedos.com".to_string()]);
    map
}

fn default_registrar_profiles() -> HashMap<String, RegistrarProfile> {
    let mut map = HashMap::new();
    map.insert(
        "namecheap.com".to_string(),
        RegistrarProfile {
            average_propagation_secs: Some(900),
            buffer_secs: Some(30),
        },
    );
    map.insert(
        "wedos.com".to_string(),
        RegistrarProfile {
            average_propagation_secs: Some(300),
            buffer_secs: Some(15),
        },
    );
    map
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_average_secs() -> u64 {
    300
}

fn default_buffer_secs() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    1800
}

fn default_sweep_interval_secs() -> u64 {
    604_800
}
