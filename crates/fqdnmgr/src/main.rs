// # fqdnmgr - Domain Lifecycle CLI
//
// Thin integration layer over fqdn-core:
// 1. Reads configuration from FQDN_* environment variables
// 2. Wires the engine's collaborators (DNS, WHOIS, broker client)
// 3. Dispatches the subcommand and maps the result to an exit code
//
// All lifecycle logic lives in fqdn-core; nothing here retries, polls
// or persists on its own.
//
// ## Configuration
//
// - `FQDN_CACHE_PATH`: expiring cache file
// - `FQDN_DOMAINS_PATH`: domain status store
// - `FQDN_CREDENTIALS_PATH`: credential store (interactive capture only)
// - `FQDN_BROKER_SOCKET`: credential broker socket
// - `FQDN_WAN_IP`: public IP for initial records and provider hooks
// - `FQDN_PUBLIC_RESOLVER`: resolver queried after authoritative
//   confirmation
// - `FQDN_PROPAGATION_TIMEOUT_SECS`, `FQDN_SWEEP_INTERVAL_SECS`
// - `FQDN_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## ACME hooks
//
// `fqdnmgr certify` and `fqdnmgr cleanup` are meant to run as the
// certificate tool's DNS-01 auth/cleanup hooks; they read
// CERTBOT_DOMAIN and CERTBOT_VALIDATION from the environment and exit
// non-zero on failure, aborting issuance.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use fqdn_core::engine::InitDnsOutcome;
use fqdn_core::state::Credential;
use fqdn_core::traits::{CredentialPrompt, MismatchChoice, PurchaseOutcome};
use fqdn_core::{
    BrokerClient, DomainStore, FqdnConfig, FqdnEngine, HickoryDns, ProviderRegistry, WhoisClient,
};

/// Exit codes for the CLI
///
/// - 0: success
/// - 1: actionable condition (config missing, insufficient funds,
///   records not yet propagated)
/// - 2: runtime error
#[derive(Debug, Clone, Copy)]
enum CliExit {
    Ok = 0,
    Actionable = 1,
    RuntimeError = 2,
}

impl From<CliExit> for ExitCode {
    fn from(code: CliExit) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser)]
#[command(name = "fqdnmgr")]
#[command(about = "Domain registration lifecycle manager")]
#[command(version)]
struct Cli {
    /// Never prompt; ambiguous resolutions degrade to unknown
    #[arg(short = 'n', long = "non-interactive", global = true)]
    non_interactive: bool,

    /// Verbose output (debug-level logging)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the domain status store
    Init,

    /// Check domain status (free/owned/taken) via registrar API or
    /// local database
    Check {
        /// Domain to check
        fqdn: String,
        /// Registrar hint (optional)
        registrar: Option<String>,
    },

    /// Purchase a domain through a registrar
    Purchase {
        /// Domain to purchase
        fqdn: String,
        /// Registrar to use
        registrar: String,
    },

    /// List domains from the local database or a registrar account
    List {
        /// Filter by registrar
        registrar: Option<String>,
        /// Data source: local or remote
        #[arg(default_value = "local")]
        source: String,
    },

    /// Publish the ACME DNS-01 validation record (certbot auth hook)
    Certify,

    /// Remove the ACME DNS-01 validation record (certbot cleanup hook)
    Cleanup,

    /// Set initial DNS records (A @, A *, MX @) for domains and wait
    /// for propagation
    #[command(name = "setInitDNSRecords")]
    SetInitDnsRecords {
        /// Domains to process
        #[arg(short = 'd', long = "domains", required = true, num_args = 1..)]
        domains: Vec<String>,
        /// Registrar whose DNS API to use
        #[arg(short = 'r', long = "registrar")]
        registrar: String,
        /// Delete existing records before setting new ones
        #[arg(short = 'o', long = "override")]
        override_existing: bool,
    },

    /// Check whether the initial DNS records have propagated
    #[command(name = "checkInitDns")]
    CheckInitDns {
        /// Domain to check
        fqdn: String,
    },
}

/// Interactive credential capture on the controlling terminal
struct TerminalPrompt;

#[async_trait]
impl CredentialPrompt for TerminalPrompt {
    async fn capture_credentials(
        &self,
        provider: &str,
    ) -> fqdn_core::Result<Option<Credential>> {
        let provider = provider.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("Credentials needed for provider {provider}.");
            let username = read_line("Username (empty to abort): ")?;
            if username.is_empty() {
                return Ok(None);
            }
            let secret = read_line("Secret: ")?;
            if secret.is_empty() {
                return Ok(None);
            }
            Ok(Some(Credential { username, secret }))
        })
        .await
        .map_err(|e| fqdn_core::Error::Other(e.to_string()))?
    }

    async fn resolve_mismatch(
        &self,
        whois: &str,
        hint: &str,
    ) -> fqdn_core::Result<MismatchChoice> {
        let whois = whois.to_string();
        let hint = hint.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("WHOIS names {whois} but {hint} was expected.");
            eprintln!("  [1] supply credentials for {whois} now");
            eprintln!("  [2] give up (treat as unknown)");
            eprintln!("  [3] fall back to {hint}");
            let choice = read_line("Choice [1/2/3]: ")?;
            Ok(match choice.as_str() {
                "1" => MismatchChoice::SupplyWhoisCredentials,
                "3" => MismatchChoice::FallBackToHint,
                _ => MismatchChoice::GiveUp,
            })
        })
        .await
        .map_err(|e| fqdn_core::Error::Other(e.to_string()))?
    }
}

fn read_line(prompt: &str) -> fqdn_core::Result<String> {
    use std::io::Write;
    eprint!("{prompt}");
    std::io::stderr().flush().ok();
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(fqdn_core::Error::Io)?;
    Ok(line.trim().to_string())
}

/// Assemble the configuration from FQDN_* environment variables
fn config_from_env() -> Result<FqdnConfig> {
    let mut config = FqdnConfig::default();

    if let Ok(path) = env::var("FQDN_CACHE_PATH") {
        config.cache_path = path.into();
    }
    if let Ok(path) = env::var("FQDN_DOMAINS_PATH") {
        config.domains_path = path.into();
    }
    if let Ok(path) = env::var("FQDN_CREDENTIALS_PATH") {
        config.credentials_path = path.into();
    }
    if let Ok(path) = env::var("FQDN_BROKER_SOCKET") {
        config.broker_socket = path.into();
    }
    if let Ok(ip) = env::var("FQDN_WAN_IP") {
        config.wan_ip = Some(ip.parse().map_err(|e| {
            anyhow::anyhow!("FQDN_WAN_IP is not a valid IP address ({ip}): {e}")
        })?);
    }
    if let Ok(ip) = env::var("FQDN_PUBLIC_RESOLVER") {
        config.public_resolver = ip.parse().map_err(|e| {
            anyhow::anyhow!("FQDN_PUBLIC_RESOLVER is not a valid IP address ({ip}): {e}")
        })?;
    }
    if let Ok(secs) = env::var("FQDN_PROPAGATION_TIMEOUT_SECS") {
        config.propagation.timeout_secs = secs
            .parse()
            .map_err(|_| anyhow::anyhow!("FQDN_PROPAGATION_TIMEOUT_SECS must be a number"))?;
    }
    if let Ok(secs) = env::var("FQDN_SWEEP_INTERVAL_SECS") {
        config.sweep_interval_secs = secs
            .parse()
            .map_err(|_| anyhow::anyhow!("FQDN_SWEEP_INTERVAL_SECS must be a number"))?;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match env::var("FQDN_LOG_LEVEL").unwrap_or_default().to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return CliExit::RuntimeError.into();
    }

    let config = match config_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return CliExit::Actionable.into();
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            return CliExit::RuntimeError.into();
        }
    };

    rt.block_on(run(cli, config)).into()
}

async fn run(cli: Cli, config: FqdnConfig) -> CliExit {
    if let Commands::Init = cli.command {
        return match DomainStore::init(&config.domains_path).await {
            Ok(_) => {
                info!("domain store ready at {}", config.domains_path.display());
                CliExit::Ok
            }
            Err(e) => {
                error!("init failed: {e}");
                CliExit::RuntimeError
            }
        };
    }

    // Registrar provider plugins register themselves here at startup.
    // The registry stays empty in a bare install; operations needing a
    // provider then fail with the plugin-missing remediation.
    let registry = Arc::new(ProviderRegistry::new());

    let prompt: Option<Box<dyn CredentialPrompt>> = if cli.non_interactive {
        None
    } else {
        Some(Box::new(TerminalPrompt))
    };

    let engine = match FqdnEngine::new(
        config.clone(),
        registry,
        Box::new(HickoryDns::new()),
        Box::new(WhoisClient::new()),
        Box::new(BrokerClient::new(&config.broker_socket)),
        prompt,
    )
    .await
    {
        Ok(engine) => engine,
        Err(e @ fqdn_core::Error::StoreNotInitialized { .. }) => {
            error!("{e}");
            return CliExit::Actionable;
        }
        Err(e) => {
            error!("startup failed: {e}");
            return CliExit::RuntimeError;
        }
    };

    match cli.command {
        Commands::Init => unreachable!("handled above"),

        Commands::Check { fqdn, registrar } => {
            match engine.check(&fqdn, registrar.as_deref()).await {
                Ok(outcome) => {
                    println!("{outcome}");
                    CliExit::Ok
                }
                Err(e) => {
                    error!("check failed: {e}");
                    CliExit::RuntimeError
                }
            }
        }

        Commands::Purchase { fqdn, registrar } => {
            match engine.purchase(&fqdn, &registrar).await {
                Ok(PurchaseOutcome::Purchased) => {
                    println!("purchased {fqdn}");
                    CliExit::Ok
                }
                Ok(PurchaseOutcome::InsufficientFunds) => {
                    error!("insufficient funds at {registrar} to purchase {fqdn}");
                    CliExit::Actionable
                }
                Err(e) => {
                    error!("purchase failed: {e}");
                    CliExit::RuntimeError
                }
            }
        }

        Commands::List { registrar, source } => match source.as_str() {
            "local" => match engine.list_local(registrar.as_deref()).await {
                Ok(rows) => {
                    for (domain, record) in rows {
                        println!(
                            "{domain} status={} registrar={}",
                            record.status,
                            record.registrar.as_deref().unwrap_or("")
                        );
                    }
                    CliExit::Ok
                }
                Err(e) => {
                    error!("list failed: {e}");
                    CliExit::RuntimeError
                }
            },
            "remote" => {
                let Some(registrar) = registrar else {
                    error!("listing remote domains requires a registrar");
                    return CliExit::Actionable;
                };
                match engine.list_remote(&registrar).await {
                    Ok(domains) => {
                        for domain in domains {
                            println!("{domain}");
                        }
                        CliExit::Ok
                    }
                    Err(e) => {
                        error!("list failed: {e}");
                        CliExit::RuntimeError
                    }
                }
            }
            other => {
                error!("unknown list source {other}; expected local or remote");
                CliExit::Actionable
            }
        },

        Commands::Certify => match engine.certify_from_env().await {
            Ok(()) => CliExit::Ok,
            Err(e) => {
                error!("certify hook failed: {e}");
                CliExit::RuntimeError
            }
        },

        Commands::Cleanup => match engine.cleanup_from_env().await {
            Ok(()) => CliExit::Ok,
            Err(e) => {
                error!("cleanup hook failed: {e}");
                CliExit::RuntimeError
            }
        },

        Commands::SetInitDnsRecords {
            domains,
            registrar,
            override_existing,
        } => {
            match engine
                .set_init_dns_records(&domains, &registrar, override_existing)
                .await
            {
                Ok(results) => {
                    let mut all_ok = true;
                    for (domain, outcome) in results {
                        match outcome {
                            InitDnsOutcome::AlreadyVisible => {
                                println!("{domain}: already set");
                            }
                            InitDnsOutcome::Propagated { elapsed_secs } => {
                                println!("{domain}: propagated after {elapsed_secs}s");
                            }
                            InitDnsOutcome::TimedOut { waited_secs } => {
                                all_ok = false;
                                println!("{domain}: not propagated after {waited_secs}s");
                            }
                            InitDnsOutcome::ProviderFailed(message) => {
                                all_ok = false;
                                println!("{domain}: provider error: {message}");
                            }
                        }
                    }
                    if all_ok { CliExit::Ok } else { CliExit::Actionable }
                }
                Err(e) => {
                    error!("setInitDNSRecords failed: {e}");
                    CliExit::RuntimeError
                }
            }
        }

        Commands::CheckInitDns { fqdn } => match engine.check_init_dns(&fqdn).await {
            Ok(true) => {
                println!("{fqdn}: propagated");
                CliExit::Ok
            }
            Ok(false) => {
                println!("{fqdn}: not yet propagated");
                CliExit::Actionable
            }
            Err(e) => {
                error!("checkInitDns failed: {e}");
                CliExit::RuntimeError
            }
        },
    }
}
