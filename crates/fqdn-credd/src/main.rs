// # fqdn-credd - Credential Broker
//
// Runs the privileged side of credential handling:
//
// - `serve`: the broker daemon answering GET_CREDS requests over the
//   Unix socket, so unprivileged callers never read the store directly
// - `init` / `add` / `update` / `delete` / `list`: direct store
//   management for the operator
//
// The store file and the socket are the only protection boundary; run
// this under a dedicated user and keep the defaults' permissions.
//
// ## Configuration
//
// - `FQDN_CREDENTIALS_PATH`: credential store file
// - `FQDN_BROKER_SOCKET`: socket path for `serve`
// - `FQDN_LOG_LEVEL`: trace, debug, info, warn, error

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use fqdn_core::{BrokerServer, CredentialStore, Error};

/// Exit codes: 0 success, 1 actionable condition, 2 runtime error
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
#[command(name = "fqdn-credd")]
#[command(about = "Credential broker daemon and store management")]
#[command(version)]
struct Cli {
    /// Credential store file
    #[arg(long, env = "FQDN_CREDENTIALS_PATH", default_value = "/var/lib/fqdnmgr/credentials.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision an empty credential store
    Init,

    /// Serve credentials over the broker socket
    Serve {
        /// Socket path to bind
        #[arg(long, env = "FQDN_BROKER_SOCKET", default_value = "/run/fqdn-credd.sock")]
        socket: PathBuf,
    },

    /// Store (or replace) credentials for a provider
    Add {
        /// Provider name (e.g. namecheap.com)
        provider: String,
        /// API username / account identifier
        username: String,
        /// API secret / token
        secret: String,
    },

    /// Update existing credentials for a provider
    Update {
        /// Provider name
        provider: String,
        /// API username / account identifier
        username: String,
        /// API secret / token
        secret: String,
    },

    /// Delete stored credentials for a provider
    Delete {
        /// Provider name
        provider: String,
    },

    /// List stored providers (usernames masked)
    List,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match env::var("FQDN_LOG_LEVEL").unwrap_or_default().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
        return CliExit::RuntimeError.into();
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create tokio runtime: {e}");
            return CliExit::RuntimeError.into();
        }
    };

    rt.block_on(run(cli)).into()
}

async fn run(cli: Cli) -> CliExit {
    match cli.command {
        Commands::Init => match CredentialStore::init(&cli.store).await {
            Ok(_) => {
                info!("credential store ready at {}", cli.store.display());
                CliExit::Ok
            }
            Err(e) => {
                error!("init failed: {e}");
                CliExit::RuntimeError
            }
        },

        Commands::Serve { socket } => {
            let server = BrokerServer::new(&socket, &cli.store);
            match server.run().await {
                Ok(()) => CliExit::Ok,
                Err(e) => {
                    error!("broker stopped: {e}");
                    CliExit::RuntimeError
                }
            }
        }

        Commands::Add {
            provider,
            username,
            secret,
        } => with_store(&cli.store, |store| async move {
            store.add(&provider, &username, &secret).await?;
            println!("stored credentials for {provider}");
            Ok(())
        })
        .await,

        Commands::Update {
            provider,
            username,
            secret,
        } => with_store(&cli.store, |store| async move {
            store.update(&provider, &username, &secret).await?;
            println!("updated credentials for {provider}");
            Ok(())
        })
        .await,

        Commands::Delete { provider } => with_store(&cli.store, |store| async move {
            store.delete(&provider).await?;
            println!("deleted credentials for {provider}");
            Ok(())
        })
        .await,

        Commands::List => with_store(&cli.store, |store| async move {
            for (provider, masked_username) in store.list().await? {
                println!("{provider}\t{masked_username}");
            }
            Ok(())
        })
        .await,
    }
}

/// Open the store and run one operation, mapping errors to exit codes
async fn with_store<F, Fut>(path: &PathBuf, op: F) -> CliExit
where
    F: FnOnce(CredentialStore) -> Fut,
    Fut: Future<Output = fqdn_core::Result<()>>,
{
    let store = match CredentialStore::open(path).await {
        Ok(store) => store,
        Err(e @ Error::StoreNotInitialized { .. }) => {
            error!("{e}");
            return CliExit::Actionable;
        }
        Err(e) => {
            error!("failed to open credential store: {e}");
            return CliExit::RuntimeError;
        }
    };

    match op(store).await {
        Ok(()) => CliExit::Ok,
        Err(e @ Error::NotFound(_)) => {
            error!("{e}");
            CliExit::Actionable
        }
        Err(e) => {
            error!("operation failed: {e}");
            CliExit::RuntimeError
        }
    }
}
