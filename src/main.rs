//! replchan - run commands in a remote repl
//!
//! Provides both a REPL and one-shot command execution over a channel
//! multiplexed on the repl's WebSocket.

mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use replchan_client::resolver::DEFAULT_BASE_URL;
use replchan_client::{Client, ConnectionConfig, Resolver, TlsClientConfig};
use replchan_protocol::Exec;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replchan")]
#[command(about = "Run commands in a remote repl over a multiplexed WebSocket")]
#[command(version)]
struct Cli {
    /// Owner of the repl
    #[arg(short, long, env = "REPL_USER")]
    user: String,

    /// Repl name
    #[arg(short, long, env = "REPL_NAME")]
    repl: String,

    /// API key used to mint the session token
    #[arg(short, long, env = "REPLKEY", hide_env_values = true)]
    key: Option<String>,

    /// REST endpoint resolving repls and tokens
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api: String,

    /// Execution host
    #[arg(long, default_value = "eval.repl.it")]
    host: String,

    /// Execution host port
    #[arg(long, default_value_t = 80)]
    port: u16,

    /// Connect with wss://
    #[arg(long)]
    secure: bool,

    /// Path to CA certificate for server verification
    #[arg(long, env = "REPLCHAN_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Service to open a channel to
    #[arg(long, default_value = "exec")]
    service: String,

    /// Channel name
    #[arg(long, default_value = "execer")]
    name: String,

    /// Request timeout in seconds (waits indefinitely if unset)
    #[arg(short, long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Run one command and print its output
    Exec {
        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Resolve credentials before touching the socket
    let credentials = Resolver::with_base_url(&cli.api)
        .resolve(&cli.user, &cli.repl, cli.key.as_deref().unwrap_or_default())
        .await
        .map_err(|e| {
            eprintln!("{}: {}", "Authentication failed".red(), e);
            e
        })?;
    tracing::debug!("Resolved @{}/{} to {}", cli.user, cli.repl, credentials.id);

    let mut config =
        ConnectionConfig::for_token(&cli.host, cli.port, &credentials.token, cli.secure);
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(Duration::from_secs(secs));
    }
    if let Some(ref path) = cli.ca_cert {
        config = config.with_tls(TlsClientConfig::new().with_ca_cert(path));
    }
    let client = Client::new(config);

    client.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    let channel = match client.open(&cli.service, &cli.name).await {
        Ok(channel) => channel,
        Err(e) => {
            eprintln!("{}: {}", "Failed to open channel".red(), e);
            let _ = client.close().await;
            return Err(e.into());
        }
    };

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(&client, &channel).await?;
        }
        Some(Commands::Exec { args }) => {
            let result = channel.get_output(Exec::new(args)).await;
            let _ = client.close().await;
            match result {
                Ok(output) => {
                    print!("{}", output);
                    std::io::stdout().flush()?;
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
