use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dns_relay::cache::{DEFAULT_CAPACITY, EvictionPolicy};
use dns_relay::directory::{Directory, DirectoryServer};
use dns_relay::error::ConfigError;
use dns_relay::proxy::{self, ProxyConfig};
use dns_relay::transport::tcp::ConnectionLimits;

#[derive(Parser)]
#[command(name = "dns-relay")]
#[command(about = "Caching name/address lookup proxy", long_about = None)]
struct Args {
    /// Enable debug logging (per-query outcome, timing, cache dumps)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the caching proxy
    Proxy(ProxyArgs),
    /// Run the file-backed directory backend
    Directory(DirectoryArgs),
}

#[derive(clap::Args)]
struct ProxyArgs {
    /// Local port to listen on
    #[arg(short, long, default_value = "5300")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Directory backend (host:port)
    #[arg(long, default_value = "127.0.0.1:12005")]
    backend: String,

    /// Number of cache slots
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Cache eviction policy
    #[arg(long, value_enum, default_value = "round-robin")]
    eviction: Eviction,

    /// Maximum number of concurrently served clients
    #[arg(long, default_value = "64")]
    max_connections: usize,

    /// Deadline for one backend exchange, in milliseconds
    #[arg(long, default_value = "5000")]
    backend_timeout_ms: u64,

    /// Extra attempts after a failed backend exchange
    #[arg(long, default_value = "0")]
    backend_retries: u32,

    /// Close idle client sessions after this many seconds
    #[arg(long)]
    client_timeout_secs: Option<u64>,

    /// Seconds between statistics lines (0 disables)
    #[arg(long, default_value = "60")]
    stats_interval_secs: u64,
}

#[derive(clap::Args)]
struct DirectoryArgs {
    /// Local port to listen on
    #[arg(short, long, default_value = "12005")]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Database file with one "<name> <address>" pair per line
    #[arg(short, long, default_value = "database.txt")]
    database: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Eviction {
    RoundRobin,
    Lru,
}

impl From<Eviction> for EvictionPolicy {
    fn from(eviction: Eviction) -> Self {
        match eviction {
            Eviction::RoundRobin => EvictionPolicy::RoundRobin,
            Eviction::Lru => EvictionPolicy::LeastRecentlyUsed,
        }
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    addr.parse()
        .map_err(|source| ConfigError::InvalidAddress {
            addr: addr.to_string(),
            source,
        })
}

impl ProxyArgs {
    fn into_config(self) -> Result<ProxyConfig, ConfigError> {
        let bind_addr = parse_addr(&format!("{}:{}", self.bind, self.port))?;
        let backend_addr = parse_addr(&self.backend)?;

        let mut config = ProxyConfig::new(bind_addr, backend_addr);
        config.capacity = self.capacity;
        config.eviction = self.eviction.into();
        config.backend_timeout = Duration::from_millis(self.backend_timeout_ms);
        config.backend_retries = self.backend_retries;
        config.limits = ConnectionLimits {
            max_connections: self.max_connections,
            client_timeout: self.client_timeout_secs.map(Duration::from_secs),
            ..ConnectionLimits::default()
        };
        config.stats_interval = Some(Duration::from_secs(self.stats_interval_secs));

        config.validate()?;
        Ok(config)
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down..."),
        Err(e) => {
            warn!(error = %e, "failed to listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Proxy(args) => {
            let config = args.into_config().context("Invalid proxy configuration")?;
            proxy::run(config, shutdown_signal())
                .await
                .context("Lookup proxy failed")?;
        }
        Command::Directory(args) => {
            let bind_addr = parse_addr(&format!("{}:{}", args.bind, args.port))?;
            let directory = Directory::new(args.database);
            let database = directory.path().display().to_string();
            let server = DirectoryServer::bind(bind_addr, directory)
                .await
                .with_context(|| format!("Failed to bind directory server on {bind_addr}"))?;
            info!("Directory service listening on {bind_addr} (database {database})");
            server.serve(shutdown_signal()).await;
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(args.command))
}
