//! Lookup proxy orchestration.
//!
//! Wires the cache, backend client and TCP transport together and runs the
//! proxy server.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::backend::{self, BackendClient};
use crate::cache::{DEFAULT_CAPACITY, EvictionPolicy, LookupCache};
use crate::error::{ConfigError, Result};
use crate::resolver::Resolver;
use crate::transport::tcp::{ConnectionLimits, TcpTransport};

/// Configuration for the lookup proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:5300)
    pub bind_addr: SocketAddr,
    /// Directory backend queried on cache misses
    pub backend_addr: SocketAddr,
    /// Number of cache slots
    pub capacity: usize,
    pub eviction: EvictionPolicy,
    /// Per-attempt deadline for a backend exchange
    pub backend_timeout: Duration,
    /// Extra attempts after a failed backend exchange
    pub backend_retries: u32,
    pub limits: ConnectionLimits,
    /// How often to log statistics; `None` disables reporting
    pub stats_interval: Option<Duration>,
}

impl ProxyConfig {
    /// Configuration with default cache, limits and timeouts.
    pub fn new(bind_addr: SocketAddr, backend_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backend_addr,
            capacity: DEFAULT_CAPACITY,
            eviction: EvictionPolicy::RoundRobin,
            backend_timeout: backend::DEFAULT_TIMEOUT,
            backend_retries: 0,
            limits: ConnectionLimits::default(),
            stats_interval: Some(Duration::from_secs(60)),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.limits.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        if self.backend_timeout.is_zero() {
            return Err(ConfigError::ZeroBackendTimeout);
        }
        Ok(())
    }
}

/// A bound, not yet running, proxy.
pub struct Proxy {
    transport: TcpTransport,
    resolver: Arc<Resolver<BackendClient>>,
    stats_interval: Option<Duration>,
}

impl Proxy {
    /// Validate the configuration and bind the listening socket.
    pub async fn bind(config: ProxyConfig) -> Result<Self> {
        config.validate()?;

        let backend = BackendClient::new(config.backend_addr)
            .with_timeout(config.backend_timeout)
            .with_retries(config.backend_retries);
        let cache = LookupCache::with_policy(config.capacity, config.eviction);
        let resolver = Arc::new(Resolver::new(cache, backend));
        let transport = TcpTransport::bind(config.bind_addr, config.limits).await?;

        Ok(Self {
            transport,
            resolver,
            stats_interval: config.stats_interval,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub fn resolver(&self) -> &Arc<Resolver<BackendClient>> {
        &self.resolver
    }

    /// Serve clients until `shutdown` completes and sessions have drained.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let cache = self.resolver.cache();
        info!(
            "Lookup proxy listening on {} ({} cache slots, {:?} eviction)",
            self.local_addr()
                .map_or_else(|_| "<unknown>".to_string(), |a| a.to_string()),
            cache.capacity(),
            cache.policy()
        );
        info!("Forwarding misses to backend: {}", self.resolver.backend().addr());

        let reporter = self
            .stats_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| spawn_stats_reporter(Arc::clone(&self.resolver), interval));

        self.transport.serve(Arc::clone(&self.resolver), shutdown).await;

        if let Some(reporter) = reporter {
            reporter.abort();
        }
    }
}

/// Bind and run the proxy until `shutdown` completes.
pub async fn run<F>(config: ProxyConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    Proxy::bind(config).await?.run(shutdown).await;
    Ok(())
}

/// Log statistics every `interval`.
fn spawn_stats_reporter(
    resolver: Arc<Resolver<BackendClient>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = resolver.stats_snapshot_and_reset();
            info!(
                "[stats] uptime={}s cache={}/{} sessions={} requests={} cached={} forwarded={} not_found={} unavailable={} malformed={} avg_response={:.2}ms",
                stats.uptime_secs,
                resolver.cache_len(),
                resolver.cache().capacity(),
                stats.sessions,
                stats.requests,
                stats.cached,
                stats.forwarded,
                stats.not_found,
                stats.unavailable,
                stats.malformed,
                stats.avg_response_ms
            );
            for (slot, entry) in resolver.cache_dump().iter().enumerate() {
                debug!(slot, name = %entry.name, address = %entry.address, "cache entry");
            }
        }
    })
}
