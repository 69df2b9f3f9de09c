//! Client for the authoritative directory backend.
//!
//! Every query is one short-lived TCP connection: connect, write the request
//! verbatim, read one reply, close. Any failure along the way is reported as
//! an [`Status::Unavailable`] reply instead of an error so the caller can decide
//! what it means for the session.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::protocol::{MAX_MESSAGE_SIZE, Reply, Status};

/// Default per-attempt deadline for connect, write and read combined.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const BACKOFF_BASE: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Delay before retry number `attempt + 1`, doubling up to [`MAX_BACKOFF`].
fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Source of authoritative answers for cache misses.
///
/// Implementations take the raw request bytes and return one decoded reply.
pub trait Backend: Send + Sync + 'static {
    fn query(&self, request: &[u8]) -> impl Future<Output = Reply> + Send;
}

/// TCP client for a directory backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    addr: SocketAddr,
    timeout: Duration,
    retries: u32,
}

impl BackendClient {
    /// Create a client with the default timeout and no retries.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry failed exchanges up to `retries` more times with exponential
    /// backoff. An explicit `-` reply from the backend is never retried.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn exchange(&self, request: &[u8]) -> Result<Reply, String> {
        let attempt = async {
            let mut stream = TcpStream::connect(self.addr)
                .await
                .map_err(|e| format!("connect to {} failed: {e}", self.addr))?;

            stream
                .write_all(request)
                .await
                .map_err(|e| format!("write to {} failed: {e}", self.addr))?;

            let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
            let len = stream
                .read(&mut buf)
                .await
                .map_err(|e| format!("read from {} failed: {e}", self.addr))?;
            if len == 0 {
                return Err(format!("{} closed without replying", self.addr));
            }

            Reply::parse(&buf[..len]).map_err(|e| format!("bad reply from {}: {e}", self.addr))
        };

        tokio::time::timeout(self.timeout, attempt)
            .await
            .unwrap_or_else(|_| Err(format!("{} timed out after {:?}", self.addr, self.timeout)))
    }
}

impl Backend for BackendClient {
    async fn query(&self, request: &[u8]) -> Reply {
        let mut attempt = 0;
        loop {
            match self.exchange(request).await {
                Ok(reply) => {
                    return match reply.status {
                        Status::Found | Status::NotFound | Status::Unavailable => reply,
                        // `0` is a proxy-to-client status; a backend never sends it.
                        Status::Success => {
                            Reply::unavailable(format!("unexpected status from {}", self.addr))
                        }
                    };
                }
                Err(reason) if attempt < self.retries => {
                    let delay = backoff(attempt);
                    debug!(%reason, attempt, ?delay, "backend exchange failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(reason) => {
                    warn!(%reason, "backend unavailable");
                    return Reply::unavailable(reason);
                }
            }
        }
    }
}
