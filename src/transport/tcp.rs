//! TCP transport for lookup queries.
//!
//! Each client connection is handled independently in its own task. A
//! connection carries any number of requests, answered one at a time, until
//! the client disconnects, sends the terminate marker, or the backend turns
//! out to be down.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{ACCEPT_ERROR_BACKOFF, MAX_MESSAGE_SIZE, SessionEnd, read_message};
use crate::backend::Backend;
use crate::protocol::Request;
use crate::resolver::Resolver;

/// Admission and timeout settings for client connections.
#[derive(Debug, Clone)]
pub struct ConnectionLimits {
    /// Maximum number of sessions served at once.
    pub max_connections: usize,
    /// Close a session when no request arrives for this long.
    pub client_timeout: Option<Duration>,
    /// How long shutdown waits for in-flight sessions.
    pub drain_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: 64,
            client_timeout: None,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// TCP transport for the lookup proxy.
///
/// Binds to a local address and accepts connections from clients.
/// Each connection is handled in a separate task.
pub struct TcpTransport {
    listener: TcpListener,
    limits: ConnectionLimits,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr, limits: ConnectionLimits) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { listener, limits })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes, then drain.
    ///
    /// At most `max_connections` sessions run at once; past that the accept
    /// loop waits for a session to finish before accepting again.
    pub async fn serve<B, F>(self, resolver: Arc<Resolver<B>>, shutdown: F)
    where
        B: Backend,
        F: Future<Output = ()>,
    {
        let max = self.limits.max_connections.clamp(1, Semaphore::MAX_PERMITS);
        let permits = Arc::new(Semaphore::new(max));
        let client_timeout = self.limits.client_timeout;
        tokio::pin!(shutdown);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (client, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "TCP accept error");
                        drop(permit);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                let _permit = permit;
                debug!(%peer, "client connected");
                let end = handle_connection(client, &resolver, client_timeout).await;
                debug!(%peer, ?end, "client session closed");
            });
        }

        drop(self.listener);
        info!("stopped accepting connections, draining sessions");

        let all = u32::try_from(max).unwrap_or(u32::MAX);
        match tokio::time::timeout(self.limits.drain_timeout, permits.acquire_many(all)).await {
            Ok(_) => info!("all sessions drained"),
            Err(_) => warn!(
                in_flight = max - permits.available_permits(),
                "drain timeout elapsed, abandoning sessions"
            ),
        }
    }
}

/// Run the request/reply loop for one client until the session ends.
pub async fn handle_connection<S, B>(
    mut client: S,
    resolver: &Resolver<B>,
    client_timeout: Option<Duration>,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
    B: Backend,
{
    resolver.stats().record_session();
    let mut buf = [0u8; MAX_MESSAGE_SIZE];

    loop {
        let len = match read_message(&mut client, &mut buf, client_timeout).await {
            Ok(0) => return SessionEnd::ClientDisconnected,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return SessionEnd::IdleTimeout,
            Err(e) => return SessionEnd::Io(e.kind()),
        };
        let raw = &buf[..len];

        let query = match Request::parse(raw) {
            Ok(Request::Terminate) => return SessionEnd::Terminated,
            Ok(Request::Lookup(query)) => query,
            Err(e) => {
                warn!(error = %e, "dropping malformed request");
                resolver.stats().record_malformed();
                continue;
            }
        };

        let start = Instant::now();
        let resolution = resolver.resolve(&query, raw).await;
        let reply = resolution.reply();

        if let Err(e) = client.write_all(&reply.encode()).await {
            return SessionEnd::Io(e.kind());
        }
        debug!(
            key = %query.key,
            direction = query.direction.as_str(),
            reply = %reply.payload,
            total_ms = start.elapsed().as_secs_f64() * 1000.0,
            "answered"
        );

        if resolution.ends_session() {
            return SessionEnd::BackendUnavailable;
        }
    }
}
