//! Shared helpers for end-to-end tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dns_relay::backend::BackendClient;
use dns_relay::protocol::MAX_MESSAGE_SIZE;
use dns_relay::proxy::{Proxy, ProxyConfig};
use dns_relay::resolver::Resolver;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Responder = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// Single-shot backend that answers with `respond` and counts connections.
pub struct FakeBackend {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl FakeBackend {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);
        let respond: Responder = Arc::new(respond);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let respond = Arc::clone(&respond);
                tokio::spawn(async move {
                    let mut buf = [0u8; MAX_MESSAGE_SIZE];
                    let Ok(len) = stream.read(&mut buf).await else {
                        return;
                    };
                    let _ = stream.write_all(&respond(&buf[..len])).await;
                });
            }
        });

        Self { addr, connections }
    }

    /// Backend that always sends `reply`.
    pub async fn fixed(reply: &'static [u8]) -> Self {
        Self::start(move |_| reply.to_vec()).await
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A running proxy and the handle to stop it.
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub resolver: Arc<Resolver<BackendClient>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RunningProxy {
    pub async fn start(backend: SocketAddr) -> Self {
        Self::start_with(backend, |_| {}).await
    }

    pub async fn start_with(backend: SocketAddr, tweak: impl FnOnce(&mut ProxyConfig)) -> Self {
        let mut config = ProxyConfig::new("127.0.0.1:0".parse().unwrap(), backend);
        config.stats_interval = None;
        config.backend_timeout = Duration::from_secs(1);
        config.limits.drain_timeout = Duration::from_millis(500);
        tweak(&mut config);

        let proxy = Proxy::bind(config).await.unwrap();
        let addr = proxy.local_addr().unwrap();
        let resolver = Arc::clone(proxy.resolver());
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(proxy.run(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            resolver,
            shutdown: Some(tx),
            handle,
        }
    }

    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Signal shutdown and wait for the proxy to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), &mut self.handle)
            .await
            .expect("proxy did not stop")
            .unwrap();
    }
}

/// Send one request and read one reply.
pub async fn exchange(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).await.unwrap();
    read_reply(stream).await
}

pub async fn read_reply(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let len = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("no reply")
        .unwrap();
    buf[..len].to_vec()
}

/// Whether the stream stays silent (and open) for `wait`.
pub async fn stays_silent(stream: &mut TcpStream, wait: Duration) -> bool {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    tokio::time::timeout(wait, stream.read(&mut buf)).await.is_err()
}

/// Whether the peer has closed the stream.
pub async fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    matches!(
        tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf)).await,
        Ok(Ok(0)) | Ok(Err(_))
    )
}
