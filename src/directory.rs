//! File-backed directory service: the authoritative backend.
//!
//! The database is a text table with one `<name> <address>` pair per line.
//! It is re-read for every request, so edits take effect immediately.
//!
//! Matching is a substring search, scanned top to bottom, and the first
//! matching line wins. A forward key must occur at the start of the line and
//! a reverse key anywhere after it. A key that is a prefix of a longer name
//! therefore matches that name.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::DirectoryError;
use crate::protocol::{Direction, MAX_MESSAGE_SIZE, Query, Reply, Request, Status};
use crate::transport::{ACCEPT_ERROR_BACKOFF, read_message};

/// Payload sent when no line matches.
pub const NOT_FOUND_MESSAGE: &str = "Entry Not Found";

/// Payload sent when the database cannot be read.
pub const CORRUPTED_MESSAGE: &str = "Database corrupted";

/// Find the answer to `query` in the text of a database.
pub fn search(table: &str, query: &Query) -> Option<String> {
    let key = query.key.as_str();

    table
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .find_map(|line| {
            let pos = line.find(key)?;
            let mut columns = line.split_whitespace();
            let name = columns.next()?;
            let address = columns.next()?;

            match query.direction {
                Direction::Forward if pos == 0 => Some(address.to_string()),
                Direction::Reverse if pos != 0 => Some(name.to_string()),
                _ => None,
            }
        })
}

/// A database file on disk.
#[derive(Debug, Clone)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up `query`, reading the database afresh.
    pub async fn lookup(&self, query: &Query) -> Result<Option<String>, DirectoryError> {
        let table = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DirectoryError::Read {
                path: self.path.display().to_string(),
                source,
            })?;

        Ok(search(&table, query))
    }

    /// Build the backend reply for `query`.
    pub async fn answer(&self, query: &Query) -> Reply {
        match self.lookup(query).await {
            Ok(Some(value)) => Reply::new(Status::Found, value),
            Ok(None) => Reply::new(Status::NotFound, NOT_FOUND_MESSAGE),
            Err(e) => {
                warn!(error = %e, "directory lookup failed");
                Reply::unavailable(CORRUPTED_MESSAGE)
            }
        }
    }
}

/// TCP server answering one request per connection.
pub struct DirectoryServer {
    listener: TcpListener,
    directory: Arc<Directory>,
}

impl DirectoryServer {
    pub async fn bind(addr: SocketAddr, directory: Directory) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            directory: Arc::new(directory),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes.
    pub async fn serve<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "directory accept error");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                },
            };

            let directory = Arc::clone(&self.directory);
            tokio::spawn(async move {
                if let Err(e) = handle_request(stream, &directory).await {
                    debug!(%peer, error = %e, "directory connection failed");
                }
            });
        }

        info!("directory server stopped");
    }
}

/// Answer a single request, then close the connection.
async fn handle_request(mut stream: TcpStream, directory: &Directory) -> io::Result<()> {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];
    let len = read_message(&mut stream, &mut buf, None).await?;
    if len == 0 {
        return Ok(());
    }

    let query = match Request::parse(&buf[..len]) {
        Ok(Request::Lookup(query)) => query,
        Ok(Request::Terminate) => return Ok(()),
        Err(e) => {
            debug!(error = %e, "ignoring malformed directory request");
            return Ok(());
        }
    };

    let reply = directory.answer(&query).await;
    debug!(
        key = %query.key,
        direction = query.direction.as_str(),
        status = ?reply.status,
        "directory answered"
    );
    stream.write_all(&reply.encode()).await?;
    stream.shutdown().await
}
