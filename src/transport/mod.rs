//! Transport layer for the lookup proxy.
//!
//! Messages are not length-prefixed: one read is one message, capped at
//! [`MAX_MESSAGE_SIZE`] bytes.

pub mod tcp;

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

pub use crate::protocol::MAX_MESSAGE_SIZE;

/// How long a listener pauses after a failed accept (e.g. out of file
/// descriptors) before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Why a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client closed its side (zero-length read).
    ClientDisconnected,
    /// Client sent the terminate marker.
    Terminated,
    /// Backend was down; the `-` reply was the last message sent.
    BackendUnavailable,
    /// No request arrived within the idle timeout.
    IdleTimeout,
    /// Socket read or write failed.
    Io(io::ErrorKind),
}

/// Read one message into `buf`, returning its length (0 on end of stream).
///
/// With an `idle` timeout, a read that does not complete in time fails with
/// [`io::ErrorKind::TimedOut`].
pub async fn read_message<S>(
    stream: &mut S,
    buf: &mut [u8],
    idle: Option<Duration>,
) -> io::Result<usize>
where
    S: AsyncRead + Unpin,
{
    match idle {
        Some(limit) => tokio::time::timeout(limit, stream.read(buf))
            .await
            .unwrap_or_else(|_| Err(io::Error::from(io::ErrorKind::TimedOut))),
        None => stream.read(buf).await,
    }
}
