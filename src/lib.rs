//! dns-relay - a caching name/address lookup proxy.
//!
//! This library exposes the proxy, its cache and the directory backend for
//! the binary, benchmarks and tests.

pub mod backend;
pub mod cache;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
