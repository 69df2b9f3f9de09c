//! Lookup resolution logic.
//!
//! Handles the query processing pipeline:
//! 1. Cache lookup
//! 2. Forward to the backend on a miss
//! 3. Cache confirmed hits and build the client reply
//!
//! Transports handle the actual I/O, resolver handles decisions.

use std::time::Instant;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::cache::{CacheEntry, LookupCache};
use crate::protocol::{Direction, Query, Reply, Status};
use crate::stats::{Stats, StatsSnapshot};

/// Result of resolving one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Answered from the cache without contacting the backend.
    Cached(Reply),
    /// Backend found the record and it was cached.
    Forwarded(Reply),
    /// Backend has no record; nothing was cached.
    NotFound(Reply),
    /// Backend is down. The session ends after this reply.
    Unavailable(Reply),
}

impl Resolution {
    /// Reply to send to the client.
    pub fn reply(&self) -> &Reply {
        match self {
            Resolution::Cached(reply)
            | Resolution::Forwarded(reply)
            | Resolution::NotFound(reply)
            | Resolution::Unavailable(reply) => reply,
        }
    }

    /// Whether the session must close after replying.
    pub fn ends_session(&self) -> bool {
        matches!(self, Resolution::Unavailable(_))
    }
}

/// Resolver holds the state shared by every connection: the cache, the
/// backend and the counters.
pub struct Resolver<B> {
    cache: LookupCache,
    backend: B,
    stats: Stats,
}

impl<B: Backend> Resolver<B> {
    pub fn new(cache: LookupCache, backend: B) -> Self {
        Self {
            cache,
            backend,
            stats: Stats::new(),
        }
    }

    /// Resolve a parsed query, forwarding `raw` unchanged to the backend on a
    /// cache miss.
    pub async fn resolve(&self, query: &Query, raw: &[u8]) -> Resolution {
        let start = Instant::now();

        if let Some(value) = self.cache.lookup(query.direction, &query.key) {
            debug!(key = %query.key, direction = query.direction.as_str(), "cache hit");
            self.stats.record_cached(elapsed_ms(start));
            return Resolution::Cached(Reply::success(value));
        }

        debug!(key = %query.key, direction = query.direction.as_str(), "cache miss, forwarding");
        let reply = self.backend.query(raw).await;

        match reply.status {
            Status::Found if reply.payload.is_empty() => {
                warn!(key = %query.key, "backend found an empty value");
                self.stats.record_unavailable(elapsed_ms(start));
                Resolution::Unavailable(Reply::unavailable("empty answer from backend"))
            }
            Status::Found => {
                let (name, address) = match query.direction {
                    Direction::Forward => (query.key.as_str(), reply.payload.as_str()),
                    Direction::Reverse => (reply.payload.as_str(), query.key.as_str()),
                };
                self.cache.insert(name, address);
                self.stats.record_forwarded(elapsed_ms(start));
                Resolution::Forwarded(Reply::success(reply.payload))
            }
            Status::NotFound => {
                self.stats.record_not_found(elapsed_ms(start));
                Resolution::NotFound(Reply::success(reply.payload))
            }
            Status::Unavailable | Status::Success => {
                self.stats.record_unavailable(elapsed_ms(start));
                Resolution::Unavailable(Reply::unavailable(reply.payload))
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cache(&self) -> &LookupCache {
        &self.cache
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_dump(&self) -> Vec<CacheEntry> {
        self.cache.dump()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
