//! Read-through TTL cache over a [`RouteTable`].
//!
//! Entries may be stale for up to the TTL; route mutations made through the
//! admin surface invalidate the cache explicitly. The entry count is bounded:
//! once full, expired entries are swept and, if nothing expired, new keys are
//! served uncached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::authz::errors::AuthzError;
use crate::authz::store::RouteTable;
use crate::authz::types::Route;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct CachedRoute {
    route: Option<Route>,
    fetched_at: Instant,
}

pub struct CachedRouteTable {
    inner: Arc<dyn RouteTable>,
    ttl: Duration,
    max_entries: usize,
    entries: DashMap<(String, String), CachedRoute>,
}

impl CachedRouteTable {
    pub fn new(inner: Arc<dyn RouteTable>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: DashMap::new(),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Drop one cached (path, method) entry.
    pub fn invalidate(&self, path: &str, method: &str) {
        self.entries.remove(&(path.to_string(), method.to_string()));
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    /// Remove every entry older than the TTL.
    pub fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
    }

    /// Whether a new key may be stored, sweeping expired entries when full.
    fn has_room_for(&self, key: &(String, String)) -> bool {
        if self.entries.len() < self.max_entries || self.entries.contains_key(key) {
            return true;
        }
        self.evict_expired();
        self.entries.len() < self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RouteTable for CachedRouteTable {
    async fn lookup(&self, path: &str, method: &str) -> Result<Option<Route>, AuthzError> {
        let key = (path.to_string(), method.to_string());

        if let Some(entry) = self.entries.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.route.clone());
            }
        }

        // Errors are not cached
        let route = self.inner.lookup(path, method).await?;
        if !self.has_room_for(&key) {
            tracing::debug!(
                %path,
                %method,
                entries = self.entries.len(),
                "Route cache full; not caching"
            );
            return Ok(route);
        }
        self.entries.insert(
            key,
            CachedRoute {
                route: route.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(route)
    }
}
