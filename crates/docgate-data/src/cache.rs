//! Metadata loading cache.

use crate::request::parse_resource;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docgate_core::{BoxFuture, DataAccess, GateResult, MetadataCache, ResourceRef};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Loads attempted before giving up on caching a value.
const MAX_LOAD_ATTEMPTS: usize = 3;

/// A [`MetadataCache`] loading database and collection properties from a
/// [`DataAccess`] on a miss.
///
/// Only existing resources are cached, so lookups of absent resources never
/// grow the map. Invalidating a database drops its collections too.
///
/// Every invalidation bumps an epoch. A loaded value is inserted only when
/// the epoch is unchanged since its load began, under the map's entry lock;
/// otherwise it is discarded and loaded again. An invalidation can therefore
/// never be undone by a load that was already in flight.
pub struct LoadingCache {
    data: Arc<dyn DataAccess>,
    entries: DashMap<String, Value>,
    epoch: AtomicU64,
}

impl std::fmt::Debug for LoadingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingCache")
            .field("entries", &self.entries.len())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LoadingCache {
    /// Creates an empty cache over `data`.
    pub fn new(data: Arc<dyn DataAccess>) -> Self {
        Self {
            data,
            entries: DashMap::new(),
            epoch: AtomicU64::new(0),
        }
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn load(&self, key: &str) -> GateResult<Option<Value>> {
        let resource = parse_resource(key)?;
        if resource == ResourceRef::Root {
            return Ok(None);
        }
        Ok(self.data.read(&resource).await?.map(|stored| stored.content))
    }

    /// Inserts `value` unless an invalidation happened since `started`.
    fn insert_if_current(&self, key: &str, value: &Value, started: u64) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(_) => true,
            Entry::Vacant(vacant) => {
                if self.epoch.load(Ordering::SeqCst) != started {
                    return false;
                }
                vacant.insert(value.clone());
                true
            }
        }
    }
}

impl MetadataCache for LoadingCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, GateResult<Option<Value>>> {
        Box::pin(async move {
            if let Some(cached) = self.entries.get(key) {
                return Ok(Some(cached.value().clone()));
            }

            let mut attempt = 1;
            loop {
                tracing::debug!(key, attempt, "metadata cache miss");
                let started = self.epoch.load(Ordering::SeqCst);
                let Some(loaded) = self.load(key).await? else {
                    return Ok(None);
                };
                if self.insert_if_current(key, &loaded, started) {
                    return Ok(Some(loaded));
                }
                if attempt == MAX_LOAD_ATTEMPTS {
                    tracing::debug!(key, "metadata keeps changing, value served uncached");
                    return Ok(Some(loaded));
                }
                attempt += 1;
            }
        })
    }

    fn invalidate(&self, key: &str) {
        // bump before removing so in-flight loads cannot re-insert
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let prefix = format!("{key}/");
        self.entries
            .retain(|cached, _| cached != key && !cached.starts_with(&prefix));
        tracing::debug!(key, "metadata cache invalidated");
    }
}
