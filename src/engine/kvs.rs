use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, instrument};

use super::{KvsEngine, PutOutcome};
use crate::error::{KvsError, Result};

/// The primary struct for working with a [`KvStore`].
///
/// Keys and values live in a sharded, concurrent [`DashMap`]. Cloning a `KvStore` is cheap
/// and every clone refers to the same underlying map, which is how the store gets shared
/// between the server's worker threads.
///
/// Concurrent operations on different keys do not contend, and operations on the same key
/// are serialized by the map's per-shard locks. A `put` is a single entry operation, so two
/// concurrent puts on a new key report exactly one `Created`.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    // maps keys to their values
    map: Arc<DashMap<String, String>>,
}

impl KvStore {
    /// creates a new, empty, [`KvStore`]
    pub fn new() -> KvStore {
        KvStore::default()
    }
}

impl KvsEngine for KvStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).map(|v| v.value().clone())
    }

    #[instrument(skip(self, value))]
    fn create(&self, key: String, value: String) -> Result<()> {
        match self.map.entry(key) {
            Entry::Occupied(_) => Err(KvsError::KeyExists),
            Entry::Vacant(e) => {
                e.insert(value);
                Ok(())
            }
        }
    }

    #[instrument(skip(self, value))]
    fn update(&self, key: &str, value: String) -> Result<()> {
        match self.map.get_mut(key) {
            Some(mut existing) => {
                *existing = value;
                Ok(())
            }
            None => Err(KvsError::KeyNotFound),
        }
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<()> {
        self.map
            .remove(key)
            .map(|_| ())
            .ok_or(KvsError::KeyNotFound)
    }

    fn exists(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    fn count(&self) -> usize {
        self.map.len()
    }

    /// upserts `key` within a single map entry, so that create-vs-update is decided
    /// atomically with respect to other threads
    fn put(&self, key: String, value: String) -> Result<PutOutcome> {
        let outcome = match self.map.entry(key) {
            Entry::Occupied(mut e) => {
                e.insert(value);
                PutOutcome::Updated
            }
            Entry::Vacant(e) => {
                e.insert(value);
                PutOutcome::Created
            }
        };
        debug!(?outcome, "put");
        Ok(outcome)
    }
}
