//! This module provides the key/value storage engine used by the server's workers.
//! The only engine implemented is [`KvStore`], an in-memory store built on top of the
//! [`dashmap`] concurrent HashMap, so that every worker thread can hold a cheap clone of
//! the same store and call into it without any server-side locking.
//!
//! [`dashmap`]: https://docs.rs/dashmap/latest/dashmap/
use crate::error::{KvsError, Result};

/// The outcome of a successful [`KvsEngine::put`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// the key did not exist and was created
    Created,
    /// the key already existed and its value was replaced
    Updated,
}

/// A trait for the basic functionality of a key/value storage engine.
///
/// Implementations are shared between all worker threads, so every operation takes `&self`
/// and must be safe to call concurrently.
pub trait KvsEngine: Clone + Send + Sync + 'static {
    /// Gets the value associated with the given `key`
    ///
    /// Returns `None` if the given `key` does not exist.
    fn get(&self, key: &str) -> Option<String>;

    /// Creates a new `key` with the given `value`
    ///
    /// # Errors
    ///
    /// Returns `KvsError::KeyExists` if the given `key` is already in the store.
    fn create(&self, key: String, value: String) -> Result<()>;

    /// Replaces the value of an existing `key`
    ///
    /// # Errors
    ///
    /// Returns `KvsError::KeyNotFound` if the given `key` is not in the store.
    fn update(&self, key: &str, value: String) -> Result<()>;

    /// Removes the given `key` (and associated value) from the store
    ///
    /// # Errors
    ///
    /// Returns `KvsError::KeyNotFound` if the given `key` is not found.
    fn remove(&self, key: &str) -> Result<()>;

    /// returns `true` if the `key` is present in the store
    fn exists(&self, key: &str) -> bool;

    /// the number of keys currently held by the store
    fn count(&self) -> usize;

    /// Sets `key` to `value`, creating the key if it does not exist yet.
    ///
    /// The default implementation tries a create and falls back to an update when the key
    /// is already present. Engines that can upsert atomically should override it.
    fn put(&self, key: String, value: String) -> Result<PutOutcome> {
        match self.create(key.clone(), value.clone()) {
            Ok(()) => Ok(PutOutcome::Created),
            Err(KvsError::KeyExists) => self.update(&key, value).map(|_| PutOutcome::Updated),
            Err(e) => Err(e),
        }
    }
}

mod kvs;

pub use self::kvs::KvStore;
