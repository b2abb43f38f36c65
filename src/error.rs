use std::io;
use thiserror::Error;

/// type alias for all operations in this crate that could fail with a [`KvsError`]
pub type Result<T> = std::result::Result<T, KvsError>;

/// The Error variants used by the kvs server, client and storage engine.
#[derive(Error, Debug)]
pub enum KvsError {
    /// variant for errors caused by socket or stream IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// variant for errors when a key was not found in the store
    #[error("Key not found")]
    KeyNotFound,

    /// variant for errors when a key is created but already exists in the store
    #[error("Key already exists")]
    KeyExists,

    /// command line arguments or configuration values that could not be parsed or are invalid
    #[error("{0}")]
    Parsing(String),

    /// a lock or condition variable became unusable (i.e. a thread panicked while holding it)
    #[error("synchronization failure: {0}")]
    Sync(String),

    /// generic error carrying a message, usually one received from the server
    #[error("{0}")]
    StringErr(String),
}

impl<T> From<std::sync::PoisonError<T>> for KvsError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        KvsError::Sync(e.to_string())
    }
}
