#![deny(missing_docs)]
//! A multithreaded, in-memory, key-value server (kvs) that maps [`String`] keys to [`String`]
//! values, served over two TCP channels.
//!
//! This crate provides the [`KvsServer`] itself, a [`KvsClient`], and the `kvs-server` and
//! `kvs-client` executables that can be used to run and talk to it.
//!
//! ## Channels
//! - the **control channel** accepts one command per connection: `count` reports the number
//! of stored keys, `shutdown` stops the server, and anything else is answered with `Error`.
//! - the **data channel** keeps a session open per client. Each session understands
//! `get <key>`, `put <key> <value>`, `delete <key>`, `exists <key>`, `count` and `end`.
//!
//! ## Dispatching
//! A single dispatcher thread waits for either listening socket to become readable
//! (with `poll(2)`). Control requests are answered right there. Data connections are accepted
//! into a bounded [`WorkQueue`](sync::WorkQueue) only once the queue has a free slot, so a
//! busy server pushes back on new clients instead of buffering them without limit.
//!
//! A fixed [`WorkerPool`](thread_pool::WorkerPool) claims connections from the queue in
//! FIFO order and runs each one's session to completion before claiming the next.
//!
//! ## Shutdown
//! `shutdown` closes both listeners, sets the queue's shutdown flag and wakes every worker.
//! Idle workers exit right away; a worker in the middle of a session finishes that session
//! first. [`KvsServer::run`] returns once every worker has exited.
//!
//! ## Storage
//! [`KvStore`] implements the [`KvsEngine`] trait on top of a concurrent hash map, and is
//! shared by all workers. Nothing is persisted.
//!
//! ## Wire format
//! Clients send newline terminated lines. The server answers with fixed size frames of
//! [`LINE`](protocol::LINE) bytes, padded with NULs; see the [`protocol`] module.

pub use client::{control_request, KvsClient};
pub use config::ServerConfig;
pub use engine::{KvStore, KvsEngine, PutOutcome};
pub use error::{KvsError, Result};
pub use server::KvsServer;

mod client;
pub mod config;
mod engine;
mod error;
pub mod protocol;
pub mod queue;
mod server;
pub mod session;
pub mod sync;
pub mod thread_pool;
