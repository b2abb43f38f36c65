//! Configuration of the server's ports, pool size and queue size.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{KvsError, Result};

/// number of worker threads servicing data connections
pub const DEFAULT_WORKERS: usize = 4;
/// number of accepted data connections that may wait for a worker
pub const DEFAULT_QUEUE_SIZE: usize = 10;
/// listen backlog of the data channel
pub const DEFAULT_BACKLOG: i32 = 10;
// the control channel serves one client at a time on the dispatcher thread
const CONTROL_BACKLOG: i32 = 1;

/// Settings for a [`KvsServer`](crate::KvsServer).
///
/// # Example
/// ```rust
/// use kvs::ServerConfig;
/// let config = ServerConfig::new(4000, 4001).with_workers(8).with_queue_size(32);
/// assert_eq!(config.data_addr().port(), 4001);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// the address both channels listen on
    pub host: IpAddr,
    /// port of the control channel
    pub control_port: u16,
    /// port of the data channel
    pub data_port: u16,
    /// number of worker threads
    pub workers: usize,
    /// capacity of the queue between the dispatcher and the workers
    pub queue_size: usize,
    /// listen backlog of the data channel
    pub backlog: i32,
}

impl ServerConfig {
    /// a configuration listening on all interfaces with the default pool and queue sizes
    pub fn new(control_port: u16, data_port: u16) -> Self {
        ServerConfig {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            control_port,
            data_port,
            workers: DEFAULT_WORKERS,
            queue_size: DEFAULT_QUEUE_SIZE,
            backlog: DEFAULT_BACKLOG,
        }
    }

    /// sets the address to listen on
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    /// sets the number of worker threads
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// sets the queue capacity
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    /// checks that the pool and queue sizes are usable
    ///
    /// # Errors
    /// returns [`KvsError::Parsing`] for a zero worker count or queue size, or if both
    /// channels are configured on the same non-zero port
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(KvsError::Parsing("the worker count must be at least 1".to_string()));
        }
        if self.queue_size == 0 {
            return Err(KvsError::Parsing("the queue size must be at least 1".to_string()));
        }
        if self.control_port != 0 && self.control_port == self.data_port {
            return Err(KvsError::Parsing(format!(
                "the control and data ports must differ, both are {}",
                self.control_port
            )));
        }
        Ok(())
    }

    /// socket address of the control channel
    pub fn control_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.control_port)
    }

    /// socket address of the data channel
    pub fn data_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.data_port)
    }

    pub(crate) fn control_backlog(&self) -> i32 {
        CONTROL_BACKLOG
    }
}
