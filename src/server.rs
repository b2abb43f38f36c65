use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, error, info, instrument};

use crate::config::ServerConfig;
use crate::engine::KvsEngine;
use crate::error::Result;
use crate::protocol::ControlCommand;
use crate::session;
use crate::sync::WorkQueue;
use crate::thread_pool::WorkerPool;

/// A TCP server over a key value storage engine, listening on two ports.
///
/// The control channel answers one administrative command per connection (`count` or
/// `shutdown`) directly on the dispatcher thread. Connections on the data channel are
/// accepted into a bounded [`WorkQueue`] and serviced, one whole session at a time, by a
/// fixed [`WorkerPool`].
///
/// # Example
/// ```rust,no_run
/// use kvs::{KvStore, KvsServer, ServerConfig};
/// # fn main() -> kvs::Result<()> {
/// let server = KvsServer::bind(ServerConfig::new(4000, 4001), KvStore::new())?;
/// server.run()?; // returns once a client sends `shutdown` on port 4000
/// # Ok(())
/// # }
/// ```
pub struct KvsServer<E: KvsEngine> {
    engine: E,
    config: ServerConfig,
    control: TcpListener,
    data: TcpListener,
}

impl<E: KvsEngine> KvsServer<E> {
    /// Validates the `config` and binds both listening sockets.
    ///
    /// # Errors
    /// returns [`KvsError`](crate::KvsError) if the configuration is invalid or either
    /// socket could not be bound
    pub fn bind(config: ServerConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let control = listen(config.control_addr(), config.control_backlog())?;
        let data = listen(config.data_addr(), config.backlog)?;
        info!("control channel listening on {}", control.local_addr()?);
        info!("data channel listening on {}", data.local_addr()?);
        Ok(KvsServer {
            engine,
            config,
            control,
            data,
        })
    }

    /// the bound address of the control channel
    pub fn control_addr(&self) -> Result<SocketAddr> {
        Ok(self.control.local_addr()?)
    }

    /// the bound address of the data channel
    pub fn data_addr(&self) -> Result<SocketAddr> {
        Ok(self.data.local_addr()?)
    }

    /// Starts the worker pool and dispatches connections until a `shutdown` command arrives
    /// on the control channel.
    ///
    /// On shutdown both listeners are closed, every worker is woken and told to stop, and
    /// this method waits for all of them. Sessions in progress run to completion first;
    /// connections still queued are closed without being serviced.
    ///
    /// # Errors
    /// returns [`KvsError`](crate::KvsError) if a worker could not be started or joined, or
    /// if readiness polling or accepting a data connection failed
    pub fn run(self) -> Result<()> {
        let workers = self.config.workers;
        let queue: Arc<WorkQueue<TcpStream>> = Arc::new(WorkQueue::new(self.config.queue_size));

        let engine = self.engine.clone();
        let pool = WorkerPool::start(workers, Arc::clone(&queue), move |stream: TcpStream| {
            if let Err(e) = session::serve(&engine, stream) {
                error!("Error on serving client: {}", e);
            }
        })?;
        info!("Server started with {} workers", workers);

        let dispatched = self.dispatch(&queue);
        if let Err(e) = &dispatched {
            error!("dispatcher stopped: {}", e);
        }

        // stop admitting work before waking the workers
        let KvsServer { control, data, .. } = self;
        drop(control);
        drop(data);
        queue.close(pool.size())?;
        pool.join()?;
        info!("all workers stopped");
        dispatched
    }

    /// services whichever listener is ready, until a control client asks for a shutdown
    #[instrument(skip(self, queue))]
    fn dispatch(&self, queue: &WorkQueue<TcpStream>) -> Result<()> {
        let mut fds = [
            pollfd(self.control.as_raw_fd()),
            pollfd(self.data.as_raw_fd()),
        ];
        // when both channels are ready, alternate which one goes first
        let mut control_first = true;

        loop {
            poll_readable(&mut fds)?;
            let control_ready = is_readable(&fds[0])?;
            let data_ready = is_readable(&fds[1])?;

            match pick(control_ready, data_ready, &mut control_first) {
                Some(Channel::Control) => {
                    if self.handle_control()? == ControlCommand::Shutdown {
                        info!("shutdown requested");
                        return Ok(());
                    }
                }
                Some(Channel::Data) => self.admit_data(queue)?,
                None => {}
            }
        }
    }

    fn handle_control(&self) -> Result<ControlCommand> {
        let (stream, peer) = self.control.accept()?;
        debug!("control connection from {}", peer);
        Ok(session::serve_control(&self.engine, stream))
    }

    /// blocks until the queue has room, then accepts one data connection into it
    fn admit_data(&self, queue: &WorkQueue<TcpStream>) -> Result<()> {
        queue.admit(|| {
            let (stream, peer) = self.data.accept()?;
            debug!("data connection from {} queued", peer);
            Ok(stream)
        })
    }
}

/// a listening endpoint of the server
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Channel {
    Control,
    Data,
}

/// Chooses which ready channel to service next.
///
/// When both are ready the choice alternates, starting from the channel `control_first`
/// points at, so neither channel can starve the other.
fn pick(control_ready: bool, data_ready: bool, control_first: &mut bool) -> Option<Channel> {
    if control_ready && (*control_first || !data_ready) {
        *control_first = false;
        Some(Channel::Control)
    } else if data_ready {
        *control_first = true;
        Some(Channel::Data)
    } else {
        None
    }
}

/// binds a TCP listener on `addr` with the given `backlog`
fn listen(addr: SocketAddr, backlog: i32) -> Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    Ok(socket.into())
}

fn pollfd(fd: libc::c_int) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// blocks until at least one of `fds` has an event, retrying when interrupted by a signal
fn poll_readable(fds: &mut [libc::pollfd]) -> io::Result<()> {
    loop {
        for fd in fds.iter_mut() {
            fd.revents = 0;
        }
        // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd for the whole call
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn is_readable(fd: &libc::pollfd) -> io::Result<bool> {
    if fd.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("listening socket {} reported an error", fd.fd),
        ));
    }
    Ok(fd.revents & libc::POLLIN != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ready_alternates_between_channels() {
        let mut control_first = true;
        let picks: Vec<_> = (0..4)
            .map(|_| pick(true, true, &mut control_first))
            .collect();
        assert_eq!(
            picks,
            vec![
                Some(Channel::Control),
                Some(Channel::Data),
                Some(Channel::Control),
                Some(Channel::Data),
            ]
        );
    }

    #[test]
    fn a_single_ready_channel_is_always_served() {
        let mut control_first = true;
        assert_eq!(pick(false, true, &mut control_first), Some(Channel::Data));
        assert_eq!(pick(false, true, &mut control_first), Some(Channel::Data));
        assert_eq!(pick(true, false, &mut control_first), Some(Channel::Control));
        assert_eq!(pick(true, false, &mut control_first), Some(Channel::Control));
        assert_eq!(pick(false, false, &mut control_first), None);
    }

    #[test]
    fn data_goes_first_after_a_control_request() {
        let mut control_first = true;
        assert_eq!(pick(true, false, &mut control_first), Some(Channel::Control));
        assert_eq!(pick(true, true, &mut control_first), Some(Channel::Data));
        assert_eq!(pick(true, true, &mut control_first), Some(Channel::Control));
    }
}
