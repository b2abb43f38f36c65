use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, instrument};

use crate::error::{KvsError, Result};
use crate::sync::WorkQueue;

/// A pool of worker threads fed by a shared [`WorkQueue`].
///
/// Each worker owns one item at a time, so at most `size` items are being handled at once.
/// A handler that panics is caught and logged; the worker then goes back to the queue, so
/// the pool never shrinks.
///
/// A synchronization failure while claiming work (a poisoned lock) aborts the whole process,
/// since the queue's bookkeeping can no longer be trusted.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers that claim items from `queue` and pass them to `handler`.
    ///
    /// # Errors
    /// returns [`KvsError::Io`] if a worker thread could not be spawned
    pub fn start<T, H>(size: usize, queue: Arc<WorkQueue<T>>, handler: H) -> Result<Self>
    where
        T: Send + 'static,
        H: Fn(T) + Clone + Send + 'static,
    {
        Self::start_with(size, queue, handler, |name, task| {
            thread::Builder::new().name(name).spawn(task)
        })
    }

    /// Starts the pool using `spawn` to create each worker thread.
    ///
    /// If a spawn fails, the workers already running are stopped and joined before the
    /// error is returned.
    fn start_with<T, H, S>(
        size: usize,
        queue: Arc<WorkQueue<T>>,
        handler: H,
        mut spawn: S,
    ) -> Result<Self>
    where
        T: Send + 'static,
        H: Fn(T) + Clone + Send + 'static,
        S: FnMut(String, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>,
    {
        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let worker_queue = Arc::clone(&queue);
            let handler = handler.clone();
            let task: Box<dyn FnOnce() + Send> =
                Box::new(move || run_worker(id, worker_queue, handler));
            match spawn(format!("kvs-worker-{}", id), task) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!("could not spawn worker {}: {}", id, e);
                    queue.close(workers.len())?;
                    WorkerPool { workers }.join()?;
                    return Err(e.into());
                }
            }
        }
        debug!("created worker pool with {} threads", size);
        Ok(WorkerPool { workers })
    }

    /// the number of workers in the pool
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Waits for every worker to exit.
    ///
    /// Workers only exit after their queue has been closed, so close it first.
    pub fn join(self) -> Result<()> {
        for worker in self.workers {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            worker
                .join()
                .map_err(|_| KvsError::StringErr(format!("could not join {}", name)))?;
        }
        Ok(())
    }
}

/// claims items from `queue` and runs `handler` on each one, until the queue is closed
#[instrument(skip(queue, handler))]
fn run_worker<T, H>(id: usize, queue: Arc<WorkQueue<T>>, handler: H)
where
    H: Fn(T),
{
    info!("Worker {} starting", id);
    loop {
        match queue.claim() {
            Ok(Some(item)) => {
                debug!("received a new item");
                if panic::catch_unwind(AssertUnwindSafe(|| handler(item))).is_err() {
                    error!("handler panicked on worker {}", id);
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("worker {} lost its work queue: {}", id, e);
                process::abort();
            }
        }
    }
    info!("Worker {} shutting down", id);
}
