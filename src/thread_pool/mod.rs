//! The fixed size pool of worker threads that services data channel connections.
//!
//! Workers do not receive closures. Each one repeatedly claims the next item from a shared
//! [`WorkQueue`](crate::sync::WorkQueue) and hands it to the pool's handler, until the queue
//! is closed.

mod shared_queue;

pub use self::shared_queue::WorkerPool;
