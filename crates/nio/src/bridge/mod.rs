//! The throttling shared-buffer bridge.
//!
//! Handlers that want blocking-style streaming run on a bounded worker pool
//! and exchange entity bytes with the I/O thread through fixed-capacity
//! shared buffers. The I/O-thread side of a buffer only ever moves bytes
//! between the buffer and an encoder/decoder and never blocks; the worker
//! side blocks on the buffer's monitor when the ring is full or empty, which
//! is the deliberate, bounded-memory backpressure valve of this design.
//!
//! `shutdown()` on any buffer permanently wakes all waiters; a worker blocked
//! mid-transfer observes an error rather than hanging on a dead connection.

use std::io;
use std::thread;

use tracing::error;

mod shared_buffer;
pub use shared_buffer::SharedInputBuffer;
pub use shared_buffer::SharedOutputBuffer;
pub use shared_buffer::WorkerGate;

mod entity;
pub use entity::SharedInputConsumer;
pub use entity::SharedOutputProducer;

/// Sizing knobs of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Capacity of each shared buffer. A worker outpacing the I/O thread
    /// blocks once this many bytes are buffered.
    pub buffer_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { buffer_capacity: 8 * 1024 }
    }
}

/// Runs blocking worker tasks on behalf of the engines.
///
/// The pool itself is an external collaborator; anything that may block
/// (application handlers, shared-buffer transfers) must run through it, never
/// on the I/O thread.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// The simplest possible executor: one spawned thread per task.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        if let Err(e) = thread::Builder::new().name("nio-worker".to_string()).spawn(task) {
            error!(cause = %e, "failed to spawn worker thread");
        }
    }
}

fn shutdown_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "shared buffer shut down")
}
