use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::bridge::shutdown_error;
use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::IoControl;
use crate::protocol::HttpError;

struct BufferInner {
    data: VecDeque<u8>,
    /// End of the entity: no more bytes will ever be added
    finished: bool,
    shut_down: bool,
}

impl BufferInner {
    fn new(capacity: usize) -> Self {
        Self { data: VecDeque::with_capacity(capacity), finished: false, shut_down: false }
    }
}

/// Fixed-capacity byte ring carrying one request body from the I/O thread to
/// one worker.
///
/// The I/O side fills the ring from a decoder and suspends input when the
/// ring is full; the worker drains it with blocking reads and re-requests
/// input as space frees up. Capacity is a hard bound: the ring never holds
/// more than `capacity` unread bytes.
pub struct SharedInputBuffer {
    inner: Mutex<BufferInner>,
    signal: Condvar,
    io: Arc<dyn IoControl>,
    capacity: usize,
}

impl SharedInputBuffer {
    pub fn new(capacity: usize, io: Arc<dyn IoControl>) -> Self {
        Self { inner: Mutex::new(BufferInner::new(capacity)), signal: Condvar::new(), io, capacity }
    }

    pub fn with_config(config: &crate::bridge::BridgeConfig, io: Arc<dyn IoControl>) -> Self {
        Self::new(config.buffer_capacity, io)
    }

    /// I/O-thread side: moves whatever fits from the decoder into the ring.
    /// Never blocks; suspends input instead when the ring is full.
    pub fn consume_content(&self, decoder: &mut dyn ContentDecoder) -> Result<usize, HttpError> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Ok(0);
        }
        let mut total = 0;
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let free = self.capacity - inner.data.len();
            if free == 0 {
                self.io.suspend_input();
                break;
            }
            let want = free.min(chunk.len());
            let n = decoder.read(&mut chunk[..want])?;
            if n == 0 {
                break;
            }
            inner.data.extend(chunk[..n].iter().copied());
            total += n;
        }
        if decoder.is_completed() {
            inner.finished = true;
        }
        if total > 0 || inner.finished {
            self.signal.notify_all();
        }
        Ok(total)
    }

    /// Worker side: blocks until bytes are available, the body ends (`Ok(0)`)
    /// or the buffer is shut down.
    pub fn read(&self, dst: &mut [u8]) -> io::Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let mut inner = self.inner.lock();
        loop {
            if inner.shut_down {
                return Err(shutdown_error());
            }
            if !inner.data.is_empty() {
                break;
            }
            if inner.finished {
                return Ok(0);
            }
            self.signal.wait(&mut inner);
        }
        let n = dst.len().min(inner.data.len());
        for (slot, byte) in dst[..n].iter_mut().zip(inner.data.drain(..n)) {
            *slot = byte;
        }
        // space freed: let the transport deliver more
        self.io.request_input();
        Ok(n)
    }

    /// Unread bytes currently held. Never exceeds the construction capacity.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Permanently wakes all waiters. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.shut_down {
            inner.shut_down = true;
            self.signal.notify_all();
        }
    }
}

impl std::fmt::Debug for SharedInputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInputBuffer").field("capacity", &self.capacity).field("len", &self.len()).finish_non_exhaustive()
    }
}

/// Fixed-capacity byte ring carrying one response body from a worker to the
/// I/O thread.
///
/// The worker's `write` blocks whenever the ring is full; the I/O side drains
/// the ring into an encoder and wakes the worker as space frees up.
pub struct SharedOutputBuffer {
    inner: Mutex<BufferInner>,
    signal: Condvar,
    io: Arc<dyn IoControl>,
    capacity: usize,
}

impl SharedOutputBuffer {
    pub fn new(capacity: usize, io: Arc<dyn IoControl>) -> Self {
        Self { inner: Mutex::new(BufferInner::new(capacity)), signal: Condvar::new(), io, capacity }
    }

    pub fn with_config(config: &crate::bridge::BridgeConfig, io: Arc<dyn IoControl>) -> Self {
        Self::new(config.buffer_capacity, io)
    }

    /// Worker side: writes all of `src`, blocking whenever the ring is full.
    pub fn write(&self, src: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.lock();
        let mut written = 0;
        while written < src.len() {
            if inner.shut_down {
                return Err(shutdown_error());
            }
            if inner.finished {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "write after completion"));
            }
            let free = self.capacity - inner.data.len();
            if free == 0 {
                self.io.request_output();
                self.signal.wait(&mut inner);
                continue;
            }
            let n = free.min(src.len() - written);
            inner.data.extend(src[written..written + n].iter().copied());
            written += n;
        }
        self.io.request_output();
        Ok(())
    }

    /// Worker side: marks the body as finished. Idempotent.
    pub fn write_completed(&self) {
        let mut inner = self.inner.lock();
        if !inner.finished {
            inner.finished = true;
            self.io.request_output();
        }
    }

    /// I/O-thread side: drains the ring into the encoder, completing it once
    /// the worker has finished and the ring runs dry. Never blocks; suspends
    /// output instead when there is nothing to write yet.
    pub fn produce_content(&self, encoder: &mut dyn ContentEncoder) -> Result<(), HttpError> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(HttpError::io(shutdown_error()));
        }
        while !inner.data.is_empty() {
            let (front, _) = inner.data.as_slices();
            let accepted = encoder.write(front)?;
            if accepted == 0 {
                // transport congested, try again on the next output event
                return Ok(());
            }
            inner.data.drain(..accepted);
            // space freed for the worker
            self.signal.notify_all();
        }
        if inner.finished {
            if !encoder.is_completed() {
                encoder.complete()?;
            }
        } else {
            // nothing to write until the worker produces more
            self.io.suspend_output();
        }
        Ok(())
    }

    /// Unread bytes currently held. Never exceeds the construction capacity.
    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Permanently wakes all waiters. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.shut_down {
            inner.shut_down = true;
            self.signal.notify_all();
        }
    }
}

impl std::fmt::Debug for SharedOutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOutputBuffer").field("capacity", &self.capacity).field("len", &self.len()).finish_non_exhaustive()
    }
}

struct GateInner {
    running: bool,
    shut_down: bool,
}

/// Serializes workers over one connection's buffer pair: exactly one worker
/// holds the active role at a time, the next blocks until release.
pub struct WorkerGate {
    inner: Mutex<GateInner>,
    released: Condvar,
}

impl WorkerGate {
    pub fn new() -> Self {
        Self { inner: Mutex::new(GateInner { running: false, shut_down: false }), released: Condvar::new() }
    }

    /// Blocks until the active role is free. Returns false if the gate was
    /// shut down instead.
    pub fn acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        loop {
            if inner.shut_down {
                return false;
            }
            if !inner.running {
                inner.running = true;
                return true;
            }
            self.released.wait(&mut inner);
        }
    }

    pub fn release(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
        self.released.notify_one();
    }

    /// Permanently denies the gate to current and future waiters. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if !inner.shut_down {
            inner.shut_down = true;
            self.released.notify_all();
        }
    }
}

impl Default for WorkerGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkerGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGate").field("running", &self.inner.lock().running).finish_non_exhaustive()
    }
}
