//! Scripted in-memory stand-ins for the transport collaborators.
//!
//! The engines are pure state machines driven by readiness callbacks, so the
//! tests feed them hand-sequenced events through these mocks instead of a
//! socket: a decoder that yields pre-scripted chunks, an encoder with a
//! configurable per-call write budget, and connections that record every
//! submitted message head.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::{ClientConnection, ConnectionStatus, HttpConnection, IoControl, ServerConnection};
use crate::protocol::{HttpError, PayloadSize, RequestHead, ResponseHead};

/// Installs a test subscriber so `--nocapture` runs show the engine traces.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Records interest-registration calls so tests can assert on backpressure.
#[derive(Debug, Default)]
pub(crate) struct MockIoControl {
    input_suspended: AtomicBool,
    output_suspended: AtomicBool,
    input_requests: AtomicUsize,
    output_requests: AtomicUsize,
}

impl MockIoControl {
    pub(crate) fn input_suspended(&self) -> bool {
        self.input_suspended.load(Ordering::SeqCst)
    }

    pub(crate) fn output_suspended(&self) -> bool {
        self.output_suspended.load(Ordering::SeqCst)
    }

    pub(crate) fn input_requests(&self) -> usize {
        self.input_requests.load(Ordering::SeqCst)
    }

    pub(crate) fn output_requests(&self) -> usize {
        self.output_requests.load(Ordering::SeqCst)
    }
}

impl IoControl for MockIoControl {
    fn request_input(&self) {
        self.input_suspended.store(false, Ordering::SeqCst);
        self.input_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn suspend_input(&self) {
        self.input_suspended.store(true, Ordering::SeqCst);
    }

    fn request_output(&self) {
        self.output_suspended.store(false, Ordering::SeqCst);
        self.output_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn suspend_output(&self) {
        self.output_suspended.store(true, Ordering::SeqCst);
    }
}

/// A decoder that serves pre-scripted chunks.
#[derive(Debug, Default)]
pub(crate) struct MockDecoder {
    chunks: Vec<Bytes>,
    eof: bool,
    drained: bool,
}

impl MockDecoder {
    pub(crate) fn with_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'static [u8]>,
    {
        Self { chunks: chunks.into_iter().map(Bytes::from_static).collect(), eof: true, drained: false }
    }

    /// All scripted chunks followed by end-of-body.
    pub(crate) fn completed_body(body: &'static [u8]) -> Self {
        Self::with_chunks([body])
    }

    /// Scripted chunks with more body still to come later.
    pub(crate) fn partial<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = &'static [u8]>,
    {
        let mut decoder = Self::with_chunks(chunks);
        decoder.eof = false;
        decoder
    }
}

impl ContentDecoder for MockDecoder {
    fn read(&mut self, dst: &mut [u8]) -> std::io::Result<usize> {
        if self.chunks.is_empty() {
            self.drained = true;
            return Ok(0);
        }
        let mut chunk = self.chunks.remove(0);
        let moved = chunk.len().min(dst.len());
        dst[..moved].copy_from_slice(&chunk[..moved]);
        if moved < chunk.len() {
            chunk.advance(moved);
            self.chunks.insert(0, chunk);
        } else if self.chunks.is_empty() {
            self.drained = true;
        }
        Ok(moved)
    }

    fn is_completed(&self) -> bool {
        self.eof && self.drained && self.chunks.is_empty()
    }
}

/// An encoder with a depleting write budget, modelling a congested transport:
/// once the credit is spent, `write` accepts nothing until the test
/// replenishes it (the next output-ready event in disguise).
#[derive(Debug)]
pub(crate) struct MockEncoder {
    written: BytesMut,
    budget: usize,
    completed: bool,
}

impl MockEncoder {
    pub(crate) fn new() -> Self {
        Self::with_budget(usize::MAX)
    }

    pub(crate) fn with_budget(budget: usize) -> Self {
        Self { written: BytesMut::new(), budget, completed: false }
    }

    pub(crate) fn replenish(&mut self, credit: usize) {
        self.budget = self.budget.saturating_add(credit);
    }

    pub(crate) fn written(&self) -> &[u8] {
        &self.written
    }
}

impl ContentEncoder for MockEncoder {
    fn write(&mut self, src: &[u8]) -> std::io::Result<usize> {
        let accepted = src.len().min(self.budget);
        self.written.extend_from_slice(&src[..accepted]);
        self.budget -= accepted;
        Ok(accepted)
    }

    fn complete(&mut self) -> std::io::Result<()> {
        self.completed = true;
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}

/// A decoder adapter over owned bytes, for tests that build bodies at runtime.
#[derive(Debug)]
pub(crate) struct OwnedDecoder {
    body: Bytes,
    eof: bool,
}

impl OwnedDecoder {
    pub(crate) fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into(), eof: true }
    }
}

impl ContentDecoder for OwnedDecoder {
    fn read(&mut self, dst: &mut [u8]) -> std::io::Result<usize> {
        let moved = self.body.len().min(dst.len());
        dst[..moved].copy_from_slice(&self.body[..moved]);
        self.body.advance(moved);
        Ok(moved)
    }

    fn is_completed(&self) -> bool {
        self.eof && self.body.is_empty()
    }
}

struct ConnState {
    io: Arc<MockIoControl>,
    status: ConnectionStatus,
    timeout: Option<Duration>,
    closed: bool,
    shut_down: bool,
}

impl ConnState {
    fn new() -> Self {
        Self {
            io: Arc::new(MockIoControl::default()),
            status: ConnectionStatus::Active,
            timeout: None,
            closed: false,
            shut_down: false,
        }
    }
}

macro_rules! impl_http_connection {
    ($ty:ident) => {
        impl HttpConnection for $ty {
            fn io_control(&self) -> Arc<dyn IoControl> {
                Arc::clone(&self.state.io) as Arc<dyn IoControl>
            }

            fn status(&self) -> ConnectionStatus {
                self.state.status
            }

            fn socket_timeout(&self) -> Option<Duration> {
                self.state.timeout
            }

            fn set_socket_timeout(&mut self, timeout: Option<Duration>) {
                self.state.timeout = timeout;
            }

            fn close(&mut self) {
                self.state.closed = true;
                self.state.status = ConnectionStatus::Closing;
            }

            fn shutdown(&mut self) {
                self.state.shut_down = true;
                self.state.status = ConnectionStatus::Closing;
            }
        }

        impl $ty {
            pub(crate) fn io(&self) -> &Arc<MockIoControl> {
                &self.state.io
            }

            pub(crate) fn is_closed(&self) -> bool {
                self.state.closed
            }

            pub(crate) fn is_shut_down(&self) -> bool {
                self.state.shut_down
            }
        }
    };
}

/// Client-role connection that records submitted request heads.
pub(crate) struct MockClientConnection {
    state: ConnState,
    pub(crate) submitted: Vec<(RequestHead, PayloadSize)>,
    request_submitted: bool,
}

impl MockClientConnection {
    pub(crate) fn new() -> Self {
        Self { state: ConnState::new(), submitted: Vec::new(), request_submitted: false }
    }

    /// Marks the submitted request's response as received, the way the
    /// transport would after parsing a response head.
    pub(crate) fn response_arrived(&mut self) {
        self.request_submitted = false;
    }
}

impl_http_connection!(MockClientConnection);

impl ClientConnection for MockClientConnection {
    fn submit_request(&mut self, head: RequestHead, payload: PayloadSize) -> Result<(), HttpError> {
        self.submitted.push((head, payload));
        self.request_submitted = true;
        Ok(())
    }

    fn is_request_submitted(&self) -> bool {
        self.request_submitted
    }
}

/// Server-role connection that records submitted response heads.
pub(crate) struct MockServerConnection {
    state: ConnState,
    pub(crate) submitted: Vec<(ResponseHead, PayloadSize)>,
    response_submitted: bool,
}

impl MockServerConnection {
    pub(crate) fn new() -> Self {
        Self { state: ConnState::new(), submitted: Vec::new(), response_submitted: false }
    }

    /// Marks the submitted response body as fully flushed, the way the
    /// transport would once its encoder completes.
    pub(crate) fn response_flushed(&mut self) {
        self.response_submitted = false;
    }
}

impl_http_connection!(MockServerConnection);

impl ServerConnection for MockServerConnection {
    fn submit_response(&mut self, head: ResponseHead, payload: PayloadSize) -> Result<(), HttpError> {
        // interim responses do not occupy the response slot
        let informational = head.status().is_informational();
        self.submitted.push((head, payload));
        if !informational {
            self.response_submitted = true;
        }
        Ok(())
    }

    fn is_response_submitted(&self) -> bool {
        self.response_submitted
    }
}
