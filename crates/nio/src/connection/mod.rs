//! Contracts between the exchange engines and the I/O reactor.
//!
//! A single-threaded reactor owns every socket and delivers per-connection
//! readiness callbacks; the engines in [`client`](crate::client) and
//! [`server`](crate::server) implement the event-handler traits defined here
//! and never block inside a callback. Backpressure is expressed through
//! [`IoControl`] interest registration instead of blocking: a consumer that
//! cannot accept more bytes suspends input and requests it again once it has
//! drained, which is the asynchronous analogue of cooperative yielding.
//!
//! The connection traits are intentionally small. Parsing and framing stay
//! inside the transport: a message head arrives at the engine already parsed
//! (via `request_received`/`response_received`), and body bytes flow through
//! the opaque [`codec`](crate::codec) capabilities.

use std::sync::Arc;
use std::time::Duration;

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::protocol::{HttpError, PayloadSize, RequestHead, ResponseHead};

/// Interest registration handle of one connection.
///
/// Shared with worker threads (response triggers, shared buffers), so all
/// methods take `&self` and implementations must be thread-safe. Calls are
/// idempotent; requesting interest that is already registered is a no-op.
pub trait IoControl: Send + Sync {
    /// Ask the reactor to resume delivering input-ready events.
    fn request_input(&self);

    /// Ask the reactor to stop delivering input-ready events until input is
    /// requested again.
    fn suspend_input(&self);

    /// Ask the reactor to resume delivering output-ready events.
    fn request_output(&self);

    /// Ask the reactor to stop delivering output-ready events.
    fn suspend_output(&self);
}

/// Coarse connection lifecycle state as seen by the reactor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The connection is open and exchanging messages
    Active,
    /// A graceful close has been initiated; buffered output may still flush
    Closing,
}

/// A non-blocking HTTP connection as presented to the engines.
///
/// All mutation happens from the I/O thread that owns the connection, except
/// the [`IoControl`] handle which may be exercised from anywhere.
pub trait HttpConnection {
    /// The shareable interest-registration handle of this connection.
    fn io_control(&self) -> Arc<dyn IoControl>;

    fn status(&self) -> ConnectionStatus;

    /// The current read timeout, if any.
    fn socket_timeout(&self) -> Option<Duration>;

    /// Replaces the read timeout. Used by the client engine to install the
    /// provisional Expect-Continue timeout and restore the original one.
    fn set_socket_timeout(&mut self, timeout: Option<Duration>);

    /// Initiates a graceful close: buffered output is flushed first.
    fn close(&mut self);

    /// Tears the connection down immediately, discarding buffered data.
    fn shutdown(&mut self);
}

/// The client role of a connection: requests go out, responses come in.
pub trait ClientConnection: HttpConnection {
    /// Hands a request head to the transport for serialization. The payload
    /// declaration selects the encoder the transport will offer for the body.
    fn submit_request(&mut self, head: RequestHead, payload: PayloadSize) -> Result<(), HttpError>;

    /// Returns true while a submitted request's response is still outstanding.
    fn is_request_submitted(&self) -> bool;
}

/// The server role of a connection: requests come in, responses go out.
pub trait ServerConnection: HttpConnection {
    /// Hands a response head to the transport for serialization.
    ///
    /// A head is irrevocable once submitted; errors after this point can no
    /// longer be represented as an error response on this connection.
    fn submit_response(&mut self, head: ResponseHead, payload: PayloadSize) -> Result<(), HttpError>;

    /// Returns true while a response head has been submitted and its body has
    /// not yet completed.
    fn is_response_submitted(&self) -> bool;
}

/// Per-connection event surface of the client engines.
///
/// The reactor invokes exactly one of these per readiness event. Callbacks
/// must return promptly; implementations convert internal failures into
/// connection teardown rather than propagating them to the reactor.
pub trait ClientEventHandler<C: ClientConnection> {
    /// The connection is established and ready for its first exchange.
    fn connected(&mut self, conn: &mut C);

    /// Output is possible and no request is currently submitted.
    fn request_ready(&mut self, conn: &mut C);

    /// A response head has been received and parsed. The payload declaration
    /// tells the engine whether body bytes will follow.
    fn response_received(&mut self, conn: &mut C, response: ResponseHead, payload: PayloadSize);

    /// Body bytes of the current response are available.
    fn input_ready(&mut self, conn: &mut C, decoder: &mut dyn ContentDecoder);

    /// The transport can accept body bytes of the current request.
    fn output_ready(&mut self, conn: &mut C, encoder: &mut dyn ContentEncoder);

    /// The socket timeout elapsed.
    fn timeout(&mut self, conn: &mut C);

    /// The transport reported a failure it could not recover from.
    fn exception(&mut self, conn: &mut C, error: HttpError);

    /// The connection is gone; release all exchange resources.
    fn closed(&mut self, conn: &mut C);
}

/// Per-connection event surface of the server engine.
pub trait ServerEventHandler<C: ServerConnection> {
    fn connected(&mut self, conn: &mut C);

    /// A request head has been received and parsed. The payload declaration
    /// tells the engine whether body bytes will follow.
    fn request_received(&mut self, conn: &mut C, request: RequestHead, payload: PayloadSize);

    /// Body bytes of the current request are available.
    fn input_ready(&mut self, conn: &mut C, decoder: &mut dyn ContentDecoder);

    /// Output is possible and no response is currently submitted.
    fn response_ready(&mut self, conn: &mut C);

    /// The transport can accept body bytes of the current response.
    fn output_ready(&mut self, conn: &mut C, encoder: &mut dyn ContentEncoder);

    fn timeout(&mut self, conn: &mut C);

    fn exception(&mut self, conn: &mut C, error: HttpError);

    fn closed(&mut self, conn: &mut C);
}
