//! Streaming entity contracts.
//!
//! These four capability traits decouple "I have decided what bytes to send
//! or accept" from "the socket is ready now". The engines call into them from
//! I/O-thread callbacks whenever the transport can move bytes; the
//! application decides what those bytes are.
//!
//! Each capability owns at most one in-flight transfer and is exclusively
//! owned by the exchange that created it. `failed` and `close` are idempotent
//! terminal transitions: exactly one is externally observable no matter how
//! many terminal events race, and neither may panic on re-invocation.
//!
//! Failure semantics: I/O-level errors raised while moving bytes are turned
//! into connection shutdown by the engines; application-level failures travel
//! through the exchange's result future instead.

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::IoControl;
use crate::protocol::{HttpError, PayloadSize, RequestHead, ResponseHead};

mod basic;
pub use basic::BasicRequestConsumer;
pub use basic::BasicRequestProducer;
pub use basic::BasicResponseConsumer;
pub use basic::BasicResponseProducer;
pub use basic::DiscardingRequestConsumer;

/// Client-side source of one outgoing request.
pub trait RequestProducer: Send {
    /// Yields the request head and its framing declaration. Called exactly
    /// once per exchange, before anything else.
    fn generate(&mut self) -> Result<(RequestHead, PayloadSize), HttpError>;

    /// Writes as much body as the encoder will currently accept.
    ///
    /// When no further data is available yet but the producer is not
    /// finished, it may call `io.suspend_output()`; normally the engine
    /// simply stops receiving output-ready events once the encoder is
    /// completed.
    fn produce_content(&mut self, encoder: &mut dyn ContentEncoder, io: &dyn IoControl) -> Result<(), HttpError>;

    /// Returns true once the entire body has been handed to an encoder.
    fn is_completed(&self) -> bool;

    /// Rewinds the body so the request could be sent again, discarding any
    /// partially produced state. Used when an early response forces the
    /// engine to abandon an unsent body.
    fn reset(&mut self) -> Result<(), HttpError>;

    /// Terminal failure notification. Idempotent.
    fn failed(&mut self, cause: &HttpError);

    /// Terminal release of resources. Idempotent.
    fn close(&mut self);
}

/// Client-side sink for one incoming response.
pub trait ResponseConsumer: Send {
    /// The application-level result this consumer distills the response into.
    type Output: Send;

    /// Receives the response head. Called once, before any body bytes.
    fn response_received(&mut self, response: ResponseHead) -> Result<(), HttpError>;

    /// Drains whatever body bytes the decoder currently holds.
    ///
    /// A consumer that cannot accept more may call `io.suspend_input()` and
    /// request input again later (backpressure).
    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, io: &dyn IoControl) -> Result<(), HttpError>;

    /// Produces the final result. Called exactly once, after the decoder has
    /// reported completion.
    fn completed(&mut self) -> Result<Self::Output, HttpError>;

    /// Returns true once a terminal transition (completion or failure) has
    /// been observed.
    fn is_done(&self) -> bool;

    /// Terminal failure notification. Idempotent.
    fn failed(&mut self, cause: &HttpError);

    /// Terminal release of resources. Idempotent.
    fn close(&mut self);
}

/// Server-side sink for one incoming request.
pub trait RequestConsumer: Send {
    /// The application-level result handed to the exchange handler.
    type Output: Send;

    /// Receives the request head. Called once, before any body bytes.
    fn request_received(&mut self, request: RequestHead) -> Result<(), HttpError>;

    /// Drains whatever body bytes the decoder currently holds. May suspend
    /// input for backpressure.
    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, io: &dyn IoControl) -> Result<(), HttpError>;

    /// Produces the final result. Called exactly once, after the decoder has
    /// reported completion.
    fn completed(&mut self) -> Result<Self::Output, HttpError>;

    fn is_done(&self) -> bool;

    /// Terminal failure notification. Idempotent.
    fn failed(&mut self, cause: &HttpError);

    /// Terminal release of resources. Idempotent.
    fn close(&mut self);
}

/// Server-side source of one outgoing response.
pub trait ResponseProducer: Send {
    /// Yields the response head and its framing declaration. Called exactly
    /// once per exchange.
    fn generate(&mut self) -> Result<(ResponseHead, PayloadSize), HttpError>;

    /// Writes as much body as the encoder will currently accept. May suspend
    /// output when it has nothing to write yet.
    fn produce_content(&mut self, encoder: &mut dyn ContentEncoder, io: &dyn IoControl) -> Result<(), HttpError>;

    /// Terminal failure notification. Idempotent.
    fn failed(&mut self, cause: &HttpError);

    /// Terminal release of resources. Idempotent.
    fn close(&mut self);
}
