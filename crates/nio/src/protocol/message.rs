use http::header::EXPECT;
use http::{Method, Request, Response, StatusCode};

/// An HTTP request head without an attached body.
///
/// Entity bytes travel separately through the producer/consumer capabilities,
/// so the engines only ever pass message heads around.
pub type RequestHead = Request<()>;

/// An HTTP response head without an attached body.
pub type ResponseHead = Response<()>;

/// Progress of one direction (request or response) of an exchange.
///
/// Two independent instances exist per exchange. Within one exchange the
/// state only ever advances; both are reset to [`MessageState::Ready`] when
/// the exchange completes and the connection is kept alive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessageState {
    /// No message of this direction is in flight
    Ready,
    /// The message head has been taken but not yet submitted to the transport
    Init,
    /// Waiting for a `100 Continue` permission before streaming the body
    AckExpected,
    /// The message body is being streamed
    BodyStream,
    /// The message has been fully sent or received
    Completed,
}

impl MessageState {
    /// Returns true if no message of this direction is in flight
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, MessageState::Ready)
    }

    /// Returns true if the message has been fully transferred
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, MessageState::Completed)
    }
}

/// The framing declaration attached to a message head when it is submitted
/// to the transport.
///
/// The transport's encoder/decoder capabilities own the actual framing
/// (content-length counting, chunking, close-delimited reads); the engines
/// only declare which framing a message uses:
/// - Known length: process exactly that many bytes
/// - Chunked: chunked transfer encoding
/// - Empty: no body follows the head
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

/// Checks whether a request head announces a body via `Expect: 100-continue`.
pub fn expects_continue(head: &RequestHead) -> bool {
    match head.headers().get(EXPECT) {
        Some(value) => {
            let slice = value.as_bytes();
            slice.len() >= 4 && slice[0..4].eq_ignore_ascii_case(b"100-")
        }
        None => false,
    }
}

/// Returns true if a request with this method must not carry a response body.
///
/// Only `HEAD` suppresses the response entity; the request itself may still
/// declare one.
pub fn forbids_request_body(method: &Method) -> bool {
    *method == Method::HEAD
}

/// Returns true if a response with this status must not carry a body,
/// regardless of what the handler attached.
///
/// Covers all `1xx` statuses plus `204 No Content` and `304 Not Modified`.
pub fn forbids_response_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
