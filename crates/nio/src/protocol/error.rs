use http::{Method, StatusCode, Version};
use std::io;
use thiserror::Error;

/// Top-level error type of the exchange engines.
///
/// The variants follow the failure taxonomy of the engine:
///
/// - [`HttpError::Protocol`]: malformed or out-of-sequence messages; mapped
///   to an error response while no response head has been committed,
///   otherwise fatal to the connection
/// - [`HttpError::Io`]: transport failures; always fatal, the connection is
///   shut down rather than closed since the byte stream is in an unknown state
/// - [`HttpError::Application`]: a handler failed; becomes a `500` response
///   if the response head is still uncommitted
/// - [`HttpError::Timeout`]: distinguished from failure since it may trigger
///   the implicit-continue transition or a graceful close
/// - [`HttpError::Cancelled`]: the exchange was cancelled cooperatively
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("protocol error: {source}")]
    Protocol {
        #[from]
        source: ProtocolError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("application error: {reason}")]
    Application { reason: String },

    #[error("connection timed out")]
    Timeout,

    #[error("exchange cancelled")]
    Cancelled,
}

impl HttpError {
    pub fn application<S: ToString>(reason: S) -> Self {
        Self::Application { reason: reason.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// The status code for the error response, when one may still be sent.
    ///
    /// Transport failures, timeouts and cancellation have no response
    /// representation: the connection is torn down instead.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Protocol { source } => Some(source.status()),
            HttpError::Application { .. } => Some(StatusCode::INTERNAL_SERVER_ERROR),
            HttpError::Io { .. } | HttpError::Timeout | HttpError::Cancelled => None,
        }
    }

    /// Returns true if the transport is in an unknown state and must be
    /// shut down rather than closed gracefully.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(self, HttpError::Io { .. })
    }
}

/// A violation of HTTP message sequencing or content rules.
///
/// Each variant maps to the status code sent when the violation is still
/// locally recoverable (no response bytes committed yet).
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unexpected message: {reason}")]
    UnexpectedMessage { reason: String },

    #[error("out of sequence response: {reason}")]
    OutOfSequence { reason: String },

    #[error("method {method} not supported")]
    MethodNotSupported { method: Method },

    #[error("http version {version:?} not supported")]
    VersionNotSupported { version: Version },

    #[error("expectation failed: {reason}")]
    ExpectationFailed { reason: String },

    #[error("invalid exchange state: {reason}")]
    InvalidState { reason: String },
}

impl ProtocolError {
    pub fn unexpected_message<S: ToString>(reason: S) -> Self {
        Self::UnexpectedMessage { reason: reason.to_string() }
    }

    pub fn out_of_sequence<S: ToString>(reason: S) -> Self {
        Self::OutOfSequence { reason: reason.to_string() }
    }

    pub fn expectation_failed<S: ToString>(reason: S) -> Self {
        Self::ExpectationFailed { reason: reason.to_string() }
    }

    pub fn invalid_state<S: ToString>(reason: S) -> Self {
        Self::InvalidState { reason: reason.to_string() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::UnexpectedMessage { .. } | ProtocolError::OutOfSequence { .. } => StatusCode::BAD_REQUEST,
            ProtocolError::MethodNotSupported { .. } => StatusCode::NOT_IMPLEMENTED,
            ProtocolError::VersionNotSupported { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
            ProtocolError::ExpectationFailed { .. } => StatusCode::EXPECTATION_FAILED,
            ProtocolError::InvalidState { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_status_mapping() {
        assert_eq!(ProtocolError::unexpected_message("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProtocolError::out_of_sequence("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ProtocolError::MethodNotSupported { method: Method::PATCH }.status(),
            StatusCode::NOT_IMPLEMENTED
        );
        assert_eq!(
            ProtocolError::VersionNotSupported { version: Version::HTTP_2 }.status(),
            StatusCode::HTTP_VERSION_NOT_SUPPORTED
        );
        assert_eq!(ProtocolError::expectation_failed("x").status(), StatusCode::EXPECTATION_FAILED);
    }

    #[test]
    fn test_http_error_status() {
        let err: HttpError = ProtocolError::unexpected_message("oops").into();
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

        let err = HttpError::application("handler blew up");
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));

        let err = HttpError::io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert_eq!(err.status(), None);
        assert!(err.is_fatal_to_connection());

        assert_eq!(HttpError::Timeout.status(), None);
        assert!(!HttpError::Timeout.is_fatal_to_connection());
    }
}
