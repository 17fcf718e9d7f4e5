//! Wire codec capabilities supplied by the transport layer.
//!
//! The engines treat message framing as a solved problem: whenever a message
//! head has been exchanged, the transport hands the engine an opaque decoder
//! or encoder that already knows whether the body is content-length delimited,
//! chunked, or close-delimited. The engines only move bytes through these
//! capabilities and watch for completion.
//!
//! Implementations live with the I/O reactor; this crate only defines the
//! contract and ships scripted in-memory implementations for its own tests.

use std::io;

/// Incremental access to the body of the message currently being received.
///
/// A decoder is valid for exactly one message body. `read` moves at most
/// `dst.len()` buffered bytes, so a bounded consumer stays bounded; a return
/// of `Ok(0)` means no bytes are currently available, which is only the end
/// of the body once [`is_completed`](ContentDecoder::is_completed) reports
/// true.
pub trait ContentDecoder {
    /// Reads available body bytes into `dst`, returning how many were moved.
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize>;

    /// Returns true once the entire body has been decoded.
    fn is_completed(&self) -> bool;
}

/// Incremental access to the body of the message currently being sent.
///
/// An encoder is valid for exactly one message body. `write` accepts as many
/// bytes as the transport can currently take; a short write is the
/// transport's backpressure signal, not an error.
pub trait ContentEncoder {
    /// Writes body bytes from `src`, returning how many were accepted.
    fn write(&mut self, src: &[u8]) -> io::Result<usize>;

    /// Marks the body as finished (writes the terminal chunk where framing
    /// requires one).
    fn complete(&mut self) -> io::Result<()>;

    /// Returns true once `complete` has taken effect.
    fn is_completed(&self) -> bool;
}
