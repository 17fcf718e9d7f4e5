//! Core HTTP protocol abstractions shared by the client and server engines.
//!
//! This module provides the fundamental building blocks for exchange handling:
//! message-progress state machines, payload framing declarations, error types,
//! and the cross-cutting collaborator traits consulted on every exchange.
//!
//! # Architecture
//!
//! The protocol module is organized into several key components:
//!
//! - **Message vocabulary** ([`message`]): Exchange progress and framing types
//!   - [`MessageState`]: Per-direction progress of one exchange
//!   - [`PayloadSize`]: Framing declaration attached to each message head
//!   - [`RequestHead`] / [`ResponseHead`]: Bodyless `http` message types
//!
//! - **Error handling** ([`error`]): The error taxonomy of the engine
//!   - [`HttpError`]: Top-level error type
//!   - [`ProtocolError`]: Violations mappable to HTTP status codes
//!
//! - **Collaborators**: Traits the engines consult on every exchange
//!   - [`HttpProcessor`]: Header transformations before dispatch/commit
//!   - [`ConnectionReuseStrategy`]: Keep-alive decision after each response
//!
//! The engines never interpret wire bytes themselves; framing is the business
//! of the [`codec`](crate::codec) capabilities supplied by the transport.

mod message;
pub use message::MessageState;
pub use message::PayloadSize;
pub use message::{RequestHead, ResponseHead};
pub use message::{expects_continue, forbids_request_body, forbids_response_body};

mod error;
pub use error::HttpError;
pub use error::ProtocolError;

mod processor;
pub use processor::HttpProcessor;
pub use processor::PassthroughProcessor;

mod reuse;
pub use reuse::ConnectionReuseStrategy;
pub use reuse::DefaultReuseStrategy;
