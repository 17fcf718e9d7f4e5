//! An event-driven, non-blocking HTTP/1.1 exchange engine
//!
//! This crate provides the protocol-level state machines that turn raw,
//! asynchronously delivered socket readiness events into well-formed HTTP
//! request/response exchanges, for both the client and the server role, over
//! long-lived and possibly pipelined connections. Application code streams
//! message bodies incrementally without ever blocking the I/O thread.
//!
//! # Features
//!
//! - Full exchange sequencing for HTTP/1.1 client and server roles
//! - Strictly ordered request pipelining on one connection
//! - Expect-continue negotiation with a provisional client-side timeout and
//!   optional asynchronous server-side expectation verification
//! - Deferred responses through one-shot triggers fulfillable from any thread
//! - Cooperative backpressure via interest registration, never by blocking
//! - Bounded shared buffers bridging worker threads onto the I/O thread
//! - Keep-alive decisions through a pluggable reuse strategy
//! - Clean error handling with protocol violations mapped to status codes
//!
//! # Scope
//!
//! The engine deliberately owns *sequencing and backpressure only*. The
//! socket event loop, wire parsing and body framing live with the embedding
//! transport and reach the engine as small capability traits:
//!
//! - the reactor delivers readiness callbacks and honors
//!   [`connection::IoControl`] interest registration
//! - message heads arrive already parsed; bodies flow through the opaque
//!   [`codec::ContentDecoder`] and [`codec::ContentEncoder`] capabilities,
//!   which already know the framing in use
//!
//! # Example
//!
//! Registering a handler and driving the server engine from a reactor:
//!
//! ```ignore
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use micro_nio::entity::BasicResponseProducer;
//! use micro_nio::handler::{make_handler, HandlerRegistry};
//! use micro_nio::server::ServerEngine;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("/hello", make_handler(|_req: Request<Bytes>, trigger| {
//!     let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
//!     trigger.submit_response(Box::new(BasicResponseProducer::new(head, "Hello World!\r\n")))?;
//!     Ok(())
//! }))?;
//!
//! // one engine per accepted connection; the reactor owns the loop
//! let registry = Arc::new(registry);
//! let mut engine: ServerEngine<Request<Bytes>> = ServerEngine::new(registry.clone());
//! // reactor calls engine.request_received(..), engine.input_ready(..),
//! // engine.response_ready(..), engine.output_ready(..) as the socket
//! // becomes ready
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`protocol`]: Exchange progress states, framing declarations, errors and
//!   the cross-cutting collaborator traits
//! - [`connection`]: Contracts between the engines and the I/O reactor
//! - [`codec`]: Opaque body decoder/encoder capabilities
//! - [`entity`]: Streaming producer/consumer contracts for message bodies
//! - [`concurrent`]: Exactly-once completion primitives
//! - [`client`]: Single-exchange and pipelining client engines
//! - [`server`]: The trigger-based server protocol engine
//! - [`handler`]: Application handler traits and the URI registry
//! - [`bridge`]: Bounded shared buffers for blocking-style worker handlers
//!
//! # Concurrency model
//!
//! One single-threaded cooperative I/O loop owns all per-connection
//! callbacks; these never block. Anything that may block (application
//! handlers, shared-buffer transfers) runs on a worker pool behind the
//! [`bridge::Executor`] collaborator. The only legitimate blocking calls in
//! the crate live inside worker-side shared-buffer operations. Exchange
//! state is exclusively owned by its connection and mutated from the I/O
//! thread; the deliberate exceptions (one-shot triggers, futures, shared
//! buffers) carry their own synchronization.
//!
//! # Limitations
//!
//! - HTTP/1.1 only (HTTP/2 and later are out of scope)
//! - No TLS, compression, caching or authentication; these belong to the
//!   transport or the application

pub mod bridge;
pub mod client;
pub mod codec;
pub mod concurrent;
pub mod connection;
pub mod entity;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;

#[cfg(test)]
pub(crate) mod testing;
