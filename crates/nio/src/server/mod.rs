//! The server protocol engine.
//!
//! [`ServerEngine`] owns the per-connection exchange state machine: it
//! receives parsed request heads from the transport, streams bodies into the
//! resolved handler's consumer, and commits responses in strict request
//! order. Handlers answer through a one-shot [`ResponseTrigger`], either
//! synchronously from the I/O callback or later from any thread; an optional
//! [`ExpectationVerifier`](crate::handler::ExpectationVerifier) arbitrates
//! `Expect: 100-continue` announcements through the same one-shot discipline
//! via [`ExpectationTrigger`].

mod state;

mod trigger;
pub use trigger::ExpectationTrigger;
pub use trigger::ResponseTrigger;

mod engine;
pub use engine::ServerEngine;
