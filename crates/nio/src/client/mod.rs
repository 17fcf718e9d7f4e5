//! Client-side exchange engines.
//!
//! Two engines drive the client role of a connection:
//!
//! - [`ClientEngine`]: one logical exchange at a time, with full
//!   Expect-Continue negotiation and early-response handling; the connection
//!   can be reused for the next exchange when the reuse strategy allows it
//! - [`PipeliningClientEngine`]: an ordered batch of exchanges multiplexed
//!   over one connection; requests go out back to back and responses are
//!   matched to them strictly in send order
//!
//! Both engines implement [`ClientEventHandler`](crate::connection::ClientEventHandler)
//! and are driven entirely by reactor callbacks; they never block. Results
//! travel through [`BasicFuture`](crate::concurrent::BasicFuture) handles,
//! which deliver exactly one of result or failure per exchange no matter how
//! many terminal events race.

mod exchange;
pub use exchange::ClientConfig;

mod engine;
pub use engine::ClientEngine;

mod pipelining;
pub use pipelining::PipeliningClientEngine;
