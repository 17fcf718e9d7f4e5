use std::time::Duration;

use http::{Method, Uri};

use crate::concurrent::BasicFuture;
use crate::entity::{RequestProducer, ResponseConsumer};
use crate::protocol::MessageState;

/// Client engine policy knobs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for a `100 Continue` before sending the body anyway.
    ///
    /// A server that does not implement the expectation mechanism never
    /// answers with an interim response, so the client must not wait forever:
    /// once this provisional timeout elapses, the transfer proceeds as if the
    /// server had agreed.
    pub wait_for_continue: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { wait_for_continue: Duration::from_millis(3000) }
    }
}

/// Mutable record of one in-flight client exchange.
///
/// Owned by the engine, which is owned by the connection; every field is
/// mutated exclusively from I/O-thread callbacks.
pub(crate) struct Exchange<T> {
    /// Method and URI of the generated request, kept for logging
    pub(crate) request_line: Option<(Method, Uri)>,
    pub(crate) producer: Box<dyn RequestProducer>,
    pub(crate) consumer: Box<dyn ResponseConsumer<Output = T>>,
    pub(crate) request_state: MessageState,
    pub(crate) response_state: MessageState,
    /// Cleared when an early response is detected; an invalid exchange still
    /// completes, but its connection is never reused
    pub(crate) valid: bool,
    /// Keep-alive verdict of the reuse strategy, folded with `valid`
    pub(crate) keep_alive: bool,
    /// The connection's own read timeout, remembered while the provisional
    /// Expect-Continue timeout is installed
    pub(crate) saved_timeout: Option<Option<Duration>>,
    pub(crate) future: BasicFuture<T>,
}

impl<T> Exchange<T> {
    pub(crate) fn new(producer: Box<dyn RequestProducer>, consumer: Box<dyn ResponseConsumer<Output = T>>) -> Self {
        Self {
            request_line: None,
            producer,
            consumer,
            request_state: MessageState::Ready,
            response_state: MessageState::Ready,
            valid: true,
            keep_alive: true,
            saved_timeout: None,
            future: BasicFuture::new(),
        }
    }

    /// True once both directions have fully completed.
    pub(crate) fn is_finished(&self) -> bool {
        self.request_state.is_completed() && self.response_state.is_completed()
    }
}
