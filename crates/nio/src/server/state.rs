use std::collections::VecDeque;
use std::sync::Arc;

use http::{Method, Uri};

use crate::entity::{DiscardingRequestConsumer, RequestConsumer, ResponseProducer};
use crate::handler::ExchangeHandler;
use crate::protocol::{HttpError, MessageState};
use crate::server::trigger::{TriggerShared, VerdictShared};

/// The request currently being received on a connection.
pub(crate) enum Incoming<T> {
    /// A live request whose body feeds the handler's consumer
    Active {
        consumer: Box<dyn RequestConsumer<Output = T>>,
        handler: Arc<dyn ExchangeHandler<Output = T>>,
        method: Method,
        uri: Uri,
    },
    /// A request that was already answered (rejected expectation); any body
    /// the client sends regardless is drained and dropped
    Discard(DiscardingRequestConsumer),
}

/// One dispatched-but-uncommitted exchange awaiting its response.
///
/// Entries commit strictly in FIFO order; the request method rides along so
/// the commit step can suppress entities on `HEAD` exchanges.
pub(crate) struct PipelineEntry {
    pub(crate) trigger: Arc<TriggerShared>,
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    /// Set for responses generated by a rejected expectation: their status
    /// must be final (`>= 400`) and the connection is not reused afterwards,
    /// since the announced request body never streamed normally.
    pub(crate) from_expectation: bool,
}

/// Per-connection mutable exchange record of the server engine.
///
/// Owned by exactly one connection and mutated only from I/O-thread
/// callbacks. At most one request and one response are in flight at any
/// time; fully received requests whose responses are still pending wait in
/// the pipeline queue.
pub(crate) struct ExchangeState<T> {
    pub(crate) request_state: MessageState,
    pub(crate) response_state: MessageState,
    pub(crate) incoming: Option<Incoming<T>>,
    pub(crate) outgoing: Option<Box<dyn ResponseProducer>>,
    /// Outstanding expectation verification for the incoming request
    pub(crate) expectation: Option<Arc<VerdictShared>>,
    pub(crate) pipeline: VecDeque<PipelineEntry>,
    /// Whether the connection survives the response currently going out
    pub(crate) keep_alive: bool,
}

impl<T: Send> ExchangeState<T> {
    pub(crate) fn new() -> Self {
        Self {
            request_state: MessageState::Ready,
            response_state: MessageState::Ready,
            incoming: None,
            outgoing: None,
            expectation: None,
            pipeline: VecDeque::new(),
            keep_alive: true,
        }
    }

    /// Notifies the active consumer and producer of a terminal failure and
    /// releases them.
    pub(crate) fn fail_entities(&mut self, cause: &HttpError) {
        if let Some(incoming) = self.incoming.take() {
            match incoming {
                Incoming::Active { mut consumer, .. } => {
                    consumer.failed(cause);
                    consumer.close();
                }
                Incoming::Discard(mut consumer) => {
                    consumer.failed(cause);
                    consumer.close();
                }
            }
        }
        if let Some(mut producer) = self.outgoing.take() {
            producer.failed(cause);
            producer.close();
        }
        self.expectation = None;
    }

    /// Cancels every dispatched-but-uncommitted exchange.
    pub(crate) fn cancel_pipeline(&mut self) {
        for entry in self.pipeline.drain(..) {
            entry.trigger.close();
        }
    }
}
