use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use http::{Method, Uri};
use tracing::{debug, error, trace};

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::concurrent::BasicFuture;
use crate::ensure;
use crate::connection::{ClientConnection, ClientEventHandler, IoControl};
use crate::entity::{RequestProducer, ResponseConsumer};
use crate::protocol::{
    ConnectionReuseStrategy, DefaultReuseStrategy, HttpError, HttpProcessor, MessageState, PassthroughProcessor,
    PayloadSize, ProtocolError, ResponseHead,
};

/// The ordered bookkeeping of one pipelined batch.
///
/// Producers and consumers are queued in submission order; each request head
/// that goes out is pushed onto the sent queue and popped again when its
/// response arrives. At every instant the sent queue holds exactly the
/// requests that are out but unanswered; a pop that finds the queues out of
/// step is a protocol violation, not a recoverable condition.
struct PipelineQueue<T> {
    producers: VecDeque<Box<dyn RequestProducer>>,
    consumers: VecDeque<Box<dyn ResponseConsumer<Output = T>>>,
    sent: VecDeque<(Method, Uri)>,
    results: Vec<T>,
    total: usize,
}

impl<T> PipelineQueue<T> {
    fn new(exchanges: Vec<(Box<dyn RequestProducer>, Box<dyn ResponseConsumer<Output = T>>)>) -> Self {
        let total = exchanges.len();
        let mut producers = VecDeque::with_capacity(total);
        let mut consumers = VecDeque::with_capacity(total);
        for (producer, consumer) in exchanges {
            producers.push_back(producer);
            consumers.push_back(consumer);
        }
        Self { producers, consumers, sent: VecDeque::with_capacity(total), results: Vec::with_capacity(total), total }
    }

    fn is_complete(&self) -> bool {
        self.results.len() == self.total
    }
}

/// Multiplexes an ordered queue of exchanges over one connection.
///
/// Requests are submitted back to back without waiting for their responses;
/// responses are matched to sent requests strictly in send order. The batch
/// future completes once every consumer has produced a result. Any single
/// failure fails the whole batch, after which the connection is shut down
/// rather than closed: the byte stream position is indeterminate and must not
/// be resumed.
///
/// Expect-Continue negotiation is not performed here; a pipelined client
/// cannot pause mid-stream to wait for an interim response.
pub struct PipeliningClientEngine<T> {
    queue: Option<PipelineQueue<T>>,
    active_producer: Option<Box<dyn RequestProducer>>,
    active_consumer: Option<Box<dyn ResponseConsumer<Output = T>>>,
    request_state: MessageState,
    response_state: MessageState,
    keep_alive: bool,
    future: Option<BasicFuture<Vec<T>>>,
    processor: Arc<dyn HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
}

impl<T: Send + 'static> PipeliningClientEngine<T> {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(PassthroughProcessor), Arc::new(DefaultReuseStrategy))
    }

    pub fn with_parts(processor: Arc<dyn HttpProcessor>, reuse: Arc<dyn ConnectionReuseStrategy>) -> Self {
        Self {
            queue: None,
            active_producer: None,
            active_consumer: None,
            request_state: MessageState::Ready,
            response_state: MessageState::Ready,
            keep_alive: true,
            future: None,
            processor,
            reuse,
        }
    }

    /// Queues a batch of exchanges and wakes the connection for output.
    pub fn execute_pipelined(
        &mut self,
        exchanges: Vec<(Box<dyn RequestProducer>, Box<dyn ResponseConsumer<Output = T>>)>,
        io: &dyn IoControl,
    ) -> Result<BasicFuture<Vec<T>>, HttpError> {
        if self.queue.is_some() {
            return Err(ProtocolError::invalid_state("a pipelined batch is already in progress").into());
        }
        if exchanges.is_empty() {
            return Err(ProtocolError::invalid_state("empty pipeline batch").into());
        }
        let future = BasicFuture::new();
        self.queue = Some(PipelineQueue::new(exchanges));
        self.future = Some(future.clone());
        self.keep_alive = true;
        io.request_output();
        Ok(future)
    }

    pub fn is_active(&self) -> bool {
        self.queue.is_some()
    }

    fn generate_next<C: ClientConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        debug_assert!(self.active_producer.is_none(), "request generation while a producer is active");
        let Some(queue) = self.queue.as_mut() else {
            conn.io_control().suspend_output();
            return Ok(());
        };
        let Some(mut producer) = queue.producers.pop_front() else {
            // everything submitted, the rest is response traffic
            return Ok(());
        };

        let (mut head, payload) = producer.generate()?;
        self.processor.process_request(&mut head)?;
        queue.sent.push_back((head.method().clone(), head.uri().clone()));
        debug!(method = %head.method(), uri = %head.uri(), pending = queue.producers.len(), "pipelining request");
        conn.submit_request(head, payload)?;

        if payload.is_empty() {
            producer.close();
            self.request_state = MessageState::Ready;
        } else {
            self.active_producer = Some(producer);
            self.request_state = MessageState::BodyStream;
        }
        Ok(())
    }

    fn on_request_ready<C: ClientConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        if !self.request_state.is_ready() {
            // the current body is still streaming; the next head goes out
            // once it completes
            return Ok(());
        }
        self.generate_next(conn)
    }

    fn on_output_ready<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        encoder: &mut dyn ContentEncoder,
    ) -> Result<(), HttpError> {
        let io = conn.io_control();
        let Some(producer) = self.active_producer.as_mut() else {
            io.suspend_output();
            return Ok(());
        };
        producer.produce_content(encoder, io.as_ref())?;
        if encoder.is_completed() {
            producer.close();
            self.active_producer = None;
            self.request_state = MessageState::Ready;
        }
        Ok(())
    }

    fn on_response_received<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        mut response: ResponseHead,
        payload: PayloadSize,
    ) -> Result<(), HttpError> {
        if response.status().is_informational() {
            // interim responses carry no pipeline slot
            return Ok(());
        }
        ensure!(
            self.response_state.is_ready(),
            ProtocolError::out_of_sequence("response received while another response is in progress").into()
        );
        let Some(queue) = self.queue.as_mut() else {
            return Err(ProtocolError::out_of_sequence("response received without a pipelined batch").into());
        };

        let consumer = queue.consumers.pop_front();
        let sent = queue.sent.pop_front();
        let (Some(mut consumer), Some((method, uri))) = (consumer, sent) else {
            // the peer answered a request we never sent, or answered twice;
            // this is a logic-level breakdown of the pipeline bookkeeping
            debug_assert!(false, "pipeline queues out of step");
            return Err(ProtocolError::out_of_sequence("unsolicited response on pipelined connection").into());
        };
        trace!(method = %method, uri = %uri, status = %response.status(), "response matched to pipelined request");

        self.processor.process_response(&mut response)?;
        if !self.reuse.keep_alive(&response) {
            self.keep_alive = false;
        }
        consumer.response_received(response)?;

        if payload.is_empty() {
            self.finish_response(conn, consumer)
        } else {
            self.active_consumer = Some(consumer);
            self.response_state = MessageState::BodyStream;
            Ok(())
        }
    }

    fn on_input_ready<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        decoder: &mut dyn ContentDecoder,
    ) -> Result<(), HttpError> {
        let io = conn.io_control();
        if self.response_state != MessageState::BodyStream {
            return Err(ProtocolError::unexpected_message("body bytes received without a response in progress").into());
        }
        let Some(mut consumer) = self.active_consumer.take() else {
            return Err(ProtocolError::invalid_state("response body streaming without a consumer").into());
        };
        consumer.consume_content(decoder, io.as_ref())?;
        if decoder.is_completed() {
            self.finish_response(conn, consumer)?;
        } else {
            self.active_consumer = Some(consumer);
        }
        Ok(())
    }

    fn finish_response<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        mut consumer: Box<dyn ResponseConsumer<Output = T>>,
    ) -> Result<(), HttpError> {
        let result = consumer.completed()?;
        consumer.close();
        self.response_state = MessageState::Ready;

        let Some(queue) = self.queue.as_mut() else {
            return Err(ProtocolError::invalid_state("response finished without a pipelined batch").into());
        };
        queue.results.push(result);
        debug!(completed = queue.results.len(), total = queue.total, "pipelined response completed");

        if queue.is_complete() {
            if let Some(queue) = self.queue.take() {
                if let Some(future) = self.future.take() {
                    future.complete(queue.results);
                }
            }
            if self.keep_alive {
                trace!("pipelined batch complete, connection reusable");
            } else {
                conn.close();
            }
            return Ok(());
        }

        if !self.keep_alive {
            // responses are still owed but the connection cannot carry them
            return Err(HttpError::io(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection cannot be kept alive with pipelined exchanges outstanding",
            )));
        }
        Ok(())
    }

    /// Fails every remaining exchange of the batch and the batch future.
    fn fail_batch(&mut self, cause: HttpError) {
        if let Some(mut producer) = self.active_producer.take() {
            producer.failed(&cause);
            producer.close();
        }
        if let Some(mut consumer) = self.active_consumer.take() {
            consumer.failed(&cause);
            consumer.close();
        }
        if let Some(mut queue) = self.queue.take() {
            for producer in &mut queue.producers {
                producer.failed(&cause);
                producer.close();
            }
            for consumer in &mut queue.consumers {
                consumer.failed(&cause);
                consumer.close();
            }
        }
        self.request_state = MessageState::Ready;
        self.response_state = MessageState::Ready;
        if let Some(future) = self.future.take() {
            future.fail(cause);
        }
    }

    fn handle_failure<C: ClientConnection>(&mut self, conn: &mut C, error: HttpError) {
        error!(cause = %error, "pipelined batch failed");
        self.fail_batch(error);
        // never attempt a graceful close: the stream position is unknown
        conn.shutdown();
    }
}

impl<T: Send + 'static> Default for PipeliningClientEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static, C: ClientConnection> ClientEventHandler<C> for PipeliningClientEngine<T> {
    fn connected(&mut self, conn: &mut C) {
        trace!("connection ready");
        if self.queue.is_some() {
            conn.io_control().request_output();
        }
    }

    fn request_ready(&mut self, conn: &mut C) {
        if let Err(e) = self.on_request_ready(conn) {
            self.handle_failure(conn, e);
        }
    }

    fn response_received(&mut self, conn: &mut C, response: ResponseHead, payload: PayloadSize) {
        if let Err(e) = self.on_response_received(conn, response, payload) {
            self.handle_failure(conn, e);
        }
    }

    fn input_ready(&mut self, conn: &mut C, decoder: &mut dyn ContentDecoder) {
        if let Err(e) = self.on_input_ready(conn, decoder) {
            self.handle_failure(conn, e);
        }
    }

    fn output_ready(&mut self, conn: &mut C, encoder: &mut dyn ContentEncoder) {
        if let Err(e) = self.on_output_ready(conn, encoder) {
            self.handle_failure(conn, e);
        }
    }

    fn timeout(&mut self, conn: &mut C) {
        self.handle_failure(conn, HttpError::Timeout);
    }

    fn exception(&mut self, conn: &mut C, error: HttpError) {
        self.handle_failure(conn, error);
    }

    fn closed(&mut self, _conn: &mut C) {
        self.fail_batch(HttpError::io(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection closed with pipelined exchanges outstanding",
        )));
    }
}
