use std::sync::Arc;

use http::header::CONNECTION;
use http::{Response, StatusCode, Version};
use tracing::{debug, error, trace};

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::{ConnectionStatus, ServerConnection, ServerEventHandler};
use crate::ensure;
use crate::entity::{DiscardingRequestConsumer, RequestConsumer, ResponseProducer};
use crate::handler::{ExpectationVerifier, HandlerRegistry};
use crate::protocol::{
    expects_continue, forbids_request_body, forbids_response_body, ConnectionReuseStrategy, DefaultReuseStrategy,
    HttpError, HttpProcessor, MessageState, PassthroughProcessor, PayloadSize, ProtocolError, RequestHead,
    ResponseHead,
};
use crate::server::state::{ExchangeState, Incoming, PipelineEntry};
use crate::server::trigger::{ResponseTrigger, Submission, TriggerShared, Verdict, VerdictShared};

/// Drives the server role of one connection.
///
/// The engine resolves a handler for every request, streams the request body
/// into the handler's consumer, and commits the handler's response once its
/// [`ResponseTrigger`] fires. Handlers may answer synchronously or defer from
/// a worker thread; either way the response state does not advance until the
/// trigger fires exactly once.
///
/// # Pipelining
///
/// Requests keep being accepted while earlier responses are pending: each
/// fully received request is dispatched immediately and its pending response
/// takes a slot in a FIFO queue. Responses commit strictly in request order,
/// so a slow handler holds back every response behind it but none ahead
/// of it.
///
/// # Expect-Continue
///
/// A request announcing a body with `Expect: 100-continue` is acknowledged
/// with an interim `100` as soon as it arrives, unless an
/// [`ExpectationVerifier`] is registered. With a verifier, input is suspended
/// until it delivers its verdict: continue (ack and stream the body) or a
/// final error response of status `400` or above. After a rejection the
/// connection is not reused, and any body bytes the client sends regardless
/// are drained and dropped.
pub struct ServerEngine<T> {
    state: ExchangeState<T>,
    registry: Arc<HandlerRegistry<T>>,
    processor: Arc<dyn HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    verifier: Option<Arc<dyn ExpectationVerifier>>,
}

impl<T: Send + 'static> ServerEngine<T> {
    pub fn new(registry: Arc<HandlerRegistry<T>>) -> Self {
        Self::with_parts(registry, Arc::new(PassthroughProcessor), Arc::new(DefaultReuseStrategy), None)
    }

    pub fn with_parts(
        registry: Arc<HandlerRegistry<T>>,
        processor: Arc<dyn HttpProcessor>,
        reuse: Arc<dyn ConnectionReuseStrategy>,
        verifier: Option<Arc<dyn ExpectationVerifier>>,
    ) -> Self {
        Self { state: ExchangeState::new(), registry, processor, reuse, verifier }
    }

    fn on_request_received<C: ServerConnection>(
        &mut self,
        conn: &mut C,
        request: RequestHead,
        payload: PayloadSize,
    ) -> Result<(), HttpError> {
        ensure!(
            self.state.request_state.is_ready() && self.state.incoming.is_none(),
            ProtocolError::unexpected_message("request received while the previous request is incomplete").into()
        );
        debug!(method = %request.method(), uri = %request.uri(), "request received");

        if request.version() > Version::HTTP_11 {
            return Err(ProtocolError::VersionNotSupported { version: request.version() }.into());
        }
        let Some(handler) = self.registry.resolve(&request) else {
            return Err(ProtocolError::MethodNotSupported { method: request.method().clone() }.into());
        };

        let mut request = request;
        self.processor.process_request(&mut request)?;
        let method = request.method().clone();
        let uri = request.uri().clone();
        let expect = !payload.is_empty() && expects_continue(&request);
        let mut consumer = handler.process_request(&request)?;

        if expect {
            if let Some(verifier) = self.verifier.clone() {
                // hold the body back until the verifier has spoken
                let io = conn.io_control();
                io.suspend_input();
                let shared = VerdictShared::new(io);
                self.state.expectation = Some(Arc::clone(&shared));
                self.state.request_state = MessageState::AckExpected;
                verifier.verify(&request, crate::server::ExpectationTrigger::from_shared(shared));
                consumer.request_received(request)?;
                self.state.incoming = Some(Incoming::Active { consumer, handler, method, uri });
                return Ok(());
            }
            // no verifier registered: acknowledge immediately
            conn.submit_response(interim_continue(), PayloadSize::Empty)?;
            debug!("expectation acknowledged, continue sent");
            consumer.request_received(request)?;
            self.state.incoming = Some(Incoming::Active { consumer, handler, method, uri });
            self.state.request_state = MessageState::BodyStream;
            return Ok(());
        }

        consumer.request_received(request)?;
        self.state.incoming = Some(Incoming::Active { consumer, handler, method, uri });
        if payload.is_empty() {
            self.dispatch(conn)
        } else {
            self.state.request_state = MessageState::BodyStream;
            Ok(())
        }
    }

    fn on_input_ready<C: ServerConnection>(
        &mut self,
        conn: &mut C,
        decoder: &mut dyn ContentDecoder,
    ) -> Result<(), HttpError> {
        enum After {
            Nothing,
            Dispatch,
            EndDiscard,
        }

        let io = conn.io_control();
        let after = match self.state.incoming.as_mut() {
            Some(Incoming::Active { consumer, .. }) => {
                if self.state.request_state != MessageState::BodyStream {
                    return Err(ProtocolError::unexpected_message("request body before the expectation verdict").into());
                }
                consumer.consume_content(decoder, io.as_ref())?;
                if decoder.is_completed() { After::Dispatch } else { After::Nothing }
            }
            Some(Incoming::Discard(consumer)) => {
                consumer.consume_content(decoder, io.as_ref())?;
                if decoder.is_completed() { After::EndDiscard } else { After::Nothing }
            }
            None => {
                return Err(ProtocolError::unexpected_message("body bytes received without a request in progress").into());
            }
        };

        match after {
            After::Dispatch => self.dispatch(conn),
            After::EndDiscard => {
                if let Some(Incoming::Discard(mut consumer)) = self.state.incoming.take() {
                    consumer.completed()?;
                }
                self.state.request_state = MessageState::Ready;
                Ok(())
            }
            After::Nothing => Ok(()),
        }
    }

    /// The request is fully received: hand its result to the handler and
    /// queue the exchange for its response.
    fn dispatch<C: ServerConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        let Some(Incoming::Active { mut consumer, handler, method, uri }) = self.state.incoming.take() else {
            return Err(ProtocolError::invalid_state("dispatch without an active request").into());
        };
        let result = consumer.completed()?;
        consumer.close();
        // the request side is immediately ready for the next pipelined request
        self.state.request_state = MessageState::Ready;

        let shared = TriggerShared::new(conn.io_control());
        self.state.pipeline.push_back(PipelineEntry {
            trigger: Arc::clone(&shared),
            method: method.clone(),
            uri: uri.clone(),
            from_expectation: false,
        });
        debug!(method = %method, uri = %uri, queued = self.state.pipeline.len(), "request dispatched");

        handler.handle(result, ResponseTrigger::from_shared(shared))?;
        self.on_response_ready(conn)
    }

    /// Applies a pending expectation verdict, if the verifier has delivered
    /// one.
    fn process_expectation<C: ServerConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        let Some(shared) = self.state.expectation.clone() else {
            return Ok(());
        };
        match shared.take_verdict() {
            None => Ok(()),
            Some(Verdict::Continue) => {
                self.state.expectation = None;
                debug!("expectation verified, sending continue");
                conn.submit_response(interim_continue(), PayloadSize::Empty)?;
                self.state.request_state = MessageState::BodyStream;
                conn.io_control().request_input();
                Ok(())
            }
            Some(Verdict::Reject(producer)) => {
                self.state.expectation = None;
                debug!("expectation rejected");
                let mut method = http::Method::GET;
                let mut uri = http::Uri::from_static("/");
                match self.state.incoming.take() {
                    Some(Incoming::Active { mut consumer, method: m, uri: u, handler: _ }) => {
                        consumer.close();
                        method = m;
                        uri = u;
                    }
                    other => self.state.incoming = other,
                }
                // the client may send the announced body anyway; drain it
                self.state.incoming = Some(Incoming::Discard(DiscardingRequestConsumer::new()));
                self.state.request_state = MessageState::BodyStream;
                conn.io_control().request_input();

                let trigger = TriggerShared::prefired(conn.io_control(), producer);
                self.state.pipeline.push_back(PipelineEntry { trigger, method, uri, from_expectation: true });
                Ok(())
            }
        }
    }

    fn on_response_ready<C: ServerConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        self.process_expectation(conn)?;

        loop {
            if !self.state.response_state.is_ready() {
                return Ok(());
            }
            let Some(front) = self.state.pipeline.front() else {
                conn.io_control().suspend_output();
                return Ok(());
            };
            let Some(submission) = front.trigger.take_submission() else {
                // the handler has not fired its trigger yet; it will wake us
                conn.io_control().suspend_output();
                return Ok(());
            };
            let Some(entry) = self.state.pipeline.pop_front() else {
                return Ok(());
            };

            match submission {
                Submission::Failure(e) => return Err(e),
                Submission::Response(producer) => {
                    self.commit_response(conn, entry, producer)?;
                    if self.state.response_state == MessageState::BodyStream || !self.state.keep_alive {
                        return Ok(());
                    }
                    // the committed response had no body and the connection
                    // survives: the next queued exchange may commit right away
                }
            }
        }
    }

    fn commit_response<C: ServerConnection>(
        &mut self,
        conn: &mut C,
        entry: PipelineEntry,
        mut producer: Box<dyn ResponseProducer>,
    ) -> Result<(), HttpError> {
        let (mut head, mut payload) = producer.generate()?;
        if entry.from_expectation && head.status().as_u16() < 400 {
            return Err(ProtocolError::invalid_state("expectation verdict must be continue or a final error status").into());
        }
        self.processor.process_response(&mut head)?;

        // the handler may have attached an entity, but some exchanges must
        // never carry one on the wire
        if forbids_request_body(&entry.method) || forbids_response_body(head.status()) {
            payload = PayloadSize::Empty;
        }
        let keep_alive = self.reuse.keep_alive(&head) && !entry.from_expectation;

        debug!(status = %head.status(), method = %entry.method, uri = %entry.uri, "committing response");
        conn.submit_response(head, payload)?;
        self.state.keep_alive = keep_alive;

        if payload.is_empty() {
            producer.close();
            self.state.response_state = MessageState::Ready;
            if !keep_alive {
                debug!("connection not reusable, closing");
                conn.close();
            }
        } else {
            self.state.outgoing = Some(producer);
            self.state.response_state = MessageState::BodyStream;
        }
        Ok(())
    }

    fn on_output_ready<C: ServerConnection>(
        &mut self,
        conn: &mut C,
        encoder: &mut dyn ContentEncoder,
    ) -> Result<(), HttpError> {
        if self.state.response_state == MessageState::BodyStream {
            let io = conn.io_control();
            let Some(producer) = self.state.outgoing.as_mut() else {
                return Err(ProtocolError::invalid_state("response body streaming without a producer").into());
            };
            producer.produce_content(encoder, io.as_ref())?;
            if encoder.is_completed() {
                self.finish_response(conn)?;
            }
            Ok(())
        } else {
            self.on_response_ready(conn)
        }
    }

    /// The response body is fully written: clear the exchange and move on to
    /// the next pipelined one, or close the connection.
    fn finish_response<C: ServerConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        if let Some(mut producer) = self.state.outgoing.take() {
            producer.close();
        }
        self.state.response_state = MessageState::Ready;
        if self.state.keep_alive {
            trace!("response fully sent, exchange cleared");
            self.on_response_ready(conn)
        } else {
            debug!("connection not reusable, closing");
            conn.close();
            Ok(())
        }
    }

    fn handle_failure<C: ServerConnection>(&mut self, conn: &mut C, error: HttpError) {
        error!(cause = %error, "server exchange failed");
        self.state.fail_entities(&error);
        self.state.cancel_pipeline();

        let can_respond = self.state.response_state.is_ready()
            && !conn.is_response_submitted()
            && conn.status() == ConnectionStatus::Active
            && !error.is_fatal_to_connection();
        match error.status() {
            Some(status) if can_respond => {
                // a response head is irrevocable; this path only runs while
                // nothing of a response has been committed
                if conn.submit_response(error_response(status), PayloadSize::Empty).is_ok() {
                    conn.close();
                } else {
                    conn.shutdown();
                }
            }
            _ => conn.shutdown(),
        }
    }
}

impl<T> std::fmt::Debug for ServerEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerEngine")
            .field("request_state", &self.state.request_state)
            .field("response_state", &self.state.response_state)
            .field("queued", &self.state.pipeline.len())
            .finish_non_exhaustive()
    }
}

fn interim_continue() -> ResponseHead {
    Response::builder().status(StatusCode::CONTINUE).version(Version::HTTP_11).body(()).unwrap()
}

fn error_response(status: StatusCode) -> ResponseHead {
    Response::builder().status(status).version(Version::HTTP_11).header(CONNECTION, "close").body(()).unwrap()
}

impl<T: Send + 'static, C: ServerConnection> ServerEventHandler<C> for ServerEngine<T> {
    fn connected(&mut self, conn: &mut C) {
        trace!("connection ready");
        conn.io_control().request_input();
    }

    fn request_received(&mut self, conn: &mut C, request: RequestHead, payload: PayloadSize) {
        if let Err(e) = self.on_request_received(conn, request, payload) {
            self.handle_failure(conn, e);
        }
    }

    fn input_ready(&mut self, conn: &mut C, decoder: &mut dyn ContentDecoder) {
        if let Err(e) = self.on_input_ready(conn, decoder) {
            self.handle_failure(conn, e);
        }
    }

    fn response_ready(&mut self, conn: &mut C) {
        if let Err(e) = self.on_response_ready(conn) {
            self.handle_failure(conn, e);
        }
    }

    fn output_ready(&mut self, conn: &mut C, encoder: &mut dyn ContentEncoder) {
        if let Err(e) = self.on_output_ready(conn, encoder) {
            self.handle_failure(conn, e);
        }
    }

    fn timeout(&mut self, conn: &mut C) {
        error!("connection timed out");
        self.state.fail_entities(&HttpError::Timeout);
        self.state.cancel_pipeline();
        if conn.status() == ConnectionStatus::Active {
            // leave a grace period for buffered output to flush; the next
            // timeout escalates to a hard shutdown
            conn.close();
        } else {
            conn.shutdown();
        }
    }

    fn exception(&mut self, conn: &mut C, error: HttpError) {
        self.handle_failure(conn, error);
    }

    fn closed(&mut self, _conn: &mut C) {
        trace!("connection closed");
        self.state.fail_entities(&HttpError::io(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "connection closed",
        )));
        self.state.cancel_pipeline();
    }
}
