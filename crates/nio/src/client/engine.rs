use std::io;
use std::sync::Arc;

use http::StatusCode;
use tracing::{debug, error, trace};

use crate::client::exchange::{ClientConfig, Exchange};
use crate::codec::{ContentDecoder, ContentEncoder};
use crate::ensure;
use crate::concurrent::BasicFuture;
use crate::connection::{ClientConnection, ClientEventHandler, ConnectionStatus, HttpConnection, IoControl};
use crate::entity::{RequestProducer, ResponseConsumer};
use crate::protocol::{
    expects_continue, ConnectionReuseStrategy, DefaultReuseStrategy, HttpError, HttpProcessor, MessageState,
    PassthroughProcessor, PayloadSize, ProtocolError, ResponseHead,
};

/// Drives one logical request/response exchange over a client connection.
///
/// The engine is owned by its connection and advanced purely by reactor
/// callbacks. One exchange is active at a time; once it completes and the
/// reuse strategy keeps the connection alive, [`execute`](ClientEngine::execute)
/// may be called again for the next exchange.
///
/// # State machine
///
/// Request direction: `Ready → (AckExpected | BodyStream) → Completed`.
/// Response direction: `Ready → BodyStream → Completed`.
///
/// A request that declares `Expect: 100-continue` parks in `AckExpected` with
/// a short provisional read timeout. Three things can move it on:
///
/// - `100 Continue` arrives: the body is streamed (the normal path)
/// - the provisional timeout elapses: the body is streamed anyway, since a
///   server that ignores the expectation mechanism will never answer
/// - a final response arrives early: the body is abandoned, the response is
///   processed, and the connection is not reused because the request entity
///   was cut off mid-stream
pub struct ClientEngine<T> {
    exchange: Option<Exchange<T>>,
    processor: Arc<dyn HttpProcessor>,
    reuse: Arc<dyn ConnectionReuseStrategy>,
    config: ClientConfig,
}

impl<T: Send + 'static> ClientEngine<T> {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(PassthroughProcessor), Arc::new(DefaultReuseStrategy), ClientConfig::default())
    }

    pub fn with_parts(
        processor: Arc<dyn HttpProcessor>,
        reuse: Arc<dyn ConnectionReuseStrategy>,
        config: ClientConfig,
    ) -> Self {
        Self { exchange: None, processor, reuse, config }
    }

    /// Queues one exchange and wakes the connection for output.
    ///
    /// Fails if an exchange is already in progress: this engine serializes
    /// exchanges, pipelining lives in
    /// [`PipeliningClientEngine`](crate::client::PipeliningClientEngine).
    pub fn execute(
        &mut self,
        producer: Box<dyn RequestProducer>,
        consumer: Box<dyn ResponseConsumer<Output = T>>,
        io: &dyn IoControl,
    ) -> Result<BasicFuture<T>, HttpError> {
        if self.exchange.is_some() {
            return Err(ProtocolError::invalid_state("an exchange is already in progress").into());
        }
        let exchange = Exchange::new(producer, consumer);
        let future = exchange.future.clone();
        self.exchange = Some(exchange);
        io.request_output();
        Ok(future)
    }

    /// True while an exchange is in flight.
    pub fn is_active(&self) -> bool {
        self.exchange.is_some()
    }

    fn on_request_ready<C: ClientConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        let Some(exchange) = self.exchange.as_mut() else {
            conn.io_control().suspend_output();
            return Ok(());
        };
        if !exchange.request_state.is_ready() {
            return Ok(());
        }

        let (mut head, payload) = exchange.producer.generate()?;
        self.processor.process_request(&mut head)?;
        let wants_continue = !payload.is_empty() && expects_continue(&head);
        exchange.request_line = Some((head.method().clone(), head.uri().clone()));
        debug!(method = %head.method(), uri = %head.uri(), "submitting request");
        conn.submit_request(head, payload)?;

        if payload.is_empty() {
            exchange.producer.close();
            exchange.request_state = MessageState::Completed;
        } else if wants_continue {
            exchange.request_state = MessageState::AckExpected;
            exchange.saved_timeout = Some(conn.socket_timeout());
            conn.set_socket_timeout(Some(self.config.wait_for_continue));
            conn.io_control().suspend_output();
        } else {
            exchange.request_state = MessageState::BodyStream;
        }
        Ok(())
    }

    fn on_output_ready<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        encoder: &mut dyn ContentEncoder,
    ) -> Result<(), HttpError> {
        let io = conn.io_control();
        let Some(exchange) = self.exchange.as_mut() else {
            io.suspend_output();
            return Ok(());
        };
        match exchange.request_state {
            MessageState::BodyStream => {
                exchange.producer.produce_content(encoder, io.as_ref())?;
                if encoder.is_completed() {
                    exchange.producer.close();
                    exchange.request_state = MessageState::Completed;
                }
            }
            // not allowed to write until the server (or the provisional
            // timeout) lets the body through
            MessageState::AckExpected => io.suspend_output(),
            _ => io.suspend_output(),
        }
        Ok(())
    }

    fn on_response_received<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        mut response: ResponseHead,
        payload: PayloadSize,
    ) -> Result<(), HttpError> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Err(ProtocolError::out_of_sequence("response received without an outstanding request").into());
        };
        ensure!(
            exchange.response_state.is_ready(),
            ProtocolError::out_of_sequence("response received while another response is in progress").into()
        );

        let status = response.status();
        if status.is_informational() {
            if status == StatusCode::CONTINUE && exchange.request_state == MessageState::AckExpected {
                debug!("continue received, resuming request body");
                restore_timeout(conn, exchange);
                exchange.request_state = MessageState::BodyStream;
                conn.io_control().request_output();
            }
            // other interim responses are dropped on the floor
            return Ok(());
        }

        if matches!(exchange.request_state, MessageState::AckExpected | MessageState::BodyStream) {
            // a final status before the request body went out: the server has
            // short-circuited the exchange and the remaining body will never
            // be sent, so the framing on this connection cannot be trusted
            // for another exchange
            debug!(status = %status, "early response, abandoning request body");
            if exchange.request_state == MessageState::AckExpected {
                restore_timeout(conn, exchange);
            }
            exchange.valid = false;
            exchange.producer.reset()?;
            exchange.producer.close();
            exchange.request_state = MessageState::Completed;
            conn.io_control().suspend_output();
        }

        self.processor.process_response(&mut response)?;
        exchange.keep_alive = exchange.valid && self.reuse.keep_alive(&response);
        exchange.consumer.response_received(response)?;

        if payload.is_empty() {
            exchange.response_state = MessageState::Completed;
            self.complete_exchange(conn)
        } else {
            exchange.response_state = MessageState::BodyStream;
            Ok(())
        }
    }

    fn on_input_ready<C: ClientConnection>(
        &mut self,
        conn: &mut C,
        decoder: &mut dyn ContentDecoder,
    ) -> Result<(), HttpError> {
        let io = conn.io_control();
        let Some(exchange) = self.exchange.as_mut() else {
            return Err(ProtocolError::unexpected_message("body bytes received without a response in progress").into());
        };
        if exchange.response_state != MessageState::BodyStream {
            return Err(ProtocolError::unexpected_message("body bytes received outside response body streaming").into());
        }

        exchange.consumer.consume_content(decoder, io.as_ref())?;
        if decoder.is_completed() {
            exchange.response_state = MessageState::Completed;
            self.complete_exchange(conn)?;
        }
        Ok(())
    }

    fn complete_exchange<C: ClientConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        let Some(mut exchange) = self.exchange.take() else {
            return Err(ProtocolError::invalid_state("no exchange to complete").into());
        };
        debug_assert!(exchange.is_finished());
        if let Some((method, uri)) = &exchange.request_line {
            trace!(method = %method, uri = %uri, "exchange completed");
        }

        let result = exchange.consumer.completed();
        exchange.consumer.close();
        exchange.producer.close();
        match result {
            Ok(value) => {
                exchange.future.complete(value);
            }
            Err(e) => {
                error!(cause = %e, "consumer failed to produce a result");
                exchange.future.fail(e);
                conn.shutdown();
                return Ok(());
            }
        }

        if exchange.keep_alive {
            trace!("connection kept alive for the next exchange");
        } else {
            debug!("connection not reusable, closing");
            conn.close();
        }
        Ok(())
    }

    fn on_timeout<C: ClientConnection>(&mut self, conn: &mut C) -> Result<(), HttpError> {
        if let Some(exchange) = self.exchange.as_mut() {
            if exchange.request_state == MessageState::AckExpected {
                // the server never answered the expectation; proceed as if it
                // had agreed
                debug!("continue not received within the provisional timeout, sending body anyway");
                restore_timeout(conn, exchange);
                exchange.request_state = MessageState::BodyStream;
                conn.io_control().request_output();
                return Ok(());
            }
        }
        Err(HttpError::Timeout)
    }

    fn fail_exchange(&mut self, cause: HttpError) {
        if let Some(mut exchange) = self.exchange.take() {
            exchange.producer.failed(&cause);
            exchange.consumer.failed(&cause);
            exchange.producer.close();
            exchange.consumer.close();
            exchange.future.fail(cause);
        }
    }

    fn handle_failure<C: ClientConnection>(&mut self, conn: &mut C, error: HttpError) {
        error!(cause = %error, "client exchange failed");
        let fatal = error.is_fatal_to_connection();
        self.fail_exchange(error);
        if fatal || conn.status() == ConnectionStatus::Closing {
            conn.shutdown();
        } else {
            conn.close();
        }
    }
}

impl<T: Send + 'static> Default for ClientEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn restore_timeout<T, C: HttpConnection>(conn: &mut C, exchange: &mut Exchange<T>) {
    if let Some(saved) = exchange.saved_timeout.take() {
        conn.set_socket_timeout(saved);
    }
}

impl<T: Send + 'static, C: ClientConnection> ClientEventHandler<C> for ClientEngine<T> {
    fn connected(&mut self, conn: &mut C) {
        trace!("connection ready");
        if self.exchange.is_some() {
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
        if let Err(e) = self.on_timeout(conn) {
            self.handle_failure(conn, e);
        }
    }

    fn exception(&mut self, conn: &mut C, error: HttpError) {
        self.handle_failure(conn, error);
    }

    fn closed(&mut self, _conn: &mut C) {
        self.fail_exchange(HttpError::io(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection closed before the exchange completed",
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{BasicRequestProducer, BasicResponseConsumer};
    use crate::testing::{MockClientConnection, MockDecoder, MockEncoder};
    use bytes::Bytes;
    use http::header::EXPECT;
    use http::{Method, Request, Response, Version};
    use std::time::Duration;

    type Engine = ClientEngine<Response<Bytes>>;

    fn get_producer(uri: &str) -> Box<BasicRequestProducer> {
        let head = Request::builder().method(Method::GET).uri(uri).version(Version::HTTP_11).body(()).unwrap();
        Box::new(BasicRequestProducer::new(head, Bytes::new()))
    }

    fn post_producer_with_expect(body: &'static [u8]) -> Box<BasicRequestProducer> {
        let head = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .version(Version::HTTP_11)
            .header(EXPECT, "100-continue")
            .body(())
            .unwrap();
        Box::new(BasicRequestProducer::chunked(head, body))
    }

    fn response_head(status: StatusCode) -> ResponseHead {
        Response::builder().status(status).version(Version::HTTP_11).body(()).unwrap()
    }

    fn start(engine: &mut Engine, conn: &mut MockClientConnection, producer: Box<BasicRequestProducer>) -> BasicFuture<Response<Bytes>> {
        let io = conn.io_control();
        let future = engine.execute(producer, Box::new(BasicResponseConsumer::new()), io.as_ref()).unwrap();
        engine.request_ready(conn);
        future
    }

    #[test]
    fn test_simple_exchange_roundtrip() {
        crate::testing::init_tracing();
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, get_producer("/Ax10"));

        assert_eq!(conn.submitted.len(), 1);
        assert_eq!(conn.submitted[0].0.uri().path(), "/Ax10");
        assert_eq!(conn.submitted[0].1, PayloadSize::Empty);

        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Length(10));
        let mut decoder = MockDecoder::completed_body(b"AAAAAAAAAA");
        engine.input_ready(&mut conn, &mut decoder);

        let response = future.get_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"AAAAAAAAAA");
        // http/1.1 default: reusable
        assert!(!conn.is_closed());
        assert!(!engine.is_active());
    }

    #[test]
    fn test_expect_continue_ack_then_single_body_transfer() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        conn.set_socket_timeout(Some(Duration::from_secs(30)));
        let future = start(&mut engine, &mut conn, post_producer_with_expect(b"0123456789"));

        // parked awaiting the ack, provisional timeout installed
        assert_eq!(conn.socket_timeout(), Some(Duration::from_millis(3000)));
        assert!(conn.io().output_suspended());

        engine.response_received(&mut conn, response_head(StatusCode::CONTINUE), PayloadSize::Empty);
        assert_eq!(conn.socket_timeout(), Some(Duration::from_secs(30)));
        assert!(!conn.io().output_suspended());

        let mut encoder = MockEncoder::new();
        engine.output_ready(&mut conn, &mut encoder);
        assert_eq!(encoder.written(), b"0123456789");

        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Empty);
        let response = future.get_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // the body went out exactly once
        assert_eq!(encoder.written(), b"0123456789");
    }

    #[test]
    fn test_expect_continue_provisional_timeout_sends_body_anyway() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, post_producer_with_expect(b"0123456789"));
        assert_eq!(conn.socket_timeout(), Some(Duration::from_millis(3000)));

        // the server stays silent; the provisional timeout fires
        engine.timeout(&mut conn);
        assert_eq!(conn.socket_timeout(), None);
        assert!(!conn.is_closed());

        let mut encoder = MockEncoder::new();
        engine.output_ready(&mut conn, &mut encoder);
        assert_eq!(encoder.written(), b"0123456789");

        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Length(10));
        let mut decoder = MockDecoder::completed_body(b"0123456789");
        engine.input_ready(&mut conn, &mut decoder);

        let response = future.get_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"0123456789");
    }

    #[test]
    fn test_response_body_split_across_input_events() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, get_producer("/big"));

        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Length(8));
        let mut first = MockDecoder::partial([&b"0123"[..]]);
        engine.input_ready(&mut conn, &mut first);
        assert!(engine.is_active());

        let mut second = MockDecoder::completed_body(b"4567");
        engine.input_ready(&mut conn, &mut second);

        let response = future.get_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(&response.body()[..], b"01234567");
    }

    #[test]
    fn test_early_response_invalidates_connection_reuse() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, post_producer_with_expect(b"0123456789"));

        // a final status while still waiting for the ack
        engine.response_received(&mut conn, response_head(StatusCode::EXPECTATION_FAILED), PayloadSize::Empty);

        let response = future.get_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
        // the request body was abandoned mid-exchange: never reuse
        assert!(conn.is_closed());
    }

    #[test]
    fn test_unsolicited_response_is_a_protocol_violation() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Empty);
        assert!(conn.is_closed());
    }

    #[test]
    fn test_terminal_events_deliver_exactly_one_failure() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, get_producer("/slow"));

        engine.timeout(&mut conn);
        // racing terminal events after the failure are no-ops
        engine.timeout(&mut conn);
        engine.closed(&mut conn);

        assert!(matches!(future.get_timeout(Duration::from_secs(1)), Err(HttpError::Timeout)));
        assert!(!engine.is_active());
    }

    #[test]
    fn test_connection_reuse_supports_sequential_exchanges() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();

        let first = start(&mut engine, &mut conn, get_producer("/one"));
        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Empty);
        assert_eq!(first.get_timeout(Duration::from_secs(1)).unwrap().status(), StatusCode::OK);
        conn.response_arrived();

        let second = start(&mut engine, &mut conn, get_producer("/two"));
        assert_eq!(conn.submitted.len(), 2);
        assert_eq!(conn.submitted[1].0.uri().path(), "/two");
        engine.response_received(&mut conn, response_head(StatusCode::OK), PayloadSize::Empty);
        assert_eq!(second.get_timeout(Duration::from_secs(1)).unwrap().status(), StatusCode::OK);
    }

    #[test]
    fn test_connection_close_directive_ends_reuse() {
        let mut engine = Engine::new();
        let mut conn = MockClientConnection::new();
        let future = start(&mut engine, &mut conn, get_producer("/bye"));

        let head = Response::builder()
            .status(StatusCode::OK)
            .version(Version::HTTP_11)
            .header(http::header::CONNECTION, "close")
            .body(())
            .unwrap();
        engine.response_received(&mut conn, head, PayloadSize::Empty);

        assert_eq!(future.get_timeout(Duration::from_secs(1)).unwrap().status(), StatusCode::OK);
        assert!(conn.is_closed());
    }
}
