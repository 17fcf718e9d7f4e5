use bytes::{Buf, Bytes, BytesMut};
use http::{Request, Response};
use tracing::debug;

use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::IoControl;
use crate::entity::{RequestConsumer, RequestProducer, ResponseConsumer, ResponseProducer};
use crate::protocol::{HttpError, PayloadSize, ProtocolError, RequestHead, ResponseHead};

/// Streams a fully materialized `Bytes` body for one outgoing request.
///
/// The body is kept around untouched so [`RequestProducer::reset`] can rewind
/// after an early response forces the engine to abandon a partial transfer.
pub struct BasicRequestProducer {
    head: Option<RequestHead>,
    body: Bytes,
    remaining: Bytes,
    payload: PayloadSize,
    produced: bool,
    released: bool,
}

impl BasicRequestProducer {
    /// A content-length framed request. An empty body yields no entity at all.
    pub fn new(head: RequestHead, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let payload = if body.is_empty() { PayloadSize::Empty } else { PayloadSize::Length(body.len() as u64) };
        Self::with_payload(head, body, payload)
    }

    /// A chunked-transfer framed request.
    pub fn chunked(head: RequestHead, body: impl Into<Bytes>) -> Self {
        Self::with_payload(head, body.into(), PayloadSize::Chunked)
    }

    fn with_payload(head: RequestHead, body: Bytes, payload: PayloadSize) -> Self {
        let remaining = body.clone();
        Self { head: Some(head), body, remaining, payload, produced: false, released: false }
    }
}

impl RequestProducer for BasicRequestProducer {
    fn generate(&mut self) -> Result<(RequestHead, PayloadSize), HttpError> {
        match self.head.take() {
            Some(head) => Ok((head, self.payload)),
            None => Err(ProtocolError::invalid_state("request already generated").into()),
        }
    }

    fn produce_content(&mut self, encoder: &mut dyn ContentEncoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        while !self.remaining.is_empty() {
            let accepted = encoder.write(&self.remaining)?;
            if accepted == 0 {
                // transport is congested, wait for the next output-ready event
                return Ok(());
            }
            self.remaining.advance(accepted);
        }
        encoder.complete()?;
        self.produced = true;
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.produced
    }

    fn reset(&mut self) -> Result<(), HttpError> {
        self.remaining = self.body.clone();
        self.produced = false;
        Ok(())
    }

    fn failed(&mut self, _cause: &HttpError) {
        self.close();
    }

    fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.remaining = Bytes::new();
            self.body = Bytes::new();
        }
    }
}

/// Streams a fully materialized `Bytes` body for one outgoing response.
pub struct BasicResponseProducer {
    head: Option<ResponseHead>,
    remaining: Bytes,
    payload: PayloadSize,
    released: bool,
}

impl BasicResponseProducer {
    /// A content-length framed response. An empty body yields no entity.
    pub fn new(head: ResponseHead, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let payload = if body.is_empty() { PayloadSize::Empty } else { PayloadSize::Length(body.len() as u64) };
        Self { head: Some(head), remaining: body, payload, released: false }
    }

    /// A chunked-transfer framed response.
    pub fn chunked(head: ResponseHead, body: impl Into<Bytes>) -> Self {
        Self { head: Some(head), remaining: body.into(), payload: PayloadSize::Chunked, released: false }
    }

    /// A bodyless response.
    pub fn empty(head: ResponseHead) -> Self {
        Self::new(head, Bytes::new())
    }
}

impl ResponseProducer for BasicResponseProducer {
    fn generate(&mut self) -> Result<(ResponseHead, PayloadSize), HttpError> {
        match self.head.take() {
            Some(head) => Ok((head, self.payload)),
            None => Err(ProtocolError::invalid_state("response already generated").into()),
        }
    }

    fn produce_content(&mut self, encoder: &mut dyn ContentEncoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        while !self.remaining.is_empty() {
            let accepted = encoder.write(&self.remaining)?;
            if accepted == 0 {
                return Ok(());
            }
            self.remaining.advance(accepted);
        }
        encoder.complete()?;
        Ok(())
    }

    fn failed(&mut self, _cause: &HttpError) {
        self.close();
    }

    fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.remaining = Bytes::new();
        }
    }
}

/// Buffers an entire incoming response and yields it as `Response<Bytes>`.
pub struct BasicResponseConsumer {
    head: Option<ResponseHead>,
    buf: BytesMut,
    done: bool,
}

impl BasicResponseConsumer {
    pub fn new() -> Self {
        Self { head: None, buf: BytesMut::new(), done: false }
    }
}

impl Default for BasicResponseConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseConsumer for BasicResponseConsumer {
    type Output = Response<Bytes>;

    fn response_received(&mut self, response: ResponseHead) -> Result<(), HttpError> {
        self.head = Some(response);
        Ok(())
    }

    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = decoder.read(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn completed(&mut self) -> Result<Self::Output, HttpError> {
        let head = self
            .head
            .take()
            .ok_or_else(|| ProtocolError::invalid_state("response completed before head was received"))?;
        self.done = true;
        let (parts, ()) = head.into_parts();
        Ok(Response::from_parts(parts, self.buf.split().freeze()))
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn failed(&mut self, _cause: &HttpError) {
        self.close();
    }

    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.buf.clear();
        }
    }
}

/// Buffers an entire incoming request and yields it as `Request<Bytes>`.
pub struct BasicRequestConsumer {
    head: Option<RequestHead>,
    buf: BytesMut,
    done: bool,
}

impl BasicRequestConsumer {
    pub fn new() -> Self {
        Self { head: None, buf: BytesMut::new(), done: false }
    }
}

impl Default for BasicRequestConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestConsumer for BasicRequestConsumer {
    type Output = Request<Bytes>;

    fn request_received(&mut self, request: RequestHead) -> Result<(), HttpError> {
        self.head = Some(request);
        Ok(())
    }

    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            let n = decoder.read(&mut chunk)?;
            if n == 0 {
                return Ok(());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn completed(&mut self) -> Result<Self::Output, HttpError> {
        let head = self
            .head
            .take()
            .ok_or_else(|| ProtocolError::invalid_state("request completed before head was received"))?;
        self.done = true;
        let (parts, ()) = head.into_parts();
        Ok(Request::from_parts(parts, self.buf.split().freeze()))
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn failed(&mut self, _cause: &HttpError) {
        self.close();
    }

    fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.buf.clear();
        }
    }
}

/// Drains and drops the body of a request nobody wants, keeping the
/// connection reusable after a rejected expectation or a terminated exchange.
pub struct DiscardingRequestConsumer {
    scratch: [u8; 4 * 1024],
    discarded: usize,
    done: bool,
}

impl DiscardingRequestConsumer {
    pub fn new() -> Self {
        Self { scratch: [0u8; 4 * 1024], discarded: 0, done: false }
    }
}

impl Default for DiscardingRequestConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestConsumer for DiscardingRequestConsumer {
    type Output = ();

    fn request_received(&mut self, _request: RequestHead) -> Result<(), HttpError> {
        Ok(())
    }

    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        loop {
            let n = decoder.read(&mut self.scratch)?;
            if n == 0 {
                break;
            }
            self.discarded += n;
        }
        Ok(())
    }

    fn completed(&mut self) -> Result<Self::Output, HttpError> {
        self.done = true;
        if self.discarded > 0 {
            debug!(size = self.discarded, "skip request body");
        }
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn failed(&mut self, _cause: &HttpError) {
        self.close();
    }

    fn close(&mut self) {
        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDecoder, MockEncoder, MockIoControl};
    use http::{Method, StatusCode};

    fn get_head(uri: &str) -> RequestHead {
        Request::builder().method(Method::GET).uri(uri).body(()).unwrap()
    }

    #[test]
    fn test_producer_writes_whole_body_and_completes() {
        let io = MockIoControl::default();
        let mut producer = BasicRequestProducer::new(get_head("/data"), &b"hello world"[..]);

        let (head, payload) = producer.generate().unwrap();
        assert_eq!(head.uri().path(), "/data");
        assert_eq!(payload, PayloadSize::Length(11));

        let mut encoder = MockEncoder::new();
        producer.produce_content(&mut encoder, &io).unwrap();
        assert_eq!(encoder.written(), b"hello world");
        assert!(encoder.is_completed());
        assert!(producer.is_completed());
    }

    #[test]
    fn test_producer_honors_encoder_backpressure() {
        let io = MockIoControl::default();
        let mut producer = BasicRequestProducer::new(get_head("/data"), &b"hello world"[..]);
        let _ = producer.generate().unwrap();

        let mut encoder = MockEncoder::with_budget(4);
        producer.produce_content(&mut encoder, &io).unwrap();
        assert_eq!(encoder.written(), b"hell");
        assert!(!producer.is_completed());

        encoder.replenish(4);
        producer.produce_content(&mut encoder, &io).unwrap();
        assert_eq!(encoder.written(), b"hello wo");

        encoder.replenish(100);
        producer.produce_content(&mut encoder, &io).unwrap();
        assert_eq!(encoder.written(), b"hello world");
        assert!(producer.is_completed());
    }

    #[test]
    fn test_producer_generate_twice_is_an_error() {
        let mut producer = BasicRequestProducer::new(get_head("/data"), &b""[..]);
        let _ = producer.generate().unwrap();
        assert!(producer.generate().is_err());
    }

    #[test]
    fn test_producer_reset_rewinds_body() {
        let io = MockIoControl::default();
        let mut producer = BasicRequestProducer::chunked(get_head("/data"), &b"abcdef"[..]);
        let (_, payload) = producer.generate().unwrap();
        assert!(payload.is_chunked());

        let mut encoder = MockEncoder::with_budget(3);
        producer.produce_content(&mut encoder, &io).unwrap();
        assert!(!producer.is_completed());

        producer.reset().unwrap();
        let mut encoder = MockEncoder::new();
        producer.produce_content(&mut encoder, &io).unwrap();
        assert_eq!(encoder.written(), b"abcdef");
    }

    #[test]
    fn test_consumer_collects_scattered_chunks() {
        let io = MockIoControl::default();
        let mut consumer = BasicResponseConsumer::new();
        consumer.response_received(Response::builder().status(StatusCode::OK).body(()).unwrap()).unwrap();

        let mut decoder = MockDecoder::with_chunks([&b"AAAA"[..], &b"AA"[..], &b"AAAA"[..]]);
        consumer.consume_content(&mut decoder, &io).unwrap();
        assert!(decoder.is_completed());

        let response = consumer.completed().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], b"AAAAAAAAAA");
        assert!(consumer.is_done());
    }

    #[test]
    fn test_consumer_completed_without_head_is_an_error() {
        let mut consumer = BasicResponseConsumer::new();
        assert!(consumer.completed().is_err());
    }

    #[test]
    fn test_terminal_release_is_idempotent() {
        let mut consumer = BasicResponseConsumer::new();
        consumer.close();
        assert!(consumer.is_done());
        consumer.close();
        consumer.failed(&HttpError::Timeout);
        assert!(consumer.is_done());

        let mut producer = BasicRequestProducer::new(get_head("/"), &b"x"[..]);
        producer.failed(&HttpError::Timeout);
        producer.failed(&HttpError::Timeout);
        producer.close();
    }

    #[test]
    fn test_discarding_consumer_drops_bytes() {
        let io = MockIoControl::default();
        let mut consumer = DiscardingRequestConsumer::new();
        consumer.request_received(get_head("/ignored")).unwrap();

        let mut decoder = MockDecoder::completed_body(b"some body nobody reads");
        consumer.consume_content(&mut decoder, &io).unwrap();
        consumer.completed().unwrap();
        assert!(consumer.is_done());
    }
}
