use std::sync::Arc;

use crate::bridge::{SharedInputBuffer, SharedOutputBuffer};
use crate::codec::{ContentDecoder, ContentEncoder};
use crate::connection::IoControl;
use crate::entity::{RequestConsumer, ResponseProducer};
use crate::protocol::{HttpError, PayloadSize, ProtocolError, RequestHead, ResponseHead};

/// A [`RequestConsumer`] that pipes the request body into a
/// [`SharedInputBuffer`] for a worker to read blocking-style.
///
/// The consumer's result is the bare request head; the body never
/// materializes on the I/O thread.
pub struct SharedInputConsumer {
    buffer: Arc<SharedInputBuffer>,
    head: Option<RequestHead>,
    done: bool,
}

impl SharedInputConsumer {
    pub fn new(buffer: Arc<SharedInputBuffer>) -> Self {
        Self { buffer, head: None, done: false }
    }
}

impl RequestConsumer for SharedInputConsumer {
    type Output = RequestHead;

    fn request_received(&mut self, request: RequestHead) -> Result<(), HttpError> {
        self.head = Some(request);
        Ok(())
    }

    fn consume_content(&mut self, decoder: &mut dyn ContentDecoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        // the buffer suspends and resumes input interest on its own
        self.buffer.consume_content(decoder)?;
        Ok(())
    }

    fn completed(&mut self) -> Result<Self::Output, HttpError> {
        self.done = true;
        self.head
            .take()
            .ok_or_else(|| ProtocolError::invalid_state("request completed before head was received").into())
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn failed(&mut self, _cause: &HttpError) {
        if !self.done {
            self.done = true;
            // unblock a worker waiting on body bytes that will never come
            self.buffer.shutdown();
        }
    }

    fn close(&mut self) {
        self.done = true;
    }
}

impl std::fmt::Debug for SharedInputConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedInputConsumer").field("done", &self.done).finish_non_exhaustive()
    }
}

/// A [`ResponseProducer`] that drains a [`SharedOutputBuffer`] filled
/// blocking-style by a worker.
pub struct SharedOutputProducer {
    buffer: Arc<SharedOutputBuffer>,
    head: Option<ResponseHead>,
    payload: PayloadSize,
    released: bool,
}

impl SharedOutputProducer {
    /// The payload declaration is fixed up front (typically
    /// [`PayloadSize::Chunked`], since the worker decides the length as it
    /// goes).
    pub fn new(head: ResponseHead, payload: PayloadSize, buffer: Arc<SharedOutputBuffer>) -> Self {
        Self { buffer, head: Some(head), payload, released: false }
    }
}

impl ResponseProducer for SharedOutputProducer {
    fn generate(&mut self) -> Result<(ResponseHead, PayloadSize), HttpError> {
        match self.head.take() {
            Some(head) => Ok((head, self.payload)),
            None => Err(ProtocolError::invalid_state("response already generated").into()),
        }
    }

    fn produce_content(&mut self, encoder: &mut dyn ContentEncoder, _io: &dyn IoControl) -> Result<(), HttpError> {
        // the buffer suspends and resumes output interest on its own
        self.buffer.produce_content(encoder)
    }

    fn failed(&mut self, _cause: &HttpError) {
        if !self.released {
            self.released = true;
            // unblock a worker still writing into a dead exchange
            self.buffer.shutdown();
        }
    }

    fn close(&mut self) {
        self.released = true;
    }
}

impl std::fmt::Debug for SharedOutputProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedOutputProducer").field("released", &self.released).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Executor, ThreadExecutor, WorkerGate};
    use crate::testing::{MockEncoder, MockIoControl, OwnedDecoder};
    use http::{Method, Request, Response, StatusCode};
    use std::time::Duration;

    #[test]
    fn test_shared_input_consumer_hands_body_to_worker() {
        let io = Arc::new(MockIoControl::default());
        let buffer = Arc::new(SharedInputBuffer::new(16, io.clone()));
        let mut consumer = SharedInputConsumer::new(buffer.clone());

        let head = Request::builder().method(Method::POST).uri("/upload").body(()).unwrap();
        consumer.request_received(head).unwrap();

        let mut decoder = OwnedDecoder::new(&b"streamed body"[..]);
        consumer.consume_content(&mut decoder, io.as_ref()).unwrap();

        let head = consumer.completed().unwrap();
        assert_eq!(head.uri().path(), "/upload");

        // the worker reads the body blocking-style
        let mut collected = Vec::new();
        let mut chunk = [0u8; 4];
        loop {
            let n = buffer.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(collected, b"streamed body");
    }

    #[test]
    fn test_shared_output_producer_streams_worker_bytes() {
        let io = Arc::new(MockIoControl::default());
        let buffer = Arc::new(SharedOutputBuffer::new(64, io.clone()));
        let head = Response::builder().status(StatusCode::OK).body(()).unwrap();
        let mut producer = SharedOutputProducer::new(head, PayloadSize::Chunked, buffer.clone());

        let (head, payload) = producer.generate().unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert!(payload.is_chunked());

        buffer.write(b"worker says hi").unwrap();
        buffer.write_completed();

        let mut encoder = MockEncoder::new();
        producer.produce_content(&mut encoder, io.as_ref()).unwrap();
        assert_eq!(encoder.written(), b"worker says hi");
        assert!(encoder.is_completed());
    }

    #[test]
    fn test_failure_unblocks_the_worker() {
        let io = Arc::new(MockIoControl::default());
        let buffer = Arc::new(SharedInputBuffer::new(8, io));
        let mut consumer = SharedInputConsumer::new(buffer.clone());

        let reader = buffer.clone();
        let worker = std::thread::spawn(move || {
            let mut chunk = [0u8; 8];
            reader.read(&mut chunk)
        });

        std::thread::sleep(Duration::from_millis(20));
        consumer.failed(&HttpError::Timeout);
        consumer.failed(&HttpError::Timeout);
        assert!(worker.join().unwrap().is_err());
    }

    #[test]
    fn test_worker_round_trip_through_the_executor() {
        let io = Arc::new(MockIoControl::default());
        let input = Arc::new(SharedInputBuffer::new(8, io.clone()));
        let output = Arc::new(SharedOutputBuffer::new(8, io.clone()));
        let gate = Arc::new(WorkerGate::new());

        // a blocking-style echo worker, the way a throttling handler runs one
        let executor = ThreadExecutor;
        let (worker_in, worker_out, worker_gate) = (input.clone(), output.clone(), gate.clone());
        executor.execute(Box::new(move || {
            if !worker_gate.acquire() {
                return;
            }
            let mut chunk = [0u8; 4];
            loop {
                match worker_in.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if worker_out.write(&chunk[..n]).is_err() {
                            break;
                        }
                    }
                }
            }
            worker_out.write_completed();
            worker_gate.release();
        }));

        let mut decoder = OwnedDecoder::new(&b"0123456789abcdef"[..]);
        let mut encoder = MockEncoder::new();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !encoder.is_completed() {
            assert!(std::time::Instant::now() < deadline, "echo stalled");
            input.consume_content(&mut decoder).unwrap();
            output.produce_content(&mut encoder).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(encoder.written(), b"0123456789abcdef");
        assert!(gate.acquire());
    }
}
