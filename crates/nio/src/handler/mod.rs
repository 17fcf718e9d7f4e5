//! Application-facing handler contracts of the server engine.
//!
//! A handler participates in an exchange twice: once when the request head
//! arrives (to choose how the body will be consumed) and once when the body
//! has been fully received (to produce a response, immediately or later
//! through the deferred [`ResponseTrigger`]).

use bytes::Bytes;
use http::Request;

use crate::entity::{BasicRequestConsumer, RequestConsumer};
use crate::protocol::{HttpError, RequestHead};
use crate::server::{ExpectationTrigger, ResponseTrigger};

mod registry;
pub use registry::HandlerRegistry;

/// Serves one kind of request.
///
/// `process_request` runs on the I/O thread when the head arrives and picks
/// the consumer that will stream the body. `handle` runs once the body is
/// complete; it may fulfill the trigger synchronously, or keep it and fulfill
/// it later from any thread (the engine will not advance the response until
/// it fires).
pub trait ExchangeHandler: Send + Sync {
    /// What the request consumer distills the request into.
    type Output: Send + 'static;

    fn process_request(
        &self,
        request: &RequestHead,
    ) -> Result<Box<dyn RequestConsumer<Output = Self::Output>>, HttpError>;

    fn handle(&self, data: Self::Output, trigger: ResponseTrigger) -> Result<(), HttpError>;
}

/// Asynchronously decides the fate of an `Expect: 100-continue` announcement.
///
/// While the verifier deliberates, request input stays suspended. It must
/// eventually call exactly one of [`ExpectationTrigger::submit_continue`] or
/// [`ExpectationTrigger::submit_response`] (with a final status of `400` or
/// above); any other outcome is a protocol error.
pub trait ExpectationVerifier: Send + Sync {
    fn verify(&self, request: &RequestHead, trigger: ExpectationTrigger);
}

/// An [`ExchangeHandler`] built from a plain function over fully buffered
/// requests.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> ExchangeHandler for HandlerFn<F>
where
    F: Fn(Request<Bytes>, ResponseTrigger) -> Result<(), HttpError> + Send + Sync,
{
    type Output = Request<Bytes>;

    fn process_request(
        &self,
        _request: &RequestHead,
    ) -> Result<Box<dyn RequestConsumer<Output = Self::Output>>, HttpError> {
        Ok(Box::new(BasicRequestConsumer::new()))
    }

    fn handle(&self, data: Self::Output, trigger: ResponseTrigger) -> Result<(), HttpError> {
        (self.f)(data, trigger)
    }
}

/// Wraps a function into an [`ExchangeHandler`] that buffers each request
/// body and hands the whole `Request<Bytes>` to the function.
pub fn make_handler<F>(f: F) -> HandlerFn<F>
where
    F: Fn(Request<Bytes>, ResponseTrigger) -> Result<(), HttpError> + Send + Sync,
{
    HandlerFn { f }
}
