use crate::protocol::{HttpError, RequestHead, ResponseHead};

/// Applies cross-cutting header transformations to outgoing and incoming
/// messages.
///
/// The processor is invoked before every request is dispatched and before
/// every response is committed, on both the client and the server side.
/// Interceptor chains (dates, user agents, content negotiation) live behind
/// this trait and are supplied by the embedding application.
pub trait HttpProcessor: Send + Sync {
    fn process_request(&self, request: &mut RequestHead) -> Result<(), HttpError>;

    fn process_response(&self, response: &mut ResponseHead) -> Result<(), HttpError>;
}

/// The identity processor: leaves every message untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughProcessor;

impl HttpProcessor for PassthroughProcessor {
    fn process_request(&self, _request: &mut RequestHead) -> Result<(), HttpError> {
        Ok(())
    }

    fn process_response(&self, _response: &mut ResponseHead) -> Result<(), HttpError> {
        Ok(())
    }
}
