use std::sync::Arc;

use tracing::trace;

use crate::handler::ExchangeHandler;
use crate::protocol::{HttpError, ProtocolError, RequestHead};

/// Maps request URIs to exchange handlers.
///
/// Patterns follow `matchit` syntax: literal segments, `{param}` captures and
/// `{*rest}` catch-alls. A default handler, when set, serves everything no
/// pattern matches.
pub struct HandlerRegistry<T> {
    router: matchit::Router<Arc<dyn ExchangeHandler<Output = T>>>,
    default: Option<Arc<dyn ExchangeHandler<Output = T>>>,
}

impl<T: Send + 'static> HandlerRegistry<T> {
    pub fn new() -> Self {
        Self { router: matchit::Router::new(), default: None }
    }

    pub fn register(
        &mut self,
        pattern: &str,
        handler: impl ExchangeHandler<Output = T> + 'static,
    ) -> Result<(), HttpError> {
        self.router
            .insert(pattern, Arc::new(handler))
            .map_err(|e| ProtocolError::invalid_state(format!("invalid handler pattern {pattern}: {e}")).into())
    }

    pub fn set_default(&mut self, handler: impl ExchangeHandler<Output = T> + 'static) {
        self.default = Some(Arc::new(handler));
    }

    /// Looks up the handler for a request, falling back to the default.
    pub fn resolve(&self, request: &RequestHead) -> Option<Arc<dyn ExchangeHandler<Output = T>>> {
        let path = request.uri().path();
        match self.router.at(path) {
            Ok(matched) => {
                trace!(path = path, "handler resolved");
                Some(Arc::clone(matched.value))
            }
            Err(_) => self.default.clone(),
        }
    }
}

impl<T: Send + 'static> Default for HandlerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for HandlerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").field("has_default", &self.default.is_some()).finish_non_exhaustive()
    }
}
