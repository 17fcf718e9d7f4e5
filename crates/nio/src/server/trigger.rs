use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::concurrent::Cancellable;
use crate::connection::IoControl;
use crate::entity::ResponseProducer;
use crate::protocol::{HttpError, ProtocolError};

/// What a handler eventually hands back through its trigger.
pub(crate) enum Submission {
    Response(Box<dyn ResponseProducer>),
    Failure(HttpError),
}

/// Shared state between a [`ResponseTrigger`] held by the application (on any
/// thread) and the engine polling it from the I/O thread.
///
/// The `fired` flag enforces the exactly-once contract; the engine drains the
/// slot when the connection becomes writable.
pub(crate) struct TriggerShared {
    io: Arc<dyn IoControl>,
    fired: AtomicBool,
    closed: AtomicBool,
    slot: Mutex<Option<Submission>>,
    cancel_hook: Mutex<Option<Box<dyn Cancellable>>>,
}

impl TriggerShared {
    pub(crate) fn new(io: Arc<dyn IoControl>) -> Arc<Self> {
        Arc::new(Self {
            io,
            fired: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            slot: Mutex::new(None),
            cancel_hook: Mutex::new(None),
        })
    }

    /// A trigger that is already fulfilled, used for responses the engine
    /// itself generates (rejected expectations).
    pub(crate) fn prefired(io: Arc<dyn IoControl>, producer: Box<dyn ResponseProducer>) -> Arc<Self> {
        let shared = Self::new(io);
        shared.fired.store(true, Ordering::SeqCst);
        *shared.slot.lock() = Some(Submission::Response(producer));
        shared
    }

    fn submit(&self, submission: Submission) -> Result<(), HttpError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(HttpError::Cancelled);
        }
        if self.fired.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::invalid_state("response already submitted for this exchange").into());
        }
        *self.slot.lock() = Some(submission);
        self.io.request_output();
        Ok(())
    }

    pub(crate) fn take_submission(&self) -> Option<Submission> {
        self.slot.lock().take()
    }

    /// Invoked on connection teardown: cancels the pending work exactly once
    /// and makes every later submission fail.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut hook) = self.cancel_hook.lock().take() {
            hook.cancel();
        }
        self.slot.lock().take();
    }
}

/// One-shot deferred-response handle given to an exchange handler.
///
/// A handler that cannot answer synchronously keeps the trigger (it is `Send`
/// and may travel to a worker thread) and fulfills it later. Exactly one of
/// [`submit_response`](ResponseTrigger::submit_response) or
/// [`fail`](ResponseTrigger::fail) may ever succeed; the second invocation is
/// an error, enforced by an atomic flag rather than convention.
pub struct ResponseTrigger {
    shared: Arc<TriggerShared>,
}

impl ResponseTrigger {
    pub(crate) fn from_shared(shared: Arc<TriggerShared>) -> Self {
        Self { shared }
    }

    /// Hands the response to the engine and wakes the connection for output.
    pub fn submit_response(&self, producer: Box<dyn ResponseProducer>) -> Result<(), HttpError> {
        self.shared.submit(Submission::Response(producer))
    }

    /// Reports that the handler failed; the engine turns this into a `500`
    /// when the response head is still uncommitted.
    pub fn fail(&self, error: HttpError) -> Result<(), HttpError> {
        self.shared.submit(Submission::Failure(error))
    }

    /// Registers cleanup to run if the connection goes away before the
    /// trigger fires. Invoked at most once.
    pub fn set_callback(&self, cancellable: Box<dyn Cancellable>) {
        if self.shared.closed.load(Ordering::SeqCst) {
            let mut cancellable = cancellable;
            cancellable.cancel();
            return;
        }
        *self.shared.cancel_hook.lock() = Some(cancellable);
    }
}

impl std::fmt::Debug for ResponseTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseTrigger")
            .field("fired", &self.shared.fired.load(Ordering::SeqCst))
            .field("closed", &self.shared.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// The verdict an expectation verifier reaches about one request.
pub(crate) enum Verdict {
    Continue,
    Reject(Box<dyn ResponseProducer>),
}

pub(crate) struct VerdictShared {
    io: Arc<dyn IoControl>,
    fired: AtomicBool,
    slot: Mutex<Option<Verdict>>,
}

impl VerdictShared {
    pub(crate) fn new(io: Arc<dyn IoControl>) -> Arc<Self> {
        Arc::new(Self { io, fired: AtomicBool::new(false), slot: Mutex::new(None) })
    }

    fn submit(&self, verdict: Verdict) -> Result<(), HttpError> {
        if self.fired.swap(true, Ordering::SeqCst) {
            return Err(ProtocolError::invalid_state("expectation verdict already delivered").into());
        }
        *self.slot.lock() = Some(verdict);
        self.io.request_output();
        Ok(())
    }

    pub(crate) fn take_verdict(&self) -> Option<Verdict> {
        self.slot.lock().take()
    }
}

/// One-shot handle given to an expectation verifier.
///
/// The verifier must eventually deliver exactly one verdict: permission to
/// continue (the engine answers `100 Continue` and resumes input) or a final
/// error response with a status of `400` or above.
pub struct ExpectationTrigger {
    shared: Arc<VerdictShared>,
}

impl ExpectationTrigger {
    pub(crate) fn from_shared(shared: Arc<VerdictShared>) -> Self {
        Self { shared }
    }

    /// Lets the announced request body through.
    pub fn submit_continue(&self) -> Result<(), HttpError> {
        self.shared.submit(Verdict::Continue)
    }

    /// Rejects the expectation with a final response (status `>= 400`).
    pub fn submit_response(&self, producer: Box<dyn ResponseProducer>) -> Result<(), HttpError> {
        self.shared.submit(Verdict::Reject(producer))
    }
}

impl std::fmt::Debug for ExpectationTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectationTrigger").field("fired", &self.shared.fired.load(Ordering::SeqCst)).finish()
    }
}
