//! One-shot completion primitives shared by the exchange engines.
//!
//! Every exchange reports exactly one of {result, failure, cancellation} to
//! the application, no matter how many terminal events race (normal
//! completion, timeout, close, exception). [`BasicFuture`] is the enforcement
//! point: the first terminal transition wins and everything later is a no-op.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::protocol::{HttpError, ProtocolError};

/// An operation that can be cancelled cooperatively.
///
/// Connection teardown invokes the handle exactly once; cancelling an
/// already-terminal operation is a no-op.
pub trait Cancellable: Send {
    /// Attempts cancellation, returning true if this call was the terminal
    /// transition.
    fn cancel(&mut self) -> bool;
}

/// Observer notified when a future reaches its terminal state.
///
/// Invoked on whichever thread performed the terminal transition, at most
/// once per future, while the future's internal lock is held: a callback
/// must not call back into the same future.
pub trait FutureCallback<T>: Send {
    fn completed(&self, result: &T);

    fn failed(&self, error: &HttpError);

    fn cancelled(&self);
}

enum State<T> {
    Pending { callback: Option<Box<dyn FutureCallback<T>>> },
    Completed(Option<T>),
    Failed(Option<HttpError>),
    Cancelled,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    done: Condvar,
}

/// A shareable exactly-once exchange result.
///
/// The engine holds one clone to deliver the outcome; the application holds
/// another and either blocks on [`get`](BasicFuture::get) or registers a
/// [`FutureCallback`] at construction time. Among `complete`, `fail` and
/// `cancel`, only the first call has any effect.
pub struct BasicFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BasicFuture<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T> std::fmt::Debug for BasicFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicFuture").field("done", &self.is_done()).finish()
    }
}

impl<T> BasicFuture<T> {
    pub fn new() -> Self {
        Self { shared: Arc::new(Shared { state: Mutex::new(State::Pending { callback: None }), done: Condvar::new() }) }
    }

    pub fn with_callback(callback: impl FutureCallback<T> + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending { callback: Some(Box::new(callback)) }),
                done: Condvar::new(),
            }),
        }
    }

    /// Delivers the result. Returns true if this call was the terminal
    /// transition.
    pub fn complete(&self, result: T) -> bool {
        let callback = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callback } => {
                    let callback = callback.take();
                    if let Some(cb) = &callback {
                        cb.completed(&result);
                    }
                    *state = State::Completed(Some(result));
                    callback
                }
                _ => return false,
            }
        };
        drop(callback);
        self.shared.done.notify_all();
        true
    }

    /// Delivers a failure. Returns true if this call was the terminal
    /// transition.
    pub fn fail(&self, error: HttpError) -> bool {
        let callback = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callback } => {
                    let callback = callback.take();
                    if let Some(cb) = &callback {
                        cb.failed(&error);
                    }
                    *state = State::Failed(Some(error));
                    callback
                }
                _ => return false,
            }
        };
        drop(callback);
        self.shared.done.notify_all();
        true
    }

    /// Cancels the exchange. Cancellation after completion is a no-op.
    pub fn cancel(&self) -> bool {
        let callback = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending { callback } => {
                    let callback = callback.take();
                    if let Some(cb) = &callback {
                        cb.cancelled();
                    }
                    *state = State::Cancelled;
                    callback
                }
                _ => return false,
            }
        };
        drop(callback);
        self.shared.done.notify_all();
        true
    }

    pub fn is_done(&self) -> bool {
        !matches!(&*self.shared.state.lock(), State::Pending { .. })
    }

    /// Blocks until the terminal state and takes the outcome.
    ///
    /// Only one caller can obtain the result; racing `get` calls after the
    /// first observe an invalid-state error.
    pub fn get(self) -> Result<T, HttpError> {
        let mut state = self.shared.state.lock();
        while matches!(&*state, State::Pending { .. }) {
            self.shared.done.wait(&mut state);
        }
        Self::take_outcome(&mut state)
    }

    /// Like [`get`](BasicFuture::get) but gives up after `timeout`, reporting
    /// [`HttpError::Timeout`].
    pub fn get_timeout(self, timeout: Duration) -> Result<T, HttpError> {
        let mut state = self.shared.state.lock();
        let deadline = std::time::Instant::now() + timeout;
        while matches!(&*state, State::Pending { .. }) {
            if self.shared.done.wait_until(&mut state, deadline).timed_out() {
                return Err(HttpError::Timeout);
            }
        }
        Self::take_outcome(&mut state)
    }

    fn take_outcome(state: &mut State<T>) -> Result<T, HttpError> {
        match state {
            State::Completed(result) => result
                .take()
                .ok_or_else(|| ProtocolError::invalid_state("exchange result already taken").into()),
            State::Failed(error) => {
                Err(error.take().unwrap_or_else(|| ProtocolError::invalid_state("exchange failure already taken").into()))
            }
            State::Cancelled => Err(HttpError::Cancelled),
            State::Pending { .. } => unreachable!("waited for terminal state"),
        }
    }
}

impl<T> Default for BasicFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Cancellable for BasicFuture<T> {
    fn cancel(&mut self) -> bool {
        BasicFuture::cancel(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_terminal_transition_wins() {
        let future = BasicFuture::<u32>::new();
        assert!(future.complete(7));
        assert!(!future.fail(HttpError::Timeout));
        assert!(!future.cancel());
        assert!(future.is_done());
        assert_eq!(future.get().unwrap(), 7);
    }

    #[test]
    fn test_failure_reaches_getter() {
        let future = BasicFuture::<u32>::new();
        assert!(future.fail(HttpError::Timeout));
        assert!(matches!(future.get(), Err(HttpError::Timeout)));
    }

    #[test]
    fn test_cancel_after_completion_is_noop() {
        let future = BasicFuture::<u32>::new();
        future.complete(1);
        assert!(!future.cancel());
        assert_eq!(future.get().unwrap(), 1);
    }

    #[test]
    fn test_get_timeout_on_pending() {
        let future = BasicFuture::<u32>::new();
        let err = future.clone().get_timeout(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, HttpError::Timeout));
    }

    #[test]
    fn test_get_blocks_until_completed_from_another_thread() {
        let future = BasicFuture::<String>::new();
        let completer = future.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            completer.complete("done".to_string());
        });
        assert_eq!(future.get().unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn test_racing_terminal_events_deliver_exactly_once() {
        struct Counting(Arc<AtomicUsize>);
        impl FutureCallback<u32> for Counting {
            fn completed(&self, _result: &u32) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn failed(&self, _error: &HttpError) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn cancelled(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        for _ in 0..32 {
            let invocations = Arc::new(AtomicUsize::new(0));
            let future = BasicFuture::<u32>::with_callback(Counting(invocations.clone()));

            let mut handles = Vec::new();
            for i in 0..4u32 {
                let f = future.clone();
                handles.push(std::thread::spawn(move || match i {
                    0 => f.complete(i),
                    1 => f.fail(HttpError::Timeout),
                    _ => f.cancel(),
                }));
            }
            let wins: usize = handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum();
            assert_eq!(wins, 1);
            assert_eq!(invocations.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_cancellable_impl() {
        let mut future = BasicFuture::<u32>::new();
        assert!(Cancellable::cancel(&mut future));
        assert!(matches!(future.get(), Err(HttpError::Cancelled)));
    }
}
