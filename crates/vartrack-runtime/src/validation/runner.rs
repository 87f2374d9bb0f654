#![forbid(unsafe_code)]

//! Skippable asynchronous validation runs.
//!
//! # Design
//!
//! [`ValidationRunner::begin`] evaluates nothing itself: the caller hands
//! over the synchronous pre-check result together with the input for the
//! asynchronous callbacks. When no asynchronous callbacks exist the run
//! finishes on the spot. Otherwise the request is parked as *pending* and
//! driven by [`ValidationRunner::settle`].
//!
//! # Invariants
//!
//! 1. At most one asynchronous run is in flight per runner.
//! 2. A new request never aborts the in-flight run; it waits for it.
//! 3. Requests made while a run is in flight coalesce: only the latest
//!    pending request runs next.
//! 4. The finished result is the synchronous and asynchronous results
//!    merged, never one of them alone.
//!
//! # Failure Modes
//!
//! - **Undriven runs**: nothing executes asynchronous callbacks unless some
//!   caller awaits `settle()`. `is_busy()` stays true until then.
//! - **Panicking callbacks** unwind through whoever polls `settle()`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};
use tracing::trace;
use vartrack_core::{ValidationResult, ValidatorFinishMode};

use super::action::AsyncValidationAction;

/// Receives the result of a finished run.
pub type FinishFn = Rc<dyn Fn(Option<ValidationResult>, ValidatorFinishMode)>;

type RunFuture = Shared<LocalBoxFuture<'static, ()>>;

struct PendingRun<T> {
    input: T,
    sync_result: Option<ValidationResult>,
    finish: FinishFn,
}

struct RunnerState<T> {
    pending: Option<PendingRun<T>>,
    in_flight: Option<RunFuture>,
    completed_runs: u64,
}

/// Coalescing driver for asynchronous validation callbacks.
pub struct ValidationRunner<T> {
    state: Rc<RefCell<RunnerState<T>>>,
    action: AsyncValidationAction<T>,
    always_finish_sync: bool,
}

impl<T> fmt::Debug for ValidationRunner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ValidationRunner")
            .field("pending", &state.pending.is_some())
            .field("in_flight", &state.in_flight.is_some())
            .field("completed_runs", &state.completed_runs)
            .field("always_finish_sync", &self.always_finish_sync)
            .finish()
    }
}

impl<T: Clone + 'static> ValidationRunner<T> {
    /// Create a runner for `action`.
    #[must_use]
    pub fn new(action: AsyncValidationAction<T>, always_finish_sync: bool) -> Self {
        Self {
            state: Rc::new(RefCell::new(RunnerState {
                pending: None,
                in_flight: None,
                completed_runs: 0,
            })),
            action,
            always_finish_sync,
        }
    }

    /// Whether asynchronous callbacks are configured.
    #[must_use]
    pub fn has_async(&self) -> bool {
        !self.action.is_empty()
    }

    /// Whether a run is in flight or pending.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        let state = self.state.borrow();
        state.pending.is_some() || state.in_flight.is_some()
    }

    /// Number of asynchronous runs that have finished.
    #[must_use]
    pub fn completed_runs(&self) -> u64 {
        self.state.borrow().completed_runs
    }

    /// Start a validation request.
    pub fn begin(&self, input: T, sync_result: Option<ValidationResult>, finish: FinishFn) {
        if self.action.is_empty() {
            finish(sync_result, ValidatorFinishMode::Sync);
            return;
        }

        if self.always_finish_sync {
            finish(sync_result.clone(), ValidatorFinishMode::Sync);
        }

        let superseded = self
            .state
            .borrow_mut()
            .pending
            .replace(PendingRun {
                input,
                sync_result,
                finish,
            })
            .is_some();
        if superseded {
            trace!("pending validation superseded by a newer request");
        }
    }

    /// Drive runs until nothing is in flight or pending.
    pub fn settle(&self) -> LocalBoxFuture<'static, ()> {
        let state = Rc::clone(&self.state);
        let action = self.action.clone();
        async move {
            loop {
                let current = state.borrow().in_flight.clone();
                if let Some(run) = current {
                    run.await;
                    continue;
                }

                let next = state.borrow_mut().pending.take();
                let Some(next) = next else {
                    break;
                };
                let run = Self::start(&state, &action, next);
                state.borrow_mut().in_flight = Some(run.clone());
                run.await;
            }
        }
        .boxed_local()
    }

    /// Drop pending work. An in-flight run still finishes if polled.
    pub fn clear(&self) {
        let mut state = self.state.borrow_mut();
        state.pending = None;
        state.in_flight = None;
    }

    fn start(
        state: &Rc<RefCell<RunnerState<T>>>,
        action: &AsyncValidationAction<T>,
        run: PendingRun<T>,
    ) -> RunFuture {
        let weak = Rc::downgrade(state);
        let async_result = action.run(run.input);
        async move {
            let async_result = async_result.await;
            if let Some(state) = weak.upgrade() {
                let mut state = state.borrow_mut();
                state.in_flight = None;
                state.completed_runs += 1;
            }
            let combined = ValidationResult::combine(run.sync_result, async_result);
            (run.finish)(combined, ValidatorFinishMode::Async);
        }
        .boxed_local()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use futures::executor::block_on;
    use futures::task::{Context, noop_waker_ref};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::task::Poll;

    type Log = Rc<RefCell<Vec<(Option<ValidationResult>, ValidatorFinishMode)>>>;

    fn recorder() -> (Log, FinishFn) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let finish: FinishFn = Rc::new(move |result, mode| log_clone.borrow_mut().push((result, mode)));
        (log, finish)
    }

    fn echo_action() -> AsyncValidationAction<u32> {
        AsyncValidationAction::new()
            .with(|v| async move { Some(ValidationResult::from_errors([format!("ASYNC_{v}")])) }.boxed_local())
    }

    #[test]
    fn without_async_callbacks_finishes_immediately() {
        let runner = ValidationRunner::<u32>::new(AsyncValidationAction::new(), false);
        let (log, finish) = recorder();

        runner.begin(1, Some(ValidationResult::from_errors(["SYNC"])), finish);

        assert!(!runner.is_busy());
        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, ValidatorFinishMode::Sync);
    }

    #[test]
    fn sync_result_is_surfaced_first_when_requested() {
        let runner = ValidationRunner::new(echo_action(), true);
        let (log, finish) = recorder();

        runner.begin(3, Some(ValidationResult::from_errors(["SYNC"])), finish);
        assert_eq!(log.borrow().len(), 1);
        assert!(runner.is_busy());

        block_on(runner.settle());
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].1, ValidatorFinishMode::Async);
        assert_eq!(log[1].0.as_ref().unwrap().errors(), ["SYNC", "ASYNC_3"]);
        assert!(!runner.is_busy());
    }

    #[test]
    fn pending_requests_coalesce() {
        let runner = ValidationRunner::new(echo_action(), false);
        let (log, finish) = recorder();

        runner.begin(1, None, Rc::clone(&finish));
        runner.begin(2, None, finish);
        block_on(runner.settle());

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0.as_ref().unwrap().errors(), ["ASYNC_2"]);
        assert_eq!(runner.completed_runs(), 1);
    }

    #[test]
    fn in_flight_run_is_awaited_not_aborted() {
        let gates: Rc<RefCell<VecDeque<oneshot::Receiver<()>>>> = Rc::default();
        let gates_clone = Rc::clone(&gates);
        let action = AsyncValidationAction::new().with(move |v: u32| {
            let gate = gates_clone.borrow_mut().pop_front();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Some(ValidationResult::from_errors([format!("RUN_{v}")]))
            }
            .boxed_local()
        });
        let runner = ValidationRunner::new(action, false);
        let (log, finish) = recorder();

        let (first_tx, first_rx) = oneshot::channel();
        gates.borrow_mut().push_back(first_rx);
        runner.begin(1, None, Rc::clone(&finish));

        let mut settle = runner.settle();
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(matches!(settle.poll_unpin(&mut cx), Poll::Pending));

        runner.begin(2, None, finish);
        assert!(runner.is_busy());
        assert!(log.borrow().is_empty());

        first_tx.send(()).unwrap();
        block_on(settle);

        let errors: Vec<_> = log
            .borrow()
            .iter()
            .map(|(result, _)| result.as_ref().unwrap().errors()[0].clone())
            .collect();
        assert_eq!(errors, vec!["RUN_1", "RUN_2"]);
        assert_eq!(runner.completed_runs(), 2);
    }
}
