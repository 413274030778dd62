//! Cooperative cancellation shared by every task of a run.
//!
//! A [`Context`] is cheap to clone. Cancelling it closes an internal crossbeam
//! channel, so stages can wait on [`Context::done`] next to their data channel
//! inside `crossbeam_channel::select!`. Child contexts are cancelled together
//! with their parent but can also be cancelled on their own.

use crate::config::ErrorPolicy;
use crate::error::StreamError;
use crate::pipeline::lock;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;

/// Returned by blocking helpers that gave up because the context was cancelled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

struct ContextState {
    cancelled: AtomicBool,
    /// Dropped on cancel, which disconnects `done_rx`.
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
    reason: Mutex<Option<String>>,
    children: Mutex<Vec<Weak<ContextState>>>,
    error_policy: ErrorPolicy,
    /// First error recorded under `ErrorPolicy::Abort`.
    aborted: Mutex<Option<(String, StreamError)>>,
}

impl ContextState {
    fn new(error_policy: ErrorPolicy) -> Self {
        let (done_tx, done_rx) = bounded(0);
        Self {
            cancelled: AtomicBool::new(false),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            error_policy,
            aborted: Mutex::new(None),
        }
    }

    fn cancel(&self, reason: Option<String>) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(reason) = reason {
            *lock(&self.reason) = Some(reason);
        }
        lock(&self.done_tx).take();

        let children = std::mem::take(&mut *lock(&self.children));
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(Some("parent context cancelled".to_string()));
        }
    }
}

/// Cancellation signal threaded through `Source::start` and every `accept`.
#[derive(Clone)]
pub struct Context {
    state: Arc<ContextState>,
}

impl Context {
    /// A fresh, uncancelled root context.
    pub fn new() -> Self {
        Self::with_error_policy(ErrorPolicy::default())
    }

    /// A root context carrying the given stage error policy.
    pub fn with_error_policy(error_policy: ErrorPolicy) -> Self {
        Self {
            state: Arc::new(ContextState::new(error_policy)),
        }
    }

    /// A context cancelled whenever `self` is, with the same error policy.
    pub fn child(&self) -> Self {
        self.child_with_policy(self.state.error_policy)
    }

    /// Like [`child`](Self::child), overriding the error policy.
    pub fn child_with_policy(&self, error_policy: ErrorPolicy) -> Self {
        let child = Arc::new(ContextState::new(error_policy));
        {
            let mut children = lock(&self.state.children);
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // Parent may have been cancelled before the child was registered.
        if self.is_cancelled() {
            child.cancel(Some("parent context cancelled".to_string()));
        }
        Self { state: child }
    }

    /// Cancel this context and all of its children. Idempotent.
    pub fn cancel(&self) {
        self.state.cancel(None);
    }

    /// Cancel, recording why. Only the first reason is kept.
    pub fn cancel_with_reason(&self, reason: impl Into<String>) {
        self.state.cancel(Some(reason.into()));
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel_reason(&self) -> Option<String> {
        lock(&self.state.reason).clone()
    }

    /// Receiver that never yields a value and disconnects once cancelled.
    pub fn done(&self) -> &Receiver<()> {
        &self.state.done_rx
    }

    /// Block until the context is cancelled.
    pub fn wait(&self) {
        let _ = self.state.done_rx.recv();
    }

    /// Sleep for `duration`, waking early if cancelled.
    pub fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        match self.state.done_rx.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            _ => Err(Cancelled),
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.state.error_policy
    }

    /// Route a stage error according to the error policy.
    ///
    /// Under [`ErrorPolicy::Forward`] the error is handed back for the stage to
    /// send downstream. Under [`ErrorPolicy::Abort`] it is recorded (first one
    /// wins), the context is cancelled and `None` is returned.
    pub fn report_error(&self, stage: &str, err: StreamError) -> Option<StreamError> {
        match self.state.error_policy {
            ErrorPolicy::Forward => Some(err),
            ErrorPolicy::Abort => {
                {
                    let mut aborted = lock(&self.state.aborted);
                    if aborted.is_none() {
                        tracing::warn!(stage, error = %err, "stage error aborts the run");
                        *aborted = Some((stage.to_string(), err));
                    }
                }
                self.cancel_with_reason(format!("aborted by stage '{stage}'"));
                None
            }
        }
    }

    /// Whether a stage aborted this context.
    pub fn is_aborted(&self) -> bool {
        lock(&self.state.aborted).is_some()
    }

    pub(crate) fn take_abort(&self) -> Option<(String, StreamError)> {
        lock(&self.state.aborted).take()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.is_cancelled())
            .field("error_policy", &self.state.error_policy)
            .finish()
    }
}
