//! MapStage: applies a function to every item.
//!
//! Failures of the function become stage errors on the output channel (or
//! abort the run, depending on the error policy). Upstream errors are passed
//! through untouched.

use crate::error::{StreamError, StreamResult};
use crate::pipeline::channel::OutputChannel;
use crate::pipeline::context::Context;
use crate::pipeline::driver::drive;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Acceptor, Emitter, Stage};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};

type MapFn<T> = dyn Fn(T) -> StreamResult<T> + Send + Sync;

/// Transform stage applying a (possibly fallible) function.
pub struct MapStage<T> {
    f: Box<MapFn<T>>,
    output: OutputChannel<T>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl<T: Send + 'static> MapStage<T> {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::fallible(name, move |item| Ok(f(item)))
    }

    pub fn fallible<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(T) -> StreamResult<T> + Send + Sync + 'static,
    {
        Self {
            f: Box::new(f),
            output: OutputChannel::unbounded(name),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.output = OutputChannel::new(self.output.name(), capacity);
        self
    }

    /// Items mapped successfully in the current (or last) run.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Items whose mapping failed in the current (or last) run.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn apply(&self, ctx: &Context, next: Result<T, StreamError>) -> Option<Message<T>> {
        let name = self.output.name();
        match next {
            Ok(item) => match (self.f)(item) {
                Ok(mapped) => {
                    self.processed.fetch_add(1, Ordering::Relaxed);
                    Some(Message::Item(mapped))
                }
                Err(err) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    ctx.report_error(name, err.with_context(name))
                        .map(Message::from_error)
                }
            },
            Err(err) => Some(Message::Error(err)),
        }
    }
}

impl<T: Send + 'static> Emitter<T> for MapStage<T> {
    fn output(&self) -> &OutputChannel<T> {
        &self.output
    }
}

impl<T: Send + 'static> Acceptor<T> for MapStage<T> {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<T>>) {
        let termination = drive(self.output.name(), ctx, &upstream, |next| {
            if let Some(msg) = self.apply(ctx, next) {
                // A refused send means cancellation; drive notices next turn.
                let _ = self.output.send_cancellable(ctx, msg);
            }
        });
        self.output.finish(termination);
    }
}

impl<T: Send + 'static> Stage<T> for MapStage<T> {
    fn reset(&self) {
        self.output.drain();
        self.processed.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}
