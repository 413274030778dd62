//! FilterStage: keeps items matching a predicate.
//!
//! In invert mode the predicate selects the items to drop instead. Errors and
//! the end marker always pass.

use crate::pipeline::channel::OutputChannel;
use crate::pipeline::context::Context;
use crate::pipeline::driver::drive;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Acceptor, Emitter, Stage};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};

type Predicate<T> = dyn Fn(&T) -> bool + Send + Sync;

/// Filter stage over a predicate.
pub struct FilterStage<T> {
    predicate: Box<Predicate<T>>,
    /// Invert mode: drop matching items instead of keeping them.
    invert_mode: bool,
    output: OutputChannel<T>,
    passed: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Send + 'static> FilterStage<T> {
    pub fn new<P>(name: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            invert_mode: false,
            output: OutputChannel::unbounded(name),
            passed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert_mode = true;
        self
    }

    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.output = OutputChannel::new(self.output.name(), capacity);
        self
    }

    pub fn invert_mode(&self) -> bool {
        self.invert_mode
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn keeps(&self, item: &T) -> bool {
        // Pass if: (match AND !invert) OR (!match AND invert)
        (self.predicate)(item) != self.invert_mode
    }
}

impl<T: Send + 'static> Emitter<T> for FilterStage<T> {
    fn output(&self) -> &OutputChannel<T> {
        &self.output
    }
}

impl<T: Send + 'static> Acceptor<T> for FilterStage<T> {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<T>>) {
        let termination = drive(self.output.name(), ctx, &upstream, |next| {
            let msg = match next {
                Ok(item) if self.keeps(&item) => {
                    self.passed.fetch_add(1, Ordering::Relaxed);
                    Message::Item(item)
                }
                Ok(_) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(err) => Message::Error(err),
            };
            let _ = self.output.send_cancellable(ctx, msg);
        });

        if self.dropped() > 0 {
            tracing::debug!(
                stage = self.output.name(),
                passed = self.passed(),
                dropped = self.dropped(),
                "filter finished"
            );
        }
        self.output.finish(termination);
    }
}

impl<T: Send + 'static> Stage<T> for FilterStage<T> {
    fn reset(&self) {
        self.output.drain();
        self.passed.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
    }
}
