//! IterSource: emits a fixed list of items, optionally paced.

use crate::pipeline::channel::OutputChannel;
use crate::pipeline::context::Context;
use crate::pipeline::driver::Termination;
use crate::pipeline::lock;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Emitter, Source};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Source replaying the same items on every run.
pub struct IterSource<T> {
    items: Mutex<Vec<T>>,
    /// Pause before each item.
    interval: Option<Duration>,
    output: OutputChannel<T>,
    emitted: AtomicU64,
}

impl<T: Clone + Send> IterSource<T> {
    pub fn new(name: impl Into<String>, items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Mutex::new(items.into_iter().collect()),
            interval: None,
            output: OutputChannel::unbounded(name),
            emitted: AtomicU64::new(0),
        }
    }

    /// Rebuild the output channel with the given capacity.
    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.output = OutputChannel::new(self.output.name(), capacity);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Replace the items used by the next run.
    pub fn set_items(&self, items: impl IntoIterator<Item = T>) {
        *lock(&self.items) = items.into_iter().collect();
    }

    /// Items emitted by the current (or last) run.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    fn stop_cancelled(&self) {
        tracing::debug!(
            stage = self.output.name(),
            emitted = self.emitted(),
            "source cancelled"
        );
        self.output.finish(Termination::Cancelled);
    }
}

impl<T: Clone + Send> Emitter<T> for IterSource<T> {
    fn output(&self) -> &OutputChannel<T> {
        &self.output
    }
}

impl<T: Clone + Send> Source<T> for IterSource<T> {
    fn start(&self, ctx: &Context) {
        let items = lock(&self.items).clone();
        for item in items {
            if let Some(interval) = self.interval {
                if ctx.sleep(interval).is_err() {
                    return self.stop_cancelled();
                }
            }
            if self
                .output
                .send_cancellable(ctx, Message::Item(item))
                .is_err()
            {
                return self.stop_cancelled();
            }
            self.emitted.fetch_add(1, Ordering::Relaxed);
        }

        let end = Message::end_mark(self.output.name());
        if self.output.send_cancellable(ctx, end).is_err() {
            self.stop_cancelled();
        }
    }

    fn reset(&self) {
        self.output.drain();
        self.emitted.store(0, Ordering::Relaxed);
    }
}
