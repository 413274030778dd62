//! Collector: destination accumulating everything it receives.

use crate::error::StreamError;
use crate::pipeline::context::Context;
use crate::pipeline::driver::{drive, Outcome, Termination};
use crate::pipeline::lock;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Acceptor, Destination, DoneSignal};
use crossbeam_channel::Receiver;
use std::sync::Mutex;

/// Destination storing items and stage errors for inspection after a run.
pub struct Collector<T> {
    name: String,
    items: Mutex<Vec<T>>,
    errors: Mutex<Vec<StreamError>>,
    outcome: Mutex<Option<Outcome>>,
    /// Display text of the end marker that finished the run.
    end_trail: Mutex<Option<String>>,
    done: DoneSignal,
}

impl<T: Send> Collector<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            outcome: Mutex::new(None),
            end_trail: Mutex::new(None),
            done: DoneSignal::new(),
        }
    }

    pub fn items(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.items).clone()
    }

    pub fn take_items(&self) -> Vec<T> {
        std::mem::take(&mut *lock(&self.items))
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages of the stage errors received, in order.
    pub fn error_messages(&self) -> Vec<String> {
        lock(&self.errors).iter().map(ToString::to_string).collect()
    }

    pub fn take_errors(&self) -> Vec<StreamError> {
        std::mem::take(&mut *lock(&self.errors))
    }

    /// How the last run's accept loop ended, `None` while it has not.
    pub fn outcome(&self) -> Option<Outcome> {
        *lock(&self.outcome)
    }

    /// The end marker's context chain, e.g. `"double: numbers: end of input"`.
    pub fn end_trail(&self) -> Option<String> {
        lock(&self.end_trail).clone()
    }
}

impl<T: Send> Acceptor<T> for Collector<T> {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<T>>) {
        let termination = drive(&self.name, ctx, &upstream, |next| match next {
            Ok(item) => lock(&self.items).push(item),
            Err(err) => lock(&self.errors).push(err),
        });

        if let Termination::EndOfStream(marker) = &termination {
            *lock(&self.end_trail) = Some(marker.to_string());
        }
        *lock(&self.outcome) = Some(termination.outcome());
        self.done.fire();
    }
}

impl<T: Send> Destination<T> for Collector<T> {
    fn reset(&self) {
        lock(&self.items).clear();
        lock(&self.errors).clear();
        *lock(&self.outcome) = None;
        *lock(&self.end_trail) = None;
        self.done.reset();
    }

    fn done(&self) -> Receiver<()> {
        self.done.receiver()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
