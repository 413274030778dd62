//! Stage abstractions for the pipeline.
//!
//! Three families of stages plug into a [`Pipeline`](crate::pipeline::Pipeline):
//! - **[`Source`]** produces items into its own output channel.
//! - **[`Stage`]** (transform) accepts from upstream and emits to its own output.
//! - **[`Destination`]** accepts from upstream and signals completion.
//!
//! All methods take `&self`: a stage is shared with the thread running it, so
//! per-run state lives behind interior mutability.

use crate::pipeline::channel::OutputChannel;
use crate::pipeline::context::Context;
use crate::pipeline::lock;
use crate::pipeline::message::Message;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Anything that owns an output channel the next link can read from.
pub trait Emitter<T>: Send + Sync {
    fn output(&self) -> &OutputChannel<T>;

    fn name<'a>(&'a self) -> &'a str
    where
        T: 'a,
    {
        self.output().name()
    }
}

/// Originates items.
pub trait Source<T>: Emitter<T> {
    /// Produce items and finally an end marker into [`Emitter::output`].
    ///
    /// Runs on its own thread. On cancellation it must stop promptly and
    /// still leave the downstream link able to finish.
    fn start(&self, ctx: &Context);

    /// Called once per run, before anything is wired.
    fn reset(&self) {}
}

/// The consume-from-upstream capability shared by transforms and destinations.
pub trait Acceptor<T>: Send + Sync {
    /// Read `upstream` until the end marker or cancellation. Runs on its own thread.
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<T>>);
}

/// Transform stage: accepts, processes and forwards.
pub trait Stage<T>: Acceptor<T> + Emitter<T> {
    /// Called once per run, before anything is wired.
    fn reset(&self) {}
}

/// Terminal stage.
pub trait Destination<T>: Acceptor<T> {
    /// Clear state left over from a previous run. Must not block.
    fn reset(&self);

    /// Completion signal, fired exactly once per run after `accept` has seen
    /// the end marker or cancellation.
    fn done(&self) -> Receiver<()>;

    fn name(&self) -> &str {
        "destination"
    }
}

/// Fire-once-per-run completion signal for [`Destination`] implementations.
///
/// [`reset`](Self::reset) arms a fresh signal; [`receiver`](Self::receiver)
/// must be taken after the reset of the run it should observe.
pub struct DoneSignal {
    channel: Mutex<(Sender<()>, Receiver<()>)>,
    fired: AtomicBool,
}

impl DoneSignal {
    pub fn new() -> Self {
        Self {
            channel: Mutex::new(bounded(1)),
            fired: AtomicBool::new(false),
        }
    }

    /// Arm a fresh signal for the next run.
    pub fn reset(&self) {
        *lock(&self.channel) = bounded(1);
        self.fired.store(false, Ordering::Release);
    }

    /// Fire the signal. Returns false if it had already fired this run.
    pub fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            tracing::warn!("completion signal fired twice in one run");
            return false;
        }
        let tx = lock(&self.channel).0.clone();
        // Capacity 1 and a single fire per run: never full.
        let _ = tx.try_send(());
        true
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub fn receiver(&self) -> Receiver<()> {
        lock(&self.channel).1.clone()
    }
}

impl Default for DoneSignal {
    fn default() -> Self {
        Self::new()
    }
}
