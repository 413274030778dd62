//! Recording stages for observing the orchestrator

use pipewright::{
    drive, Acceptor, Context, Destination, DoneSignal, Emitter, Message, OutputChannel, Source,
    Stage,
};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Shared, ordered log of lifecycle events.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Source logging its lifecycle and emitting fixed items.
pub struct RecordingSource {
    log: EventLog,
    items: Vec<i32>,
    output: OutputChannel<i32>,
}

impl RecordingSource {
    pub fn new(log: EventLog, items: Vec<i32>) -> Self {
        Self {
            log,
            items,
            output: OutputChannel::unbounded("source"),
        }
    }
}

impl Emitter<i32> for RecordingSource {
    fn output(&self) -> &OutputChannel<i32> {
        &self.output
    }
}

impl Source<i32> for RecordingSource {
    fn start(&self, ctx: &Context) {
        self.log.push("source:start");
        for &item in &self.items {
            if self.output.send_cancellable(ctx, Message::Item(item)).is_err() {
                self.output.try_send_end_mark("source: cancelled");
                return;
            }
        }
        self.output.send_end_mark("source");
    }

    fn reset(&self) {
        self.log.push("source:reset");
        self.output.drain();
    }
}

/// Passthrough stage logging its lifecycle.
pub struct RecordingStage {
    log: EventLog,
    output: OutputChannel<i32>,
}

impl RecordingStage {
    pub fn new(name: String, log: EventLog) -> Self {
        Self {
            log,
            output: OutputChannel::unbounded(name),
        }
    }
}

impl Emitter<i32> for RecordingStage {
    fn output(&self) -> &OutputChannel<i32> {
        &self.output
    }
}

impl Acceptor<i32> for RecordingStage {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<i32>>) {
        self.log.push(format!("{}:accept", self.output.name()));
        let termination = drive(self.output.name(), ctx, &upstream, |next| {
            let _ = self.output.send_cancellable(ctx, next.map_or_else(Message::Error, Message::Item));
        });
        self.output.finish(termination);
    }
}

impl Stage<i32> for RecordingStage {
    fn reset(&self) {
        self.log.push(format!("{}:reset", self.output.name()));
        self.output.drain();
    }
}

/// Destination logging its lifecycle and counting accept calls.
pub struct RecordingDestination {
    log: EventLog,
    items: Mutex<Vec<i32>>,
    accepts: AtomicUsize,
    resets: AtomicUsize,
    done: DoneSignal,
}

impl RecordingDestination {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            items: Mutex::new(Vec::new()),
            accepts: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            done: DoneSignal::new(),
        }
    }

    pub fn items(&self) -> Vec<i32> {
        self.items.lock().unwrap().clone()
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Acceptor<i32> for RecordingDestination {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<i32>>) {
        self.accepts.fetch_add(1, Ordering::SeqCst);
        self.log.push("destination:accept");
        drive("destination", ctx, &upstream, |next| {
            if let Ok(item) = next {
                self.items.lock().unwrap().push(item);
            }
        });
        self.done.fire();
    }
}

impl Destination<i32> for RecordingDestination {
    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.log.push("destination:reset");
        self.items.lock().unwrap().clear();
        self.done.reset();
    }

    fn done(&self) -> Receiver<()> {
        self.done.receiver()
    }
}

/// Destination that consumes the stream but never fires its signal.
#[derive(Default)]
pub struct SilentDestination {
    done: DoneSignal,
}

impl SilentDestination {
    pub fn new() -> Self {
        Self {
            done: DoneSignal::new(),
        }
    }
}

impl Acceptor<i32> for SilentDestination {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<i32>>) {
        drive("silent", ctx, &upstream, |_| {});
    }
}

impl Destination<i32> for SilentDestination {
    fn reset(&self) {
        self.done.reset();
    }

    fn done(&self) -> Receiver<()> {
        self.done.receiver()
    }
}

/// Passthrough stage that keeps its thread busy after forwarding the end marker.
pub struct SlowExitStage {
    log: EventLog,
    output: OutputChannel<i32>,
    linger: Duration,
}

impl SlowExitStage {
    pub fn new(log: EventLog, linger: Duration) -> Self {
        Self {
            log,
            output: OutputChannel::unbounded("slow-exit"),
            linger,
        }
    }
}

impl Emitter<i32> for SlowExitStage {
    fn output(&self) -> &OutputChannel<i32> {
        &self.output
    }
}

impl Acceptor<i32> for SlowExitStage {
    fn accept(&self, ctx: &Context, upstream: Receiver<Message<i32>>) {
        let termination = drive("slow-exit", ctx, &upstream, |next| {
            if let Ok(item) = next {
                self.output.send(item);
            }
        });
        self.output.finish(termination);
        // Deliberately ignores cancellation.
        thread::sleep(self.linger);
        self.log.push("slow-exit:exited");
    }
}

impl Stage<i32> for SlowExitStage {}
