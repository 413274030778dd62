//! Per-stage output channel.
//!
//! Each producing stage owns one [`OutputChannel`]. The next link in the chain
//! reads from [`OutputChannel::out_ch`]. The channel is never closed: the end
//! of a stream is an explicit marker value, so the same channel survives
//! across runs and is drained by the owning stage's reset hook.

use crate::error::StreamError;
use crate::pipeline::context::{Cancelled, Context};
use crate::pipeline::driver::Termination;
use crate::pipeline::message::Message;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};

/// Typed single-producer handle over a crossbeam queue.
pub struct OutputChannel<T> {
    name: String,
    capacity: Option<usize>,
    tx: Sender<Message<T>>,
    rx: Receiver<Message<T>>,
    /// Set once an end marker went out; cleared by `drain`.
    ended: AtomicBool,
}

impl<T> OutputChannel<T> {
    /// Bounded when `capacity` is `Some`, unbounded otherwise.
    ///
    /// `Some(0)` gives a rendezvous channel where every send waits for the reader.
    pub fn new(name: impl Into<String>, capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        Self {
            name: name.into(),
            capacity,
            tx,
            rx,
            ended: AtomicBool::new(false),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        Self::new(name, Some(capacity))
    }

    /// Name of the owning stage.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Receive view for the downstream link.
    pub fn out_ch(&self) -> Receiver<Message<T>> {
        self.rx.clone()
    }

    /// Number of values waiting to be read.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Whether an end marker has been sent since the last drain.
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Send an item, blocking until the channel accepts it.
    pub fn send(&self, value: T) {
        self.send_message(Message::Item(value));
    }

    /// Send an end-of-stream marker annotated with `context`.
    ///
    /// This should be the last value sent on the channel for the current run.
    pub fn send_end_mark(&self, context: impl Into<String>) {
        self.send_message(Message::end_mark(context));
    }

    /// Send a stage error downstream. End markers disguised as errors are
    /// sent as end markers.
    pub fn send_error(&self, err: StreamError) {
        self.send_message(Message::from_error(err));
    }

    /// Pass an upstream end marker on, with this channel's name added as context.
    pub fn forward_end(&self, marker: StreamError) {
        self.send_message(Message::EndOfStream(marker.with_context(self.name.clone())));
    }

    pub fn send_message(&self, msg: Message<T>) {
        self.note_sent(msg.is_end_mark());
        // Disconnection is impossible: `self.rx` keeps the channel open.
        let _ = self.tx.send(msg);
    }

    /// Send unless `ctx` is cancelled first.
    pub fn send_cancellable(&self, ctx: &Context, msg: Message<T>) -> Result<(), Cancelled> {
        if ctx.is_cancelled() {
            return Err(Cancelled);
        }
        let ends = msg.is_end_mark();
        select! {
            send(self.tx, msg) -> _ => {
                self.note_sent(ends);
                Ok(())
            }
            recv(ctx.done()) -> _ => Err(Cancelled),
        }
    }

    /// Send an end marker only if there is room right now.
    ///
    /// Used on cancellation: the reader is shutting down as well, so a full
    /// buffer must not hold this stage hostage.
    pub fn try_send_end_mark(&self, context: impl Into<String>) -> bool {
        let sent = self.tx.try_send(Message::end_mark(context)).is_ok();
        if sent {
            self.ended.store(true, Ordering::Release);
        }
        sent
    }

    /// Emit the end-of-stream value matching how the stage's input loop ended.
    pub fn finish(&self, termination: Termination) {
        match termination {
            Termination::EndOfStream(marker) => self.forward_end(marker),
            Termination::Cancelled => {
                if !self.try_send_end_mark(format!("{}: cancelled", self.name)) {
                    tracing::debug!(stage = %self.name, "no room for end marker after cancellation");
                }
            }
            Termination::Disconnected => {
                self.send_end_mark(format!("{}: upstream disconnected", self.name));
            }
        }
    }

    /// Discard values left over from a previous run. Returns how many were dropped.
    pub fn drain(&self) -> usize {
        let dropped = self.rx.try_iter().count();
        self.ended.store(false, Ordering::Release);
        if dropped > 0 {
            tracing::debug!(stage = %self.name, dropped, "drained stale values");
        }
        dropped
    }

    fn note_sent(&self, ends: bool) {
        if ends {
            self.ended.store(true, Ordering::Release);
        } else if self.has_ended() {
            tracing::warn!(stage = %self.name, "value sent after end of stream");
        }
    }
}
