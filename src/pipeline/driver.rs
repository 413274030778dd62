//! The accept loop shared by transform stages and destinations.
//!
//! [`drive`] reads an upstream channel until the end marker arrives, the
//! context is cancelled, or the upstream goes away. Items and errors are
//! handed to a callback; end detection, cancellation and the error policy
//! are handled here so concrete stages only supply per-item logic.

use crate::error::StreamError;
use crate::pipeline::context::Context;
use crate::pipeline::message::Message;
use crossbeam_channel::{select, Receiver};

/// How an accept loop ended.
#[derive(Debug)]
pub enum Termination {
    /// Upstream sent the end marker, carried here so it can be forwarded.
    EndOfStream(StreamError),
    /// The context was cancelled (or a stage aborted the run).
    Cancelled,
    /// Every sender of the upstream channel was dropped without an end marker.
    Disconnected,
}

/// Copyable summary of a [`Termination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    EndOfStream,
    Cancelled,
    Disconnected,
}

impl Termination {
    pub fn outcome(&self) -> Outcome {
        match self {
            Termination::EndOfStream(_) => Outcome::EndOfStream,
            Termination::Cancelled => Outcome::Cancelled,
            Termination::Disconnected => Outcome::Disconnected,
        }
    }
}

/// Run the accept protocol for stage `name`.
///
/// `handle` receives `Ok(item)` for ordinary items and `Err(error)` for stage
/// errors that the context's error policy lets through.
pub fn drive<T, F>(
    name: &str,
    ctx: &Context,
    upstream: &Receiver<Message<T>>,
    mut handle: F,
) -> Termination
where
    F: FnMut(Result<T, StreamError>),
{
    tracing::debug!(stage = name, "accept loop started");
    let mut received = 0u64;

    let termination = loop {
        // select! picks at random among ready arms; check first so a busy
        // upstream cannot starve cancellation.
        if ctx.is_cancelled() {
            break Termination::Cancelled;
        }

        let msg = select! {
            recv(ctx.done()) -> _ => break Termination::Cancelled,
            recv(upstream) -> msg => msg,
        };

        let msg = match msg {
            Ok(msg) => msg,
            Err(_) => break Termination::Disconnected,
        };

        received += 1;
        match msg {
            Message::Item(item) => {
                tracing::trace!(stage = name, "item received");
                handle(Ok(item));
            }
            Message::EndOfStream(marker) => break Termination::EndOfStream(marker),
            Message::Error(err) if err.is_end_mark() => break Termination::EndOfStream(err),
            Message::Error(err) => {
                tracing::debug!(stage = name, error = %err, "stage error received");
                match ctx.report_error(name, err) {
                    Some(err) => handle(Err(err)),
                    None => break Termination::Cancelled,
                }
            }
        }
    };

    tracing::debug!(
        stage = name,
        received,
        outcome = ?termination.outcome(),
        "accept loop finished"
    );
    termination
}
