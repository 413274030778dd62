//! LineSource: emits the lines of a reader, one item per line.
//!
//! Line terminators (`\n` or `\r\n`) are stripped. Cancellation is checked
//! between lines; a read that blocks forever (an idle terminal, say) is not
//! interrupted.

use crate::error::{StreamError, StreamResultExt};
use crate::pipeline::channel::OutputChannel;
use crate::pipeline::context::Context;
use crate::pipeline::driver::Termination;
use crate::pipeline::lock;
use crate::pipeline::message::Message;
use crate::pipeline::node::{Emitter, Source};
use std::io::BufRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Source reading lines from a [`BufRead`].
///
/// The reader is consumed by the first run; install another with
/// [`set_reader`](Self::set_reader) before running again.
pub struct LineSource<R> {
    reader: Mutex<Option<R>>,
    output: OutputChannel<String>,
    lines: AtomicU64,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            output: OutputChannel::unbounded(name),
            lines: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(mut self, capacity: Option<usize>) -> Self {
        self.output = OutputChannel::new(self.output.name(), capacity);
        self
    }

    pub fn set_reader(&self, reader: R) {
        *lock(&self.reader) = Some(reader);
    }

    /// Lines emitted by the current (or last) run.
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    /// Emit every line. Returns `false` when the run was cancelled.
    fn pump(&self, ctx: &Context, reader: &mut R) -> bool {
        let name = self.output.name();
        let mut line = String::new();
        loop {
            if ctx.is_cancelled() {
                return false;
            }
            line.clear();
            let read = reader
                .read_line(&mut line)
                .with_context(|| format!("{}: line {}", name, self.lines() + 1));

            let msg = match read {
                Ok(0) => return true,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']).to_string();
                    self.lines.fetch_add(1, Ordering::Relaxed);
                    Message::Item(trimmed)
                }
                Err(err) => {
                    // Reading cannot continue past an I/O error.
                    return match ctx.report_error(name, err) {
                        Some(err) => self.send_error(ctx, err),
                        None => false,
                    };
                }
            };
            if self.output.send_cancellable(ctx, msg).is_err() {
                return false;
            }
        }
    }

    fn send_error(&self, ctx: &Context, err: StreamError) -> bool {
        self.output
            .send_cancellable(ctx, Message::Error(err))
            .is_ok()
    }
}

impl<R: BufRead + Send> Emitter<String> for LineSource<R> {
    fn output(&self) -> &OutputChannel<String> {
        &self.output
    }
}

impl<R: BufRead + Send> Source<String> for LineSource<R> {
    fn start(&self, ctx: &Context) {
        let Some(mut reader) = lock(&self.reader).take() else {
            tracing::warn!(stage = self.output.name(), "no reader installed, ending immediately");
            self.output.send_end_mark(self.output.name());
            return;
        };

        if self.pump(ctx, &mut reader) {
            let end = Message::end_mark(self.output.name());
            if self.output.send_cancellable(ctx, end).is_ok() {
                return;
            }
        }
        tracing::debug!(stage = self.output.name(), lines = self.lines(), "source cancelled");
        self.output.finish(Termination::Cancelled);
    }

    fn reset(&self) {
        self.output.drain();
        self.lines.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn drain_items(src: &LineSource<impl BufRead + Send>) -> Vec<Message<String>> {
        src.output().out_ch().try_iter().collect()
    }

    #[test]
    fn test_lines_are_trimmed() {
        let src = LineSource::new("stdin", Cursor::new("alpha\r\nbeta\ngamma"));
        src.start(&Context::new());
        let msgs = drain_items(&src);
        assert!(msgs.last().unwrap().is_end_mark());
        let items: Vec<_> = msgs.into_iter().filter_map(Message::into_item).collect();
        assert_eq!(items, vec!["alpha", "beta", "gamma"]);
        assert_eq!(src.lines(), 3);
    }

    #[test]
    fn test_second_run_without_reader_only_ends() {
        let src = LineSource::new("stdin", Cursor::new("x\n"));
        src.start(&Context::new());
        src.reset();
        src.start(&Context::new());
        let msgs = drain_items(&src);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].is_end_mark());
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_read_error_is_forwarded_then_ends() {
        let src = LineSource::new("dev", io::BufReader::new(Broken));
        src.start(&Context::new());
        let msgs = drain_items(&src);
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            Message::Error(err) => {
                assert!(err.to_string().contains("dev: line 1"));
                assert!(!err.is_end_mark());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(msgs[1].is_end_mark());
    }
}
