//! End-of-stream marker and its detection.

use std::error::Error as StdError;
use thiserror::Error;

/// Capability of an error value to mark the end of a stream.
pub trait EndMarker {
    fn end_mark(&self) -> bool;
}

/// Sentinel sent as the last value on a channel.
///
/// Stages wrap it with their own context on the way down, so receivers must
/// go through [`is_end_mark`] rather than compare messages or shallow types.
#[derive(Error, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[error("end of input")]
pub struct EndMark;

impl EndMarker for EndMark {
    fn end_mark(&self) -> bool {
        true
    }
}

/// Follow `source()` down to the innermost error.
pub fn root_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut cause = err;
    while let Some(next) = cause.source() {
        cause = next;
    }
    cause
}

/// True iff the root cause of `err` is an [`EndMark`] reporting itself as one.
pub fn is_end_mark(err: &(dyn StdError + 'static)) -> bool {
    root_cause(err)
        .downcast_ref::<EndMark>()
        .is_some_and(|mark| mark.end_mark())
}
