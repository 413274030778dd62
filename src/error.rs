//! Errors that travel through pipeline channels.
//!
//! A [`StreamError`] is what a stage sends downstream when something goes
//! wrong, and also the carrier for the end-of-stream marker. Every stage may
//! wrap the value it received with its own context; detection always looks at
//! the root cause, never at the message text.

use crate::pipeline::end_mark::{self, EndMark};
use std::error::Error as StdError;
use thiserror::Error;

/// Error value carried on a pipeline channel.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream has ended. Not a failure, see [`EndMark`].
    #[error("{0}")]
    EndOfInput(#[from] EndMark),

    /// A stage reported a processing failure.
    #[error("stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    /// Any foreign error raised while processing an item.
    #[error("{0}")]
    Failed(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// Another stream error with extra context attached
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<StreamError>,
    },
}

impl StreamError {
    /// A bare end-of-stream marker.
    pub fn end_of_input() -> Self {
        StreamError::EndOfInput(EndMark)
    }

    /// A processing failure reported by `stage`.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        StreamError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convert any error into a stream error.
    ///
    /// Stream errors pass through unchanged instead of being boxed again.
    pub fn wrap<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = Box::new(err);
        match boxed.downcast::<StreamError>() {
            Ok(stream) => *stream,
            Err(other) => StreamError::Failed(other),
        }
    }

    /// Add context to an error. An empty context leaves the error untouched.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        if context.is_empty() {
            return self;
        }
        StreamError::WithContext {
            context,
            source: Box::new(self),
        }
    }

    /// True when the root cause of this error is the end-of-stream marker.
    pub fn is_end_mark(&self) -> bool {
        end_mark::is_end_mark(self)
    }

    /// The innermost error in the `source()` chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        end_mark::root_cause(self)
    }

    /// Number of context layers wrapped around the root error.
    pub fn depth(&self) -> usize {
        match self {
            StreamError::WithContext { source, .. } => 1 + source.depth(),
            _ => 0,
        }
    }
}

/// Result type alias for stage-level processing
pub type StreamResult<T> = std::result::Result<T, StreamError>;

/// Extension trait for adding context to Results
pub trait StreamResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> StreamResult<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> StreamResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> StreamResultExt<T> for std::result::Result<T, E>
where
    E: StdError + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> StreamResult<T> {
        self.map_err(|e| StreamError::wrap(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> StreamResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StreamError::wrap(e).with_context(f()))
    }
}
