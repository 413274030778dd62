//! Thread-per-stage streaming pipeline.
//!
//! Data flows through a linear chain: Source → Stage → … → Destination. Each
//! link runs on its own thread and hands values to the next one through a
//! crossbeam channel owned by the producing stage.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──► [Stage 1] ──► … ──► [Stage N] ──► [Destination] ──► done()
//!    │             │                   │              │
//!    └─────────────┴──── Context (cancellation) ──────┘
//! ```
//!
//! # Design
//!
//! - **Explicit end of stream**: channels are never closed; a [`Message::EndOfStream`]
//!   carrying an [`EndMark`] root cause ends a run, so channels survive re-runs.
//! - **Errors as data**: stage errors travel as [`Message::Error`] unless the
//!   [`ErrorPolicy`](crate::config::ErrorPolicy) aborts the run.
//! - **Cooperative cancellation**: one [`Context`] is threaded through every
//!   task; stages observe it and still emit an end marker.
//! - **Single active run**: configuration and `run` share one lock.

pub mod channel;
pub mod context;
pub mod driver;
pub mod end_mark;
pub mod error;
pub mod executor;
pub mod message;
pub mod node;
pub mod nodes;

pub use channel::OutputChannel;
pub use context::{Cancelled, Context};
pub use driver::{drive, Outcome, Termination};
pub use end_mark::{is_end_mark, root_cause, EndMark, EndMarker};
pub use error::{PipelineError, PipelineResult};
pub use executor::{Pipeline, PipelineState, RunSummary};
pub use message::Message;
pub use node::{Acceptor, Destination, DoneSignal, Emitter, Source, Stage};
pub use nodes::{Collector, FilterStage, IterSource, LineSource, MapStage};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a stage thread panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
