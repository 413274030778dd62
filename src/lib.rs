//! # pipewright: thread-per-stage streaming pipelines
//!
//! Wires one source, any number of transform stages and one destination into
//! a chain of concurrently running threads connected by crossbeam channels.
//! The end of a stream is an explicit marker value rather than a closed
//! channel, and cancellation is cooperative through a shared [`Context`].
//!
//! ## Architecture
//!
//! - **Pipeline**: holds the stage configuration, runs it and waits for the
//!   destination's completion signal
//! - **Stages**: [`Source`], [`Stage`] and [`Destination`] trait objects
//! - **Messages**: items, end-of-stream markers and stage errors share one channel
//! - **Config**: channel sizing, error policy and thread handling from TOML/JSON
//!
//! ## Example
//!
//! ```no_run
//! use pipewright::{Collector, Context, IterSource, MapStage, Pipeline};
//! use std::sync::Arc;
//!
//! let pipeline: Pipeline<i32> = Pipeline::new();
//! let sink = Arc::new(Collector::<i32>::new("sink"));
//! pipeline.set_source(Arc::new(IterSource::new("numbers", vec![1, 2, 3])));
//! pipeline.add(Arc::new(MapStage::new("double", |v: i32| v * 2)));
//! pipeline.set_destination(sink.clone());
//!
//! pipeline.run(&Context::new()).expect("pipeline is configured");
//! assert_eq!(sink.items(), vec![2, 4, 6]);
//! ```

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use config::{ErrorPolicy, PipelineConfig};
pub use error::{StreamError, StreamResult, StreamResultExt};
pub use pipeline::{
    drive, is_end_mark, Acceptor, Collector, Context, Destination, DoneSignal, Emitter, EndMark,
    FilterStage, IterSource, LineSource, MapStage, Message, OutputChannel, Pipeline,
    PipelineError, PipelineResult, PipelineState, RunSummary, Source, Stage, Termination,
};
