//! Built-in stage implementations.

pub mod collector;
pub mod filter;
pub mod iter_source;
pub mod line_source;
pub mod map;

pub use collector::Collector;
pub use filter::FilterStage;
pub use iter_source::IterSource;
pub use line_source::LineSource;
pub use map::MapStage;
