//! # Shared Utilities

pub mod progress;

pub use progress::{NullProgress, ProgressSink, TracingProgress};
