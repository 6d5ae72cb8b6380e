//! Producer/consumer orchestration over the bounded batch queue.

mod consumer;
mod coordinator;
mod producer;

pub use coordinator::{run_pipeline, PipelineConfig};
