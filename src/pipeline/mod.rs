// src/pipeline/mod.rs

pub mod extractor;
pub mod metrics;
pub mod runner;

pub use extractor::{Annotation, CrossingEvent, FrameEventExtractor, FrameEvents};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use runner::{run_and_drain, ProcessingStats, StopReason, StreamRunner};
