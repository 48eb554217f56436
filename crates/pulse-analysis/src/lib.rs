//! # pulse-analysis
//!
//! Asynchronous analysis pipeline sitting between the hub and a
//! [`Classifier`](pulse_llm::Classifier).
//!
//! Requests are shed rather than queued without bound: [`AnalysisPipeline::enqueue`]
//! never blocks and drops work when the request queue is full. A timer drains
//! the queue in batches and fans each request out to a bounded worker pool;
//! completed classifications are published to a bounded result stream with
//! the same drop-on-full policy.

#![deny(unsafe_code)]

pub mod pipeline;
pub mod stats;

pub use pipeline::{AnalysisPipeline, EnqueueOutcome, PipelineConfig, ResultStream};
pub use stats::{PipelineStats, PipelineStatsSnapshot};
