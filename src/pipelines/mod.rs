//! # Pipelines Module (Orchestration)
//!
//! High-level workflow coordination. Connects I/O, data structures, and
//! the endpoint model: one block-buffered reader feeds worker threads that
//! each own a quantile estimator and a compression buffer; a shared
//! synchronized sink collects their output; statistics accumulate in
//! lock-free counters.

pub mod endpoints;
pub mod stats;

pub use endpoints::EndpointPipeline;
pub use stats::AnalysisStats;
