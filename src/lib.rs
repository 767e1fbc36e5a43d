//! # ibd-ends Library
//!
//! Probabilistic estimation of identity-by-descent (IBD) segment
//! endpoints. A Rust reimplementation of the ibd-ends program.
//!
//! For each input IBD segment between two haplotypes the analysis builds a
//! probability distribution over the true genetic-position endpoints and
//! reports requested quantiles (and optionally sampled draws) of the two
//! one-sided endpoint distributions.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: markers, samples, the phased allele matrix, the genetic map,
//!   and shared segments
//! - `error`: Error types and result aliases
//! - `io`: VCF reading, block-buffered segment input, synchronized output
//! - `model`: IBS length models, the coalescent prior, endpoint CDF
//!   construction, and two-sided refinement
//! - `pipelines`: the multi-threaded per-segment driver

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;

// Re-export commonly used types
pub use config::Config;
pub use data::{MarkerFrame, Orientation, SegmentParser, SharedSegment};
pub use error::{IbdEndsError, Result};
pub use model::{EndpointModel, IbdEnds, ModelParams, QuantileEstimator};
pub use pipelines::{AnalysisStats, EndpointPipeline};
