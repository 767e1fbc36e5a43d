//! # Model Module
//!
//! Statistical model implementations for IBD endpoint estimation.
//!
//! ## Core Algorithms
//! - `IbsCounts`: local pairwise IBS survival counts per start marker
//! - `GlobalIbsProbs`: empirical one-sided IBS length distribution
//! - `IbsLengthProbs`: per-interval IBS-then-discord probabilities
//! - `QuantileEstimator`: endpoint CDF construction and inversion
//! - `IbdEnds`: two-sided iterative endpoint refinement
//! - `coalescent`: the IBD length prior F(y; Ne) and its inverse

pub mod coalescent;
pub mod ends;
pub mod global_ibs;
pub mod ibs_counts;
pub mod ibs_length;
pub mod quantile;

pub use ends::IbdEnds;
pub use global_ibs::GlobalIbsProbs;
pub use ibs_counts::IbsCounts;
pub use ibs_length::IbsLengthProbs;
pub use quantile::QuantileEstimator;

use std::sync::Arc;

use crate::data::frame::{FrameView, MarkerFrame, Orientation};
use crate::error::Result;

/// Model hyperparameters.
///
/// `Default` yields the analysis defaults; `Config::model_params()` builds
/// an instance from the command line.
#[derive(Clone, Debug)]
pub struct ModelParams {
    /// Constant effective population size in the length prior
    pub ne: f64,
    /// Per-site allele mismatch probability inside an IBD segment
    pub err: f64,
    /// Per-site mismatch probability inside a gene conversion tract
    pub gc_err: f64,
    /// Maximum gene conversion tract length in base pairs
    pub gc_bp: i64,
    /// Seed for every deterministic RNG
    pub seed: i64,
    /// Cap on haplotypes sampled for local IBS counts
    pub local_haps: usize,
    /// Number of random foci for the global IBS length distribution
    pub global_pos: usize,
    /// Haplotype pair draws per focus
    pub global_segments: usize,
    /// Quantile of per-focus lengths used for outlier filtering
    pub global_quantile: f64,
    /// Factor on the median quantile length setting the outlier cutoff
    pub global_factor: f64,
    /// CDF threshold truncating local IBS count rows
    pub max_local_cdf: f64,
    /// Maximum endpoint updates per segment side
    pub max_its: usize,
    /// Keep the focus fixed at the segment midpoint
    pub fix_focus: bool,
    /// Probability used for the internal convergence endpoint
    pub length_quantile: f64,
    /// Relative change below which an endpoint is converged
    pub max_diff: f64,
}

impl ModelParams {
    /// Largest permitted `local_haps`; keeps the ordered pair count
    /// within a 31-bit signed integer.
    pub const MAX_LOCAL_HAPS: usize = 40_000;
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            ne: 10_000.0,
            err: 0.0005,
            gc_err: 0.1,
            gc_bp: 1000,
            seed: -99999,
            local_haps: 10_000,
            global_pos: 1000,
            global_segments: 2000,
            global_quantile: 0.9,
            global_factor: 3.0,
            max_local_cdf: 0.999,
            max_its: 10,
            fix_focus: false,
            length_quantile: 0.05,
            max_diff: 0.1,
        }
    }
}

/// The immutable endpoint model shared by all workers: the marker frame
/// plus the forward and reverse IBS length probability models.
pub struct EndpointModel {
    params: ModelParams,
    frame: Arc<MarkerFrame>,
    fwd_ibs_probs: IbsLengthProbs,
    rev_ibs_probs: IbsLengthProbs,
}

impl EndpointModel {
    pub fn new(params: ModelParams, frame: Arc<MarkerFrame>) -> Result<Self> {
        let gip = Arc::new(GlobalIbsProbs::new(&frame, &params)?);
        let fwd_counts = IbsCounts::new(&frame, &params)?;
        let rev_counts = fwd_counts.reverse();
        let fwd_ibs_probs = IbsLengthProbs::new(
            frame.view(Orientation::Forward).morgans().to_vec(),
            Arc::clone(&gip),
            &fwd_counts,
        )?;
        let rev_ibs_probs = IbsLengthProbs::new(
            frame.view(Orientation::Reverse).morgans().to_vec(),
            gip,
            &rev_counts,
        )?;
        Ok(Self {
            params,
            frame,
            fwd_ibs_probs,
            rev_ibs_probs,
        })
    }

    pub fn params(&self) -> &ModelParams {
        &self.params
    }

    pub fn frame(&self) -> &Arc<MarkerFrame> {
        &self.frame
    }

    /// Morgan position of a base position, in chromosome order
    pub fn base_to_morgans(&self, pos: i64) -> f64 {
        self.frame.view(Orientation::Forward).base_to_morgans(pos)
    }

    /// Directional model data for one scan orientation
    pub fn dir(&self, orientation: Orientation) -> DirModel<'_> {
        let ibs_probs = match orientation {
            Orientation::Forward => &self.fwd_ibs_probs,
            Orientation::Reverse => &self.rev_ibs_probs,
        };
        DirModel {
            view: self.frame.view(orientation),
            ibs_probs,
        }
    }
}

/// One orientation's frame view paired with its IBS length model
pub struct DirModel<'a> {
    pub view: FrameView<'a>,
    pub ibs_probs: &'a IbsLengthProbs,
}
