//! # Global One-Sided IBS Length Distribution
//!
//! Monte-Carlo estimate of the distance, in Morgans, from a random genetic
//! position to the nearest discordance between a random pair of
//! haplotypes. Positions in the first half of the chromosome scan forward,
//! positions in the second half scan backward, so sampled runs rarely hit
//! a chromosome end. Per-position length vectors whose filter-quantile
//! length is an outlier are dropped before pooling.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::data::frame::{FrameView, MarkerFrame, Orientation};
use crate::error::{IbdEndsError, Result};
use crate::model::ModelParams;

/// Sorted pool of sampled one-sided IBS lengths in Morgans
pub struct GlobalIbsProbs {
    lengths: Vec<f64>,
    reciprocal_size: f64,
}

impl GlobalIbsProbs {
    pub fn new(frame: &MarkerFrame, params: &ModelParams) -> Result<Self> {
        if frame.n_haps() < 2 {
            return Err(IbdEndsError::invalid_data(format!(
                "at least two haplotypes are required: {}",
                frame.n_haps()
            )));
        }
        let view = frame.view(Orientation::Forward);
        let mut rows: Vec<Vec<f64>> = (0..params.global_pos)
            .into_par_iter()
            .map(|i| {
                let seed = params.seed.wrapping_add(i as i64) as u64;
                sample_ibs_lengths(&view, params.global_segments, seed)
            })
            .collect();

        filter_outlier_positions(
            &mut rows,
            params.global_quantile,
            params.global_factor,
            params.global_segments,
        );

        let mut lengths: Vec<f64> = rows.into_iter().flatten().collect();
        lengths.par_sort_unstable_by(f64::total_cmp);
        let reciprocal_size = 1.0 / lengths.len() as f64;
        Ok(Self {
            lengths,
            reciprocal_size,
        })
    }

    /// Number of filtered, sampled segment lengths
    pub fn n_lengths(&self) -> usize {
        self.lengths.len()
    }

    /// Proportion of sampled, filtered one-sided discord distances that
    /// are less than or equal to `morgans`. The returned rank is clamped
    /// to `[1, n-1]`, so the cdf never returns exactly 0 or 1.
    pub fn cdf(&self, morgans: f64) -> f64 {
        assert!(!morgans.is_nan(), "NaN IBS length");
        let mut index = self.lengths.partition_point(|&x| x <= morgans);
        if index == 0 {
            index = 1;
        }
        if index == self.lengths.len() {
            index -= 1;
        }
        index as f64 * self.reciprocal_size
    }
}

/// Sample one random focus and `n_segments` haplotype pair lengths,
/// returned sorted.
fn sample_ibs_lengths(view: &FrameView<'_>, n_segments: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let morgans = view.morgans();
    let first = morgans[0];
    let last = morgans[morgans.len() - 1];
    let mut pos = first + rng.gen::<f64>() * (last - first);
    if pos >= last {
        pos = last.next_down();
    }
    let mid = 0.5 * (first + last);
    let n_haps = view.n_haps();
    let mut lengths: Vec<f64> = (0..n_segments)
        .map(|_| {
            let h1 = rng.gen_range(0..n_haps);
            let mut h2 = rng.gen_range(0..n_haps);
            while h2 == h1 {
                h2 = rng.gen_range(0..n_haps);
            }
            if pos < mid {
                fwd_length(view, morgans, pos, h1, h2)
            } else {
                bwd_length(view, morgans, pos, h1, h2)
            }
        })
        .collect();
    lengths.sort_unstable_by(f64::total_cmp);
    lengths
}

/// Morgan distance from `pos` forward to the first discordance, or to the
/// last marker if there is none.
fn fwd_length(view: &FrameView<'_>, morgans: &[f64], pos: f64, h1: usize, h2: usize) -> f64 {
    let n = morgans.len();
    let mut m = morgans.partition_point(|&x| x < pos);
    while m < n && view.allele(m, h1) == view.allele(m, h2) {
        m += 1;
    }
    if m == n {
        m -= 1;
    }
    morgans[m] - pos
}

/// Morgan distance from `pos` backward to the first discordance, or to the
/// first marker if there is none.
fn bwd_length(view: &FrameView<'_>, morgans: &[f64], pos: f64, h1: usize, h2: usize) -> f64 {
    let mut m = morgans.partition_point(|&x| x <= pos) as isize - 1;
    debug_assert!(m >= 0);
    while m >= 0 && view.allele(m as usize, h1) == view.allele(m as usize, h2) {
        m -= 1;
    }
    if m < 0 {
        m = 0;
    }
    pos - morgans[m as usize]
}

/// Drop positions whose length at the filter quantile exceeds
/// `factor` times the median across positions.
fn filter_outlier_positions(rows: &mut Vec<Vec<f64>>, quantile: f64, factor: f64, n_segments: usize) {
    let index = (quantile * n_segments as f64).floor() as usize;
    let mut values: Vec<f64> = rows.iter().map(|row| row[index]).collect();
    values.sort_unstable_by(f64::total_cmp);
    let n = values.len();
    let median = 0.5 * (values[(n - 1) >> 1] + values[n >> 1]);
    let max_value = factor * median;
    rows.retain(|row| row[index] <= max_value);
}
