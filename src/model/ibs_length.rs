//! # IBS Interval Probabilities
//!
//! The probability that a random haplotype pair is IBS on a marker
//! interval `[start, end)` and discordant at `end`. Short intervals come
//! from the precomputed local IBS counts on a probability grid with
//! quantum `1 / (N(N-1) + 1)`; intervals beyond the stored horizon fall
//! back to the global IBS length distribution.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{IbdEndsError, Result};
use crate::model::global_ibs::GlobalIbsProbs;
use crate::model::ibs_counts::IbsCounts;

/// Per-start prefix-of-discordance probabilities for one orientation
pub struct IbsLengthProbs {
    gip: Arc<GlobalIbsProbs>,
    morgans: Vec<f64>,
    /// Row offsets into `probs`; length `n_markers + 1`
    offsets: Vec<usize>,
    probs: Vec<f32>,
}

impl IbsLengthProbs {
    /// Precompute probability rows from the IBS counts.
    ///
    /// `morgans` must be the marker Morgan positions in the same
    /// orientation as `counts`.
    pub fn new(
        morgans: Vec<f64>,
        gip: Arc<GlobalIbsProbs>,
        counts: &IbsCounts,
    ) -> Result<Self> {
        if morgans.len() != counts.n_markers() {
            return Err(IbdEndsError::invalid_data(format!(
                "inconsistent number of markers: {} vs {}",
                morgans.len(),
                counts.n_markers()
            )));
        }
        let n = counts.n_haps() as f64;
        let inv_pairs_p1 = 1.0 / (n * (n - 1.0) + 1.0);
        let rows: Vec<Vec<f32>> = (0..counts.n_markers())
            .into_par_iter()
            .map(|start| prob_row(counts, start, inv_pairs_p1))
            .collect();

        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        let mut probs = Vec::with_capacity(rows.iter().map(|r| r.len()).sum());
        for row in rows {
            probs.extend_from_slice(&row);
            offsets.push(probs.len());
        }
        Ok(Self {
            gip,
            morgans,
            offsets,
            probs,
        })
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.morgans.len()
    }

    /// Estimated probability that a random haplotype pair is IBS on the
    /// possibly empty interval `[start, end)` and discordant at `end`
    /// (or that IBS continues past the chromosome when
    /// `end == n_markers()`).
    pub fn fwd_prob(&self, start: usize, end: usize) -> f64 {
        if start == self.n_markers() {
            debug_assert_eq!(end, start);
            return 1.0;
        }
        let index = end - start;
        let row = &self.probs[self.offsets[start]..self.offsets[start + 1]];
        if index < row.len() {
            debug_assert!(row[index] > 0.0);
            return row[index] as f64;
        }
        if end == self.n_markers() {
            let length = self.morgans[end - 1] - self.morgans[start];
            1.0 - self.gip.cdf(length)
        } else {
            let x0 = self.morgans[start];
            let p1 = self.gip.cdf(self.morgans[end - 1] - x0);
            let p2 = self.gip.cdf(self.morgans[end] - x0);
            if p1 == p2 {
                0.5 / self.gip.n_lengths() as f64
            } else {
                p2 - p1
            }
        }
    }
}

fn prob_row(counts: &IbsCounts, start: usize, inv_pairs_p1: f64) -> Vec<f32> {
    let n = counts.n_haps() as u64;
    let end = counts.end(start);
    let mut probs = Vec::with_capacity(end - start + 1);
    let mut last_pairs = n * (n - 1);
    for m in start..end {
        let pairs = counts.count(start, m);
        probs.push(((last_pairs - pairs + 1) as f64 * inv_pairs_p1) as f32);
        last_pairs = pairs;
    }
    if end == counts.n_markers() {
        // probability of IBS continuing to the chromosome end
        probs.push(((last_pairs + 1) as f64 * inv_pairs_p1) as f32);
    }
    probs
}
