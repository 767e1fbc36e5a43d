//! # Endpoint Quantile Estimation
//!
//! Builds, for one haplotype pair and focus position, the cumulative
//! distribution of the position of the IBD segment end past the focus,
//! then inverts it at requested probabilities. The backward distribution
//! negates positions and delegates to the same machinery on the reverse
//! orientation.
//!
//! The CDF is accumulated window by window between successive
//! discordances. Each discordance past the first is classified as a
//! genotype error or a gene-conversion mismatch by its distance from the
//! previous qualifying discordance, and the running `constant` absorbs the
//! chosen rate divided by the probability of the observed IBS run.

use std::sync::Arc;

use crate::data::frame::Orientation;
use crate::error::{IbdEndsError, Result};
use crate::model::{coalescent, DirModel, EndpointModel};

/// A window's share of the total CDF mass below which construction stops
const MIN_RATIO: f64 = 0.001;

/// Rescale threshold guarding the accumulator against overflow
const RESCALE_LIMIT: f64 = 1e50;

/// Endpoint CDF scratch space and quantile inversion for one worker.
///
/// Instances are not thread-safe; each worker owns one.
pub struct QuantileEstimator {
    model: Arc<EndpointModel>,
    ne: f64,
    err: f64,
    gc_err: f64,
    gc_bp: i64,
    // scratch space for the CDF over markers
    cdf: Vec<f64>,
    cdf_start: usize,
    cdf_end: usize,
}

impl QuantileEstimator {
    pub fn new(model: Arc<EndpointModel>) -> Self {
        let params = model.params();
        let ne = params.ne;
        let err = params.err;
        let gc_err = params.gc_err;
        let gc_bp = params.gc_bp;
        let n_markers = model.frame().n_markers();
        Self {
            model,
            ne,
            err,
            gc_err,
            gc_bp,
            cdf: vec![0.0; n_markers],
            cdf_start: 0,
            cdf_end: 0,
        }
    }

    pub fn model(&self) -> &Arc<EndpointModel> {
        &self.model
    }

    /// Estimate quantiles of the forward endpoint distribution.
    ///
    /// `ibd_start_morgans` is the estimated Morgan position of the far
    /// (start) endpoint; `focus_pos` is the base position the distribution
    /// is measured from. Each element of `probs` must lie in (0, 1).
    pub fn fwd_quantiles(
        &mut self,
        hap1: usize,
        hap2: usize,
        ibd_start_morgans: f64,
        focus_pos: i64,
        probs: &[f64],
        quantiles: &mut [i64],
    ) -> Result<()> {
        let model = Arc::clone(&self.model);
        let dir = model.dir(Orientation::Forward);
        let focus_morgans = dir.view.base_to_morgans(focus_pos);
        self.set_cdf(&dir, hap1, hap2, ibd_start_morgans, focus_pos, focus_morgans)?;
        for (quantile, &p) in quantiles.iter_mut().zip(probs.iter()) {
            *quantile = self.quantile(&dir, ibd_start_morgans, focus_pos, focus_morgans, p)?;
        }
        Ok(())
    }

    /// Estimate quantiles of the backward endpoint distribution.
    ///
    /// `ibd_end_morgans` is the estimated Morgan position of the far (end)
    /// endpoint. Positions are negated into the reverse orientation and
    /// the results negated back.
    pub fn bwd_quantiles(
        &mut self,
        hap1: usize,
        hap2: usize,
        focus_pos: i64,
        ibd_end_morgans: f64,
        probs: &[f64],
        quantiles: &mut [i64],
    ) -> Result<()> {
        let focus_pos = -focus_pos;
        let anchor_morgans = -ibd_end_morgans;

        let model = Arc::clone(&self.model);
        let dir = model.dir(Orientation::Reverse);
        let focus_morgans = dir.view.base_to_morgans(focus_pos);
        self.set_cdf(&dir, hap1, hap2, anchor_morgans, focus_pos, focus_morgans)?;
        for (quantile, &p) in quantiles.iter_mut().zip(probs.iter()) {
            *quantile = -self.quantile(&dir, anchor_morgans, focus_pos, focus_morgans, p)?;
        }
        Ok(())
    }

    /// Store the endpoint distribution in `self.cdf`.
    ///
    /// For markers `m` in `(cdf_start, cdf_end)`, `cdf[m]` accumulates the
    /// probability that the segment end lies at or before marker `m`;
    /// `cdf[cdf_start]` holds the mass between the focus and the first
    /// marker past it.
    fn set_cdf(
        &mut self,
        dir: &DirModel<'_>,
        hap1: usize,
        hap2: usize,
        anchor_morgans: f64,
        focus_pos: i64,
        focus_morgans: f64,
    ) -> Result<()> {
        let n_markers = dir.view.n_markers();
        self.cdf_start = dir.view.next_marker(focus_pos);
        self.cdf[self.cdf_start - 1] = 0.0;
        let mut constant = 1.0;
        let mut f1 = coalescent::cdf(focus_morgans - anchor_morgans, self.ne)?;
        let mut start = self.cdf_start;
        let mut next_discord = dir.view.fwd_discord(hap1, hap2, start);
        let mut min_next_discord_pos = dir.view.base(next_discord).saturating_add(self.gc_bp);
        loop {
            self.cdf_end = (next_discord + 1).min(n_markers);
            for m in start..self.cdf_end {
                let f2 = coalescent::cdf(dir.view.morgan(m) - anchor_morgans, self.ne)?;
                self.cdf[m] = self.cdf[m - 1]
                    + (f2 - f1) * dir.ibs_probs.fwd_prob(m, next_discord) * constant;
                f1 = f2;
            }
            if self.finished(start) {
                let norm = 1.0 / self.cdf[self.cdf_end - 1];
                scale(&mut self.cdf[self.cdf_start..self.cdf_end], norm);
                return Ok(());
            }
            if self.cdf[self.cdf_end - 1] > RESCALE_LIMIT {
                let factor = 1.0 / self.cdf[self.cdf_end - 1];
                scale(&mut self.cdf[self.cdf_start..self.cdf_end], factor);
                constant *= factor;
            }
            start = self.cdf_end;
            next_discord = dir.view.fwd_discord(hap1, hap2, start);
            let discord_pos = dir.view.base(next_discord);
            let mut rate = self.gc_err;
            if discord_pos >= min_next_discord_pos {
                rate = self.err;
                min_next_discord_pos = discord_pos.saturating_add(self.gc_bp);
            }
            constant *= rate / dir.ibs_probs.fwd_prob(start, next_discord);
        }
    }

    fn finished(&self, last_start: usize) -> bool {
        if self.cdf_end == self.cdf.len() {
            return true;
        }
        (self.cdf[self.cdf_end - 1] - self.cdf[last_start - 1])
            < MIN_RATIO * self.cdf[self.cdf_end - 1]
    }

    /// Invert the stored CDF at probability `p`, interpolating on the
    /// coalescent scale within the bracketing marker interval. The
    /// minimum returned position is `focus_pos + 1`.
    fn quantile(
        &self,
        dir: &DirModel<'_>,
        anchor_morgans: f64,
        focus_pos: i64,
        focus_morgans: f64,
        p: f64,
    ) -> Result<i64> {
        if p <= 0.0 || p >= 1.0 || p.is_nan() {
            return Err(IbdEndsError::algorithm(format!(
                "invalid probability: {}",
                p
            )));
        }
        let window = &self.cdf[self.cdf_start..self.cdf_end];
        let index = (self.cdf_start + window.partition_point(|&x| x < p)).min(self.cdf_end - 1);
        let p1 = self.cdf[index - 1];
        let p2 = self.cdf[index];
        debug_assert!(p1 <= p && p <= p2);

        let x1 = if index == self.cdf_start {
            focus_morgans
        } else {
            dir.view.morgan(index - 1)
        };
        let x2 = dir.view.morgan(index);

        let f1 = coalescent::cdf(x1 - anchor_morgans, self.ne)?;
        let f2 = coalescent::cdf(x2 - anchor_morgans, self.ne)?;
        let pp = f1 + ((p - p1) / (p2 - p1)) * (f2 - f1);
        let x = anchor_morgans + coalescent::inv_cdf(pp, self.ne)?;
        let delta = (x - x1) / (x2 - x1);

        // the minimum quantile is focus_pos + 1 to avoid a zero-length result
        let y1 = if index == self.cdf_start {
            focus_pos + 1
        } else {
            dir.view.base(index - 1)
        };
        let y2 = dir.view.base(index);
        let y = y1 + (delta * (y2 - y1) as f64).round() as i64;
        debug_assert!(y1 <= y && y <= y2);
        Ok(y)
    }
}

fn scale(values: &mut [f64], factor: f64) {
    for v in values {
        *v *= factor;
    }
}
