//! # Two-Sided Endpoint Refinement
//!
//! Alternates forward and backward quantile estimation for one shared
//! segment, adopting each side's convergence-quantile endpoint and
//! re-centering the focus until two consecutive iterations (one per side)
//! leave the endpoints unchanged.

use std::sync::Arc;

use crate::data::segment::SharedSegment;
use crate::error::{IbdEndsError, Result};
use crate::model::{EndpointModel, QuantileEstimator};

/// Iterative endpoint refinement for one worker.
///
/// Instances are not thread-safe; each worker owns one.
pub struct IbdEnds {
    model: Arc<EndpointModel>,
    estimator: QuantileEstimator,
    /// Last iteration allowed to adopt a new endpoint; the per-side cap is
    /// doubled because the two ends alternate
    last_update_it: usize,
    max_rel_diff: f64,
    fix_focus: bool,
}

/// Mutable per-segment refinement state
struct SegmentState {
    start_pos: i64,
    end_pos: i64,
    focus_pos: i64,
    start_morgans: f64,
    end_morgans: f64,
    focus_morgans: f64,
}

impl IbdEnds {
    pub fn new(model: Arc<EndpointModel>) -> Self {
        let params = model.params();
        let last_update_it = (params.max_its << 1).saturating_sub(2);
        let max_rel_diff = params.max_diff;
        let fix_focus = params.fix_focus;
        let estimator = QuantileEstimator::new(Arc::clone(&model));
        Self {
            model,
            estimator,
            last_update_it,
            max_rel_diff,
            fix_focus,
        }
    }

    pub fn model(&self) -> &Arc<EndpointModel> {
        &self.model
    }

    /// Compute the forward and backward endpoint quantiles of a segment.
    ///
    /// Element 0 of each probability slice is the convergence probability
    /// whose endpoint drives the iteration; the remaining elements are
    /// reported to the caller unchanged in meaning. Returns the focus base
    /// position from which endpoint distances were measured.
    pub fn get_ends(
        &mut self,
        seg: &SharedSegment,
        fwd_probs: &[f64],
        fwd_quantiles: &mut [i64],
        bwd_probs: &[f64],
        bwd_quantiles: &mut [i64],
    ) -> Result<i64> {
        if fwd_probs.is_empty() || bwd_probs.is_empty() {
            return Err(IbdEndsError::algorithm(
                "at least one probability is required per side",
            ));
        }
        let h1 = seg.hap1() as usize;
        let h2 = seg.hap2() as usize;
        let focus_pos = (seg.start() + seg.incl_end()) >> 1;
        let mut state = SegmentState {
            start_pos: seg.start(),
            end_pos: seg.incl_end(),
            focus_pos,
            start_morgans: self.model.base_to_morgans(seg.start()),
            end_morgans: self.model.base_to_morgans(seg.incl_end()),
            focus_morgans: self.model.base_to_morgans(focus_pos),
        };

        // converged once a forward and a backward pass both leave their
        // endpoint unchanged
        let mut no_update_count = 0;
        let mut it = 0;
        while no_update_count < 2 {
            let updated = if it & 1 == 0 {
                self.estimator.fwd_quantiles(
                    h1,
                    h2,
                    state.start_morgans,
                    state.focus_pos,
                    fwd_probs,
                    fwd_quantiles,
                )?;
                self.update_end_pos(seg, it, fwd_quantiles[0], &mut state)
            } else {
                self.estimator.bwd_quantiles(
                    h1,
                    h2,
                    state.focus_pos,
                    state.end_morgans,
                    bwd_probs,
                    bwd_quantiles,
                )?;
                self.update_start_pos(seg, it, bwd_quantiles[0], &mut state)
            };
            no_update_count = if updated { 0 } else { no_update_count + 1 };
            it += 1;
        }
        Ok(state.focus_pos)
    }

    fn update_end_pos(
        &self,
        seg: &SharedSegment,
        it: usize,
        new_end_pos: i64,
        state: &mut SegmentState,
    ) -> bool {
        if it >= self.last_update_it {
            return false;
        }
        let new_end_pos = new_end_pos.min(seg.incl_end());
        let new_end_morgans = self.model.base_to_morgans(new_end_pos);
        if self.no_endpoint_change(state.focus_morgans, state.end_morgans, new_end_morgans) {
            return false;
        }
        state.end_pos = new_end_pos;
        state.end_morgans = new_end_morgans;
        if !self.fix_focus {
            state.focus_pos = (state.start_pos + state.end_pos) >> 1;
            state.focus_morgans = self.model.base_to_morgans(state.focus_pos);
        }
        true
    }

    fn update_start_pos(
        &self,
        seg: &SharedSegment,
        it: usize,
        new_start_pos: i64,
        state: &mut SegmentState,
    ) -> bool {
        if it >= self.last_update_it {
            return false;
        }
        let new_start_pos = new_start_pos.max(seg.start());
        let new_start_morgans = self.model.base_to_morgans(new_start_pos);
        if self.no_endpoint_change(state.focus_morgans, state.start_morgans, new_start_morgans) {
            return false;
        }
        state.start_pos = new_start_pos;
        state.start_morgans = new_start_morgans;
        if !self.fix_focus {
            state.focus_pos = (state.start_pos + state.end_pos) >> 1;
            state.focus_morgans = self.model.base_to_morgans(state.focus_pos);
        }
        true
    }

    fn no_endpoint_change(&self, focus_morgans: f64, old_morgans: f64, new_morgans: f64) -> bool {
        let before = old_morgans - focus_morgans;
        let after = new_morgans - focus_morgans;
        if before == 0.0 {
            return false;
        }
        ((after - before) / before).abs() < self.max_rel_diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::tests_support::frame_from_parts;
    use crate::data::frame::MarkerFrame;
    use crate::model::ModelParams;

    fn uniform_frame() -> MarkerFrame {
        frame_from_parts(
            "1",
            &["A", "B"],
            &[100, 200, 300, 400, 500],
            0.01,
            &[
                &[1, 1, 1, 1],
                &[1, 1, 1, 1],
                &[1, 1, 1, 1],
                &[1, 1, 1, 1],
                &[1, 1, 1, 1],
            ],
        )
    }

    fn build(frame: MarkerFrame, params: ModelParams) -> Arc<EndpointModel> {
        Arc::new(EndpointModel::new(params, Arc::new(frame)).unwrap())
    }

    fn params() -> ModelParams {
        ModelParams {
            seed: 1,
            err: 1e-3,
            gc_err: 1e-3,
            global_pos: 50,
            global_segments: 50,
            ..ModelParams::default()
        }
    }

    #[test]
    fn test_clamping_and_focus() {
        let model = build(uniform_frame(), params());
        let mut ends = IbdEnds::new(Arc::clone(&model));
        let seg = SharedSegment::new(0, 1, 100, 500).unwrap();
        let probs = [0.05, 0.5];
        let mut fwd = [0i64; 2];
        let mut bwd = [0i64; 2];
        let focus = ends.get_ends(&seg, &probs, &mut fwd, &probs, &mut bwd).unwrap();

        assert!(focus > seg.start() && focus < seg.incl_end());
        for &e in &fwd {
            assert!(e > focus && e <= seg.incl_end());
        }
        for &e in &bwd {
            assert!(e < focus && e >= seg.start());
        }
    }

    #[test]
    fn test_fixed_focus_stays_at_midpoint() {
        let seg = SharedSegment::new(0, 1, 100, 500).unwrap();
        let probs = [0.5];
        let mut fwd = [0i64];
        let mut bwd = [0i64];
        let fixed = build(
            uniform_frame(),
            ModelParams {
                fix_focus: true,
                ..params()
            },
        );
        let mut ends = IbdEnds::new(fixed);
        let focus = ends.get_ends(&seg, &probs, &mut fwd, &probs, &mut bwd).unwrap();
        assert_eq!(focus, 300);
    }

    #[test]
    fn test_iteration_cap() {
        // max_its = 1 doubles to 2; the cap trips on the first updates and
        // the loop must halt after at most 2 further no-change passes
        let model = build(
            uniform_frame(),
            ModelParams {
                max_its: 1,
                ..params()
            },
        );
        let mut ends = IbdEnds::new(model);
        let seg = SharedSegment::new(0, 1, 100, 500).unwrap();
        let probs = [0.5];
        let mut fwd = [0i64];
        let mut bwd = [0i64];
        let focus = ends.get_ends(&seg, &probs, &mut fwd, &probs, &mut bwd).unwrap();
        assert_eq!(focus, 300);
        assert!(fwd[0] > 300 && bwd[0] < 300);
    }

    #[test]
    fn test_empty_probs_rejected() {
        let model = build(uniform_frame(), params());
        let mut ends = IbdEnds::new(model);
        let seg = SharedSegment::new(0, 1, 100, 500).unwrap();
        assert!(ends.get_ends(&seg, &[], &mut [], &[0.5], &mut [0]).is_err());
    }
}
