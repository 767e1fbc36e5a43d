//! # Coalescent Length Prior
//!
//! The prior probability F(y; Ne) that an IBD segment containing a focal
//! point ends within `y` Morgans of it, under a constant effective
//! population size, together with its inverse. Both functions are pure and
//! fail fast on domain violations.

use crate::error::{IbdEndsError, Result};

/// The probability that an IBD segment containing a focal point has its
/// end point less than `y` Morgans from the focal point.
///
/// Errors if `y <= 0`, `y` is NaN, or `ne` is not positive and finite.
pub fn cdf(y: f64, ne: f64) -> Result<f64> {
    if y <= 0.0 || y.is_nan() {
        return Err(IbdEndsError::algorithm(format!(
            "invalid Morgan distance: {}",
            y
        )));
    }
    check_ne(ne)?;
    let den = 2.0 * ne * f64::exp_m1(2.0 * y) + 1.0;
    Ok(1.0 - 1.0 / den)
}

/// A value `y` such that `cdf(y, ne)` is approximately `p`.
///
/// Errors if `p` is outside (0, 1) or NaN, or `ne` is not positive and
/// finite.
pub fn inv_cdf(p: f64, ne: f64) -> Result<f64> {
    if p <= 0.0 || p >= 1.0 || p.is_nan() {
        return Err(IbdEndsError::algorithm(format!(
            "invalid probability: {}",
            p
        )));
    }
    check_ne(ne)?;
    let d = 2.0 * ne * (1.0 - p);
    Ok(0.5 * ((p + d) / d).ln())
}

fn check_ne(ne: f64) -> Result<()> {
    if ne <= 0.0 || !ne.is_finite() {
        return Err(IbdEndsError::algorithm(format!(
            "invalid effective population size: {}",
            ne
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for &ne in &[100.0, 10_000.0, 1e6] {
            for &y in &[1e-6, 1e-3, 0.01, 0.1, 1.0, 5.0] {
                let p = cdf(y, ne).unwrap();
                assert!(p > 0.0 && p < 1.0);
                let back = inv_cdf(p, ne).unwrap();
                assert!(
                    (back - y).abs() < 1e-9,
                    "round trip failed: y={} ne={} back={}",
                    y,
                    ne,
                    back
                );
            }
        }
    }

    #[test]
    fn test_monotone() {
        let ne = 10_000.0;
        let mut last = 0.0;
        for i in 1..100 {
            let p = cdf(i as f64 * 0.01, ne).unwrap();
            assert!(p > last);
            last = p;
        }
    }

    #[test]
    fn test_domain_errors() {
        assert!(cdf(0.0, 10_000.0).is_err());
        assert!(cdf(-1.0, 10_000.0).is_err());
        assert!(cdf(f64::NAN, 10_000.0).is_err());
        assert!(cdf(0.1, 0.0).is_err());
        assert!(cdf(0.1, f64::INFINITY).is_err());
        assert!(inv_cdf(0.0, 10_000.0).is_err());
        assert!(inv_cdf(1.0, 10_000.0).is_err());
        assert!(inv_cdf(f64::NAN, 10_000.0).is_err());
        assert!(inv_cdf(0.5, -1.0).is_err());
    }
}
