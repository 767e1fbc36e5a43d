//! # Marker Frame
//!
//! The shared immutable input of the analysis: the phased allele matrix,
//! base-pair and Morgan positions per marker, and the reverse-orientation
//! mirrors. The reverse orientation is a virtual view that remaps marker
//! index `i` to `M - 1 - i` at read time; its position arrays hold the
//! negated positions in reverse order so every downstream computation can
//! treat both directions as "forward".

use std::sync::Arc;

use crate::data::genetic_map::ChromMap;
use crate::data::haplotype::Samples;
use crate::data::marker::Markers;
use crate::error::{IbdEndsError, Result};

/// Window used to anchor position interpolation beyond the marker range
const BASE_POS_BACKOFF: i64 = 5_000_000;

/// Scan direction over the marker frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
}

/// Phased haplotype data for one chromosome with both orientations
pub struct MarkerFrame {
    markers: Markers,
    samples: Arc<Samples>,
    /// Allele matrix, marker-major: `alleles[m * n_haps + h]`
    alleles: Vec<u8>,
    n_haps: usize,
    fwd_base: Vec<i64>,
    rev_base: Vec<i64>,
    fwd_morgans: Vec<f64>,
    rev_morgans: Vec<f64>,
}

impl MarkerFrame {
    /// Build a frame from markers, samples, a marker-major allele matrix,
    /// and the genetic map of the markers' chromosome.
    pub fn new(
        markers: Markers,
        samples: Arc<Samples>,
        alleles: Vec<u8>,
        chrom_map: &ChromMap,
    ) -> Result<Self> {
        let n_markers = markers.len();
        let n_haps = samples.n_haps();
        if n_markers < 2 {
            return Err(IbdEndsError::invalid_data(format!(
                "chromosome {} has fewer than two markers after filtering",
                markers.chrom()
            )));
        }
        if alleles.len() != n_markers * n_haps {
            return Err(IbdEndsError::invalid_data(format!(
                "allele matrix size {} does not match {} markers x {} haplotypes",
                alleles.len(),
                n_markers,
                n_haps
            )));
        }

        let fwd_base: Vec<i64> = markers.iter().map(|m| m.pos).collect();
        let cm = chrom_map.marker_cm_positions(&fwd_base);
        let fwd_morgans: Vec<f64> = cm.iter().map(|&c| 0.01 * c).collect();
        let rev_base: Vec<i64> = fwd_base.iter().rev().map(|&p| -p).collect();
        let rev_morgans: Vec<f64> = fwd_morgans.iter().rev().map(|&m| -m).collect();

        Ok(Self {
            markers,
            samples,
            alleles,
            n_haps,
            fwd_base,
            rev_base,
            fwd_morgans,
            rev_morgans,
        })
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn n_haps(&self) -> usize {
        self.n_haps
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    pub fn chrom(&self) -> &str {
        self.markers.chrom()
    }

    /// Allele of haplotype `hap` at marker `marker`, forward orientation
    #[inline]
    pub fn allele(&self, marker: usize, hap: usize) -> u8 {
        self.alleles[marker * self.n_haps + hap]
    }

    /// A directional view of this frame
    pub fn view(&self, orientation: Orientation) -> FrameView<'_> {
        FrameView {
            frame: self,
            reversed: orientation == Orientation::Reverse,
        }
    }
}

/// A directional (forward or reverse) read-only view of a `MarkerFrame`
#[derive(Clone, Copy)]
pub struct FrameView<'a> {
    frame: &'a MarkerFrame,
    reversed: bool,
}

impl<'a> FrameView<'a> {
    pub fn n_markers(&self) -> usize {
        self.frame.n_markers()
    }

    pub fn n_haps(&self) -> usize {
        self.frame.n_haps()
    }

    /// Allele of haplotype `hap` at view marker index `marker`
    #[inline]
    pub fn allele(&self, marker: usize, hap: usize) -> u8 {
        let m = if self.reversed {
            self.frame.n_markers() - 1 - marker
        } else {
            marker
        };
        self.frame.allele(m, hap)
    }

    /// Base positions in view order (negated for the reverse view)
    pub fn bases(&self) -> &'a [i64] {
        if self.reversed {
            &self.frame.rev_base
        } else {
            &self.frame.fwd_base
        }
    }

    /// Morgan positions in view order (negated for the reverse view)
    pub fn morgans(&self) -> &'a [f64] {
        if self.reversed {
            &self.frame.rev_morgans
        } else {
            &self.frame.fwd_morgans
        }
    }

    /// Base position of a view marker; the one-past-the-end index maps to
    /// `i64::MAX` so "no further discordance" compares above any position.
    #[inline]
    pub fn base(&self, marker: usize) -> i64 {
        if marker == self.n_markers() {
            i64::MAX
        } else {
            self.bases()[marker]
        }
    }

    /// Morgan position of a view marker
    #[inline]
    pub fn morgan(&self, marker: usize) -> f64 {
        self.morgans()[marker]
    }

    /// Index of the first marker strictly past the given base position
    pub fn next_marker(&self, pos: i64) -> usize {
        match self.bases().binary_search(&pos) {
            Ok(i) => i + 1,
            Err(ins) => ins,
        }
    }

    /// Estimated Morgan position of a base-pair position, by linear
    /// interpolation between the two nearest markers. Positions beyond the
    /// marker range interpolate over a window anchored `BASE_POS_BACKOFF`
    /// base pairs inside the terminal marker.
    pub fn base_to_morgans(&self, pos: i64) -> f64 {
        morgan_at(self.bases(), self.morgans(), pos)
    }

    /// First view marker index at or after `marker` where the two
    /// haplotypes carry discordant alleles; `n_markers()` if none.
    pub fn fwd_discord(&self, hap1: usize, hap2: usize, marker: usize) -> usize {
        let end = self.n_markers();
        let mut m = marker;
        while m < end && self.allele(m, hap1) == self.allele(m, hap2) {
            m += 1;
        }
        m
    }
}

/// Linear interpolation of a Morgan position from parallel, strictly
/// increasing base and Morgan arrays.
fn morgan_at(base: &[i64], morgans: &[f64], pos: i64) -> f64 {
    debug_assert_eq!(base.len(), morgans.len());
    match base.binary_search(&pos) {
        Ok(i) => morgans[i],
        Err(ins) => {
            let last = base.len() - 1;
            let mut a = ins as isize - 1;
            let mut b = ins;
            if a == last as isize {
                // past the last marker: anchor the slope on a window ending
                // at the last marker
                let target = base[last] - BASE_POS_BACKOFF;
                let anchor = match base.binary_search(&target) {
                    Ok(i) => i as isize,
                    Err(i) => i as isize - 1,
                };
                a = anchor.max(0);
                b = last;
            } else if b == 0 {
                // before the first marker: anchor the slope on a window
                // starting at the first marker
                let target = base[0] + BASE_POS_BACKOFF;
                let anchor = match base.binary_search(&target) {
                    Ok(i) => i,
                    Err(i) => i,
                };
                a = 0;
                b = anchor.min(last);
            }
            let (a, b) = (a as usize, b);
            let (x1, x2) = (base[a], base[b]);
            let (y1, y2) = (morgans[a], morgans[b]);
            y1 + ((pos - x1) as f64 / (x2 - x1) as f64) * (y2 - y1)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::data::genetic_map::GeneticMap;
    use crate::data::marker::{Marker, Markers};
    use std::io::Cursor;

    /// Build a frame from explicit positions, a uniform cM/bp rate, and
    /// marker-major allele rows.
    pub(crate) fn frame_from_parts(
        chrom: &str,
        sample_ids: &[&str],
        positions: &[i64],
        cm_per_bp: f64,
        rows: &[&[u8]],
    ) -> MarkerFrame {
        let n_alleles = rows
            .iter()
            .flat_map(|r| r.iter())
            .map(|&a| a as u16 + 1)
            .max()
            .unwrap_or(2)
            .max(2);
        let markers = Markers::new(
            chrom,
            positions
                .iter()
                .map(|&p| Marker::new(p, None, n_alleles))
                .collect(),
        )
        .unwrap();
        let samples = Arc::new(Samples::from_ids(
            sample_ids.iter().map(|s| s.to_string()).collect(),
        ));
        let alleles: Vec<u8> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        let first = positions[0];
        let last = positions[positions.len() - 1];
        let map_text = format!(
            "{c} . 0.0 {first}\n{c} . {cm} {last}\n",
            c = chrom,
            first = first,
            cm = (last - first) as f64 * cm_per_bp,
            last = last,
        );
        let gen_map = GeneticMap::from_reader(Cursor::new(map_text)).unwrap();
        let chrom_map = gen_map.chrom_map(chrom).unwrap();
        MarkerFrame::new(markers, samples, alleles, chrom_map).unwrap()
    }

    /// Two samples, four markers at 100..400, 1 cM per 100 bp
    pub(crate) fn small_frame() -> MarkerFrame {
        frame_from_parts(
            "1",
            &["A", "B"],
            &[100, 200, 300, 400],
            0.01,
            &[
                &[0, 0, 1, 1], // pos 100
                &[0, 1, 0, 1], // pos 200
                &[1, 1, 1, 1], // pos 300
                &[0, 0, 0, 0], // pos 400
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::tests_support::small_frame;
    use super::*;

    fn test_frame() -> MarkerFrame {
        small_frame()
    }

    #[test]
    fn test_reverse_mirrors() {
        let frame = test_frame();
        let fwd = frame.view(Orientation::Forward);
        let rev = frame.view(Orientation::Reverse);
        let m = frame.n_markers();
        for i in 0..m {
            assert_eq!(rev.bases()[i], -fwd.bases()[m - 1 - i]);
            assert!((rev.morgans()[i] + fwd.morgans()[m - 1 - i]).abs() < 1e-15);
            for h in 0..frame.n_haps() {
                assert_eq!(rev.allele(i, h), fwd.allele(m - 1 - i, h));
            }
        }
        assert!(rev.bases().windows(2).all(|w| w[1] > w[0]));
        assert!(rev.morgans().windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_next_marker_and_discord() {
        let frame = test_frame();
        let fwd = frame.view(Orientation::Forward);
        assert_eq!(fwd.next_marker(50), 0);
        assert_eq!(fwd.next_marker(100), 1);
        assert_eq!(fwd.next_marker(250), 2);
        assert_eq!(fwd.next_marker(400), 4);

        // haps 0 and 1 agree everywhere except pos 200
        assert_eq!(fwd.fwd_discord(0, 1, 0), 1);
        assert_eq!(fwd.fwd_discord(0, 1, 2), 4);
        assert_eq!(fwd.base(4), i64::MAX);
    }

    #[test]
    fn test_morgan_interpolation() {
        let frame = test_frame();
        let fwd = frame.view(Orientation::Forward);
        // map is linear: 1 cM per 100 bp, so 0.0001 Morgans per bp
        assert!((fwd.base_to_morgans(100) - 0.0).abs() < 1e-12);
        assert!((fwd.base_to_morgans(250) - 0.015).abs() < 1e-9);
        // past the last marker extrapolates from the terminal window
        let beyond = fwd.base_to_morgans(500);
        assert!(beyond > fwd.morgan(3));
    }
}
