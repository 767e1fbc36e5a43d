//! # Local IBS Survival Counts
//!
//! For each start marker, counts how many ordered haplotype pairs from a
//! seeded random subsample remain identical by state through each
//! successive end marker, truncating a row once the surviving fraction
//! falls below `1 - max_local_cdf`.
//!
//! Haplotypes are partitioned into equivalence classes by their allele
//! sequence from the start marker onward. The partition is refined one
//! marker at a time with a sequence-coded class index
//! (`old_class * n_alleles + allele`), re-bucketed through a scratch map so
//! no per-marker allocation is needed. Haplotypes whose class becomes a
//! singleton can never pair again and drop out of the scan.
//!
//! Rows are stored as one flat buffer plus an offset vector.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::data::frame::MarkerFrame;
use crate::error::{IbdEndsError, Result};
use crate::model::ModelParams;

/// IBS pair counts per (start, inclusive end) marker interval
pub struct IbsCounts {
    /// Number of subsampled haplotypes
    n_haps: usize,
    /// Row offsets into `counts`; length `n_markers + 1`
    offsets: Vec<usize>,
    /// Flat row storage of ordered pair counts
    counts: Vec<u64>,
}

impl IbsCounts {
    /// Count IBS pairs for every start marker of the frame.
    ///
    /// Errors if the frame has fewer than two haplotypes or if the ordered
    /// pair count of the subsample would overflow a 31-bit signed integer.
    pub fn new(frame: &MarkerFrame, params: &ModelParams) -> Result<Self> {
        if frame.n_haps() < 2 {
            return Err(IbdEndsError::invalid_data(format!(
                "at least two haplotypes are required: {}",
                frame.n_haps()
            )));
        }
        let hap_list = subsample_haps(frame.n_haps(), params.local_haps, params.seed);
        let n = hap_list.len() as u64;
        if n * (n - 1) >= i32::MAX as u64 {
            return Err(IbdEndsError::invalid_data(format!(
                "IBS pair count overflow for {} haplotypes",
                n
            )));
        }

        let n_markers = frame.n_markers();
        // subsampled allele rows, marker-major
        let rows: Vec<Vec<u8>> = (0..n_markers)
            .into_par_iter()
            .map(|m| hap_list.iter().map(|&h| frame.allele(m, h)).collect())
            .collect();
        let monomorphic: Vec<bool> = rows
            .par_iter()
            .map(|row| row.windows(2).all(|w| w[0] == w[1]))
            .collect();

        let min_ibs_pairs =
            (((1.0 - params.max_local_cdf) * n as f64) * (n - 1) as f64).ceil() as u64;
        let n_alleles: Vec<usize> = (0..n_markers)
            .map(|m| frame.markers().marker(m).n_alleles())
            .collect();
        let count_rows: Vec<Vec<u64>> = (0..n_markers)
            .into_par_iter()
            .map(|start| count_row(&rows, &monomorphic, &n_alleles, start, min_ibs_pairs))
            .collect();

        Ok(Self::from_rows(hap_list.len(), count_rows))
    }

    fn from_rows(n_haps: usize, rows: Vec<Vec<u64>>) -> Self {
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        let total: usize = rows.iter().map(|r| r.len()).sum();
        let mut counts = Vec::with_capacity(total);
        for row in rows {
            counts.extend_from_slice(&row);
            offsets.push(counts.len());
        }
        Self {
            n_haps,
            offsets,
            counts,
        }
    }

    /// Number of markers
    pub fn n_markers(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of subsampled haplotypes used to generate the counts
    pub fn n_haps(&self) -> usize {
        self.n_haps
    }

    /// Number of ordered haplotype pairs that are IBS on the marker
    /// interval `[start, incl_end]`
    pub fn count(&self, start: usize, incl_end: usize) -> u64 {
        self.counts[self.offsets[start] + (incl_end - start)]
    }

    /// Exclusive end of the stored end markers for `start`
    pub fn end(&self, start: usize) -> usize {
        start + (self.offsets[start + 1] - self.offsets[start])
    }

    /// Counts for the reversed marker order, built by scanning the forward
    /// table: `reverse.count(M-1-e, M-1-s) == self.count(s, e)` for every
    /// stored interval.
    pub fn reverse(&self) -> IbsCounts {
        let n_markers = self.n_markers();
        let rows: Vec<Vec<u64>> = (0..n_markers)
            .into_par_iter()
            .map(|rev_start| {
                let incl_end = n_markers - 1 - rev_start;
                let mut row = Vec::with_capacity(1 << 8);
                let mut start = incl_end as isize;
                while start >= 0 && incl_end < self.end(start as usize) {
                    row.push(self.count(start as usize, incl_end));
                    start -= 1;
                }
                row
            })
            .collect();
        Self::from_rows(self.n_haps, rows)
    }
}

/// Select up to `max` haplotype indices with a seeded partial shuffle,
/// returned in ascending order.
fn subsample_haps(total: usize, max: usize, seed: i64) -> Vec<usize> {
    if total <= max {
        (0..total).collect()
    } else {
        let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
        let mut all: Vec<usize> = (0..total).collect();
        for j in 0..max {
            let k = rng.gen_range(j..total);
            all.swap(j, k);
        }
        let mut picked = all[..max].to_vec();
        picked.sort_unstable();
        picked
    }
}

/// Count surviving IBS pairs from one start marker.
fn count_row(
    rows: &[Vec<u8>],
    monomorphic: &[bool],
    n_alleles: &[usize],
    start: usize,
    min_ibs_pairs: u64,
) -> Vec<u64> {
    let n = rows[start].len();
    let mut cnts: Vec<u64> = Vec::with_capacity(1 << 8);
    let mut class_of: Vec<u32> = vec![0; n];
    let mut active: Vec<u32> = (0..n as u32).collect();
    let mut n_classes: usize = 1;
    // scratch map from sequence-coded key to compact class id
    let mut class_map: Vec<u32> = Vec::new();
    let mut touched: Vec<usize> = Vec::new();
    let mut sizes: Vec<u64> = Vec::new();

    let mut last_ibs = (n * (n - 1)) as u64;
    let mut m = start;
    while m < rows.len() && last_ibs >= min_ibs_pairs {
        if monomorphic[m] {
            // a monomorphic marker cannot split any class; the row still
            // advances one entry to keep interval indexing aligned
            cnts.push(last_ibs);
            m += 1;
            continue;
        }
        let na = n_alleles[m];
        let needed = n_classes * na;
        if class_map.len() < needed {
            class_map.resize(needed, u32::MAX);
        }
        sizes.clear();
        let mut next_class: u32 = 0;
        for &h in &active {
            let h = h as usize;
            let key = class_of[h] as usize * na + rows[m][h] as usize;
            let mut class = class_map[key];
            if class == u32::MAX {
                class = next_class;
                next_class += 1;
                class_map[key] = class;
                touched.push(key);
                sizes.push(0);
            }
            class_of[h] = class;
            sizes[class as usize] += 1;
        }
        for &key in &touched {
            class_map[key] = u32::MAX;
        }
        touched.clear();
        n_classes = next_class as usize;
        active.retain(|&h| sizes[class_of[h as usize] as usize] > 1);

        let ibs: u64 = sizes.iter().map(|&c| c * (c - 1)).sum();
        if ibs >= min_ibs_pairs {
            cnts.push(ibs);
        }
        last_ibs = ibs;
        m += 1;
    }
    cnts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::tests_support::frame_from_parts;

    fn test_params() -> ModelParams {
        ModelParams {
            max_local_cdf: 0.999,
            ..ModelParams::default()
        }
    }

    fn panel() -> MarkerFrame {
        // 6 haplotypes (3 samples), 5 markers
        frame_from_parts(
            "1",
            &["A", "B", "C"],
            &[100, 200, 300, 400, 500],
            0.01,
            &[
                &[0, 0, 1, 1, 0, 1],
                &[0, 1, 1, 1, 0, 0],
                &[1, 1, 1, 1, 1, 1], // monomorphic
                &[0, 0, 0, 1, 1, 1],
                &[1, 0, 1, 0, 1, 0],
            ],
        )
    }

    #[test]
    fn test_monotone_and_bounded() {
        let frame = panel();
        let cnts = IbsCounts::new(&frame, &test_params()).unwrap();
        let n = cnts.n_haps() as u64;
        for s in 0..cnts.n_markers() {
            let mut last = n * (n - 1);
            for e in s..cnts.end(s) {
                let c = cnts.count(s, e);
                assert!(c <= last, "counts must be non-increasing");
                last = c;
            }
        }
    }

    #[test]
    fn test_hand_computed_counts() {
        let frame = panel();
        let cnts = IbsCounts::new(&frame, &test_params()).unwrap();
        // start 0: marker 0 partitions haps into {0,1,4} and {2,3,5} -> 6+6=12
        assert_eq!(cnts.count(0, 0), 12);
        // marker 1 refines to {0,4} {1} {2,3} {5} -> 2+2=4 ordered pairs
        assert_eq!(cnts.count(0, 1), 4);
        // marker 2 monomorphic: row advances with the same count
        assert_eq!(cnts.count(0, 2), 4);
        // marker 3: h0=0,h4=1 split; h2=0,h3=1 split -> no pairs remain
        assert_eq!(cnts.end(0), 3);
    }

    #[test]
    fn test_reverse_duality() {
        let frame = panel();
        let cnts = IbsCounts::new(&frame, &test_params()).unwrap();
        let rev = cnts.reverse();
        let m = cnts.n_markers();
        assert_eq!(rev.n_markers(), m);
        assert_eq!(rev.n_haps(), cnts.n_haps());
        for s in 0..m {
            for e in s..cnts.end(s) {
                assert_eq!(
                    rev.count(m - 1 - e, m - 1 - s),
                    cnts.count(s, e),
                    "duality failed at s={} e={}",
                    s,
                    e
                );
            }
        }
    }

    #[test]
    fn test_truncation_threshold() {
        let frame = panel();
        let params = ModelParams {
            max_local_cdf: 0.5,
            ..ModelParams::default()
        };
        let cnts = IbsCounts::new(&frame, &params).unwrap();
        // rows stop once fewer than half the pairs survive
        let n = cnts.n_haps() as u64;
        let min = (((1.0 - 0.5) * n as f64) * (n - 1) as f64).ceil() as u64;
        for s in 0..cnts.n_markers() {
            for e in s..cnts.end(s) {
                assert!(cnts.count(s, e) >= min);
            }
        }
        assert!(cnts.end(0) <= 2);
    }

    #[test]
    fn test_two_haps_is_minimum() {
        // one sample still yields two haplotypes, which is permitted
        let frame = frame_from_parts("1", &["A"], &[100, 200], 0.01, &[&[0, 1], &[1, 0]]);
        assert!(IbsCounts::new(&frame, &test_params()).is_ok());
    }

    #[test]
    fn test_subsample_deterministic() {
        let a = subsample_haps(100, 10, 42);
        let b = subsample_haps(100, 10, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[1] > w[0]));
        assert_eq!(subsample_haps(5, 10, 42), vec![0, 1, 2, 3, 4]);
    }
}
