//! # Shared IBD Segments
//!
//! A shared chromosome segment for a pair of haplotypes, plus the parser
//! for the whitespace-delimited segment records produced by an upstream
//! IBD detector.

use std::collections::HashMap;
use std::sync::Arc;

use crate::data::frame::{MarkerFrame, Orientation};
use crate::error::{IbdEndsError, Result};

/// A shared chromosome segment between two haplotypes.
///
/// Segments order by `(hap1, hap2, start, incl_end)`, consistent with
/// equality.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedSegment {
    hap1: u32,
    hap2: u32,
    start: i64,
    incl_end: i64,
}

impl SharedSegment {
    /// Create a new segment; `start` must not exceed `incl_end`.
    pub fn new(hap1: u32, hap2: u32, start: i64, incl_end: i64) -> Result<Self> {
        if incl_end < start {
            return Err(IbdEndsError::invalid_data(format!(
                "segment start > end: start={} end={}",
                start, incl_end
            )));
        }
        Ok(Self {
            hap1,
            hap2,
            start,
            incl_end,
        })
    }

    pub fn hap1(&self) -> u32 {
        self.hap1
    }

    pub fn hap2(&self) -> u32 {
        self.hap2
    }

    /// Starting coordinate (inclusive)
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Ending coordinate (inclusive)
    pub fn incl_end(&self) -> i64 {
        self.incl_end
    }

    /// Deterministic key mixed into the per-segment RNG seed, so sampled
    /// endpoint draws do not depend on thread scheduling.
    pub fn seed_key(&self) -> u64 {
        let mut hash: u64 = 3;
        for v in [
            self.hap1 as u64,
            self.hap2 as u64,
            self.start as u64,
            self.incl_end as u64,
        ] {
            hash = hash.wrapping_mul(43).wrapping_add(v);
        }
        hash
    }
}

/// Parser for whitespace-delimited IBD segment records.
///
/// The first seven fields of a record are: sample1, haplotype index (1 or
/// 2), sample2, haplotype index, chromosome, start position (inclusive),
/// end position (inclusive). Records naming an unknown sample or
/// chromosome are skipped; malformed records are fatal. Positions are
/// clamped to the marker range of the analysis chromosome.
pub struct SegmentParser {
    chrom: Arc<str>,
    min_start: i64,
    max_incl_end: i64,
    sample_map: HashMap<Arc<str>, u32>,
}

impl SegmentParser {
    pub fn new(frame: &MarkerFrame) -> Self {
        let bases = frame.view(Orientation::Forward).bases();
        let sample_map = frame
            .samples()
            .ids()
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i as u32))
            .collect();
        Self {
            chrom: frame.chrom().into(),
            min_start: bases[0],
            max_incl_end: bases[bases.len() - 1],
            sample_map,
        }
    }

    /// Parse one segment record.
    ///
    /// Returns `Ok(None)` when the record's samples or chromosome are not
    /// part of the analysis data, or when the segment lies entirely
    /// outside the marker range.
    pub fn parse(&self, line: &str) -> Result<Option<SharedSegment>> {
        let fields: Vec<&str> = line.split_whitespace().take(8).collect();
        if fields.len() < 7 {
            return Err(IbdEndsError::invalid_data(format!(
                "IBD segment does not have at least 7 white-space delimited fields [{}]",
                line
            )));
        }
        let s1 = self.sample_map.get(fields[0]);
        let s2 = self.sample_map.get(fields[2]);
        let (s1, s2) = match (s1, s2) {
            (Some(&a), Some(&b)) if *self.chrom == *fields[4] => (a, b),
            _ => return Ok(None),
        };
        let hap1 = (s1 << 1) + parse_hap(line, fields[1])? - 1;
        let hap2 = (s2 << 1) + parse_hap(line, fields[3])? - 1;
        let start: i64 = parse_pos(line, fields[5])?;
        let incl_end: i64 = parse_pos(line, fields[6])?;
        if start > incl_end {
            return Err(IbdEndsError::invalid_data(format!(
                "start > end. start={} end={} [{}]",
                start, incl_end, line
            )));
        }
        if incl_end <= self.min_start || start >= self.max_incl_end {
            return Ok(None);
        }
        let start = start.max(self.min_start);
        let incl_end = incl_end.min(self.max_incl_end);
        Ok(Some(SharedSegment::new(hap1, hap2, start, incl_end)?))
    }
}

fn parse_hap(line: &str, field: &str) -> Result<u32> {
    match field {
        "1" => Ok(1),
        "2" => Ok(2),
        _ => Err(IbdEndsError::invalid_data(format!(
            "haplotype index ({}) is not 1 or 2 [{}]",
            field, line
        ))),
    }
}

fn parse_pos(line: &str, field: &str) -> Result<i64> {
    field.parse().map_err(|_| {
        IbdEndsError::invalid_data(format!("unparsable position ({}) [{}]", field, line))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::tests_support::small_frame;

    #[test]
    fn test_segment_ordering() {
        let a = SharedSegment::new(0, 1, 100, 200).unwrap();
        let b = SharedSegment::new(0, 1, 100, 300).unwrap();
        let c = SharedSegment::new(0, 2, 50, 60).unwrap();
        assert!(a < b);
        assert!(b < c);
        assert!(SharedSegment::new(0, 1, 200, 100).is_err());
    }

    #[test]
    fn test_seed_key_distinct() {
        let a = SharedSegment::new(0, 1, 100, 200).unwrap();
        let b = SharedSegment::new(0, 1, 100, 201).unwrap();
        assert_ne!(a.seed_key(), b.seed_key());
        assert_eq!(a.seed_key(), SharedSegment::new(0, 1, 100, 200).unwrap().seed_key());
    }

    #[test]
    fn test_parse() {
        let frame = small_frame();
        let parser = SegmentParser::new(&frame);

        let seg = parser.parse("A\t1\tB\t2\t1\t150\t350").unwrap().unwrap();
        assert_eq!(seg.hap1(), 0);
        assert_eq!(seg.hap2(), 3);
        assert_eq!(seg.start(), 150);
        assert_eq!(seg.incl_end(), 350);

        // clamped to the marker range
        let seg = parser.parse("A 2 B 1 1 10 9999").unwrap().unwrap();
        assert_eq!(seg.start(), 100);
        assert_eq!(seg.incl_end(), 400);

        // unknown sample or chromosome is a silent skip
        assert!(parser.parse("A 1 Z 2 1 150 350").unwrap().is_none());
        assert!(parser.parse("A 1 B 2 17 150 350").unwrap().is_none());
        // entirely outside the marker range
        assert!(parser.parse("A 1 B 2 1 500 900").unwrap().is_none());

        // malformed records are fatal
        assert!(parser.parse("A 1 B").is_err());
        assert!(parser.parse("A 3 B 2 1 150 350").is_err());
        assert!(parser.parse("A 1 B 2 1 350 150").is_err());
        assert!(parser.parse("A 1 B 2 1 abc 350").is_err());
    }
}
