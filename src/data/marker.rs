//! # Marker Definitions
//!
//! Genomic marker (variant site) representation. The endpoint model only
//! consumes allele indices, so markers carry an allele count rather than
//! allele sequences.

use std::sync::Arc;

use crate::error::{IbdEndsError, Result};

/// A genomic marker (variant site) on the analysis chromosome
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Marker {
    /// 1-based genomic position
    pub pos: i64,
    /// Variant ID (rsID or similar), None if missing
    pub id: Option<Arc<str>>,
    /// Total number of alleles (ref + alts)
    pub n_alleles: u16,
}

impl Marker {
    pub fn new(pos: i64, id: Option<Arc<str>>, n_alleles: u16) -> Self {
        Self { pos, id, n_alleles }
    }

    pub fn n_alleles(&self) -> usize {
        self.n_alleles as usize
    }
}

/// The ordered markers of a single chromosome
#[derive(Clone, Debug)]
pub struct Markers {
    chrom: Arc<str>,
    markers: Vec<Marker>,
}

impl Markers {
    /// Create from a chromosome name and an ordered marker list.
    ///
    /// Positions must be strictly increasing and every marker must have at
    /// least two alleles.
    pub fn new(chrom: &str, markers: Vec<Marker>) -> Result<Self> {
        for pair in markers.windows(2) {
            if pair[1].pos <= pair[0].pos {
                return Err(IbdEndsError::invalid_data(format!(
                    "marker positions not strictly increasing on {}: {} then {}",
                    chrom, pair[0].pos, pair[1].pos
                )));
            }
        }
        if let Some(m) = markers.iter().find(|m| m.n_alleles < 2) {
            return Err(IbdEndsError::invalid_data(format!(
                "marker at {}:{} has fewer than two alleles",
                chrom, m.pos
            )));
        }
        Ok(Self {
            chrom: chrom.into(),
            markers,
        })
    }

    /// Chromosome name
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    /// Number of markers
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Get marker by index
    pub fn marker(&self, idx: usize) -> &Marker {
        &self.markers[idx]
    }

    /// Iterate over markers
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }
}

impl std::ops::Index<usize> for Markers {
    type Output = Marker;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.markers[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_validation() {
        let ok = Markers::new(
            "1",
            vec![Marker::new(100, None, 2), Marker::new(200, None, 3)],
        );
        assert!(ok.is_ok());

        let out_of_order = Markers::new(
            "1",
            vec![Marker::new(200, None, 2), Marker::new(100, None, 2)],
        );
        assert!(out_of_order.is_err());

        let monoallelic = Markers::new("1", vec![Marker::new(100, None, 1)]);
        assert!(monoallelic.is_err());
    }

    #[test]
    fn test_markers_access() {
        let markers = Markers::new(
            "chr2",
            vec![Marker::new(10, None, 2), Marker::new(20, None, 2)],
        )
        .unwrap();
        assert_eq!(markers.chrom(), "chr2");
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[1].pos, 20);
    }
}
