//! # Haplotype and Sample Definitions
//!
//! Sample and haplotype index types for diploid, phased data.

use std::collections::HashMap;
use std::sync::Arc;

/// Zero-cost newtype for sample indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SampleIdx(pub u32);

impl SampleIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Get the first haplotype index for this sample
    pub fn hap1(self) -> HapIdx {
        HapIdx::new(self.0 * 2)
    }

    /// Get the second haplotype index for this sample
    pub fn hap2(self) -> HapIdx {
        HapIdx::new(self.0 * 2 + 1)
    }
}

impl From<usize> for SampleIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// Zero-cost newtype for haplotype indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct HapIdx(pub u32);

impl HapIdx {
    pub fn new(idx: u32) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Get the sample index for this haplotype
    pub fn sample(self) -> SampleIdx {
        SampleIdx::new(self.0 / 2)
    }
}

impl From<usize> for HapIdx {
    fn from(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// A collection of samples with id lookup
#[derive(Clone, Debug, Default)]
pub struct Samples {
    /// Sample IDs in column order
    ids: Vec<Arc<str>>,
    /// Map from sample ID to index for fast lookup
    id_to_idx: HashMap<Arc<str>, SampleIdx>,
}

impl Samples {
    /// Create from a vector of sample IDs
    pub fn from_ids(ids: Vec<String>) -> Self {
        let ids: Vec<Arc<str>> = ids.into_iter().map(|s| s.into()).collect();
        let id_to_idx = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), SampleIdx::new(i as u32)))
            .collect();
        Self { ids, id_to_idx }
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Number of haplotypes (two per sample)
    pub fn n_haps(&self) -> usize {
        self.ids.len() * 2
    }

    /// Look up a sample index by id
    pub fn index_of(&self, id: &str) -> Option<SampleIdx> {
        self.id_to_idx.get(id).copied()
    }

    /// Get all sample IDs
    pub fn ids(&self) -> &[Arc<str>] {
        &self.ids
    }
}

impl std::ops::Index<SampleIdx> for Samples {
    type Output = str;

    fn index(&self, idx: SampleIdx) -> &Self::Output {
        &self.ids[idx.as_usize()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_hap_indices() {
        let sample = SampleIdx::new(5);
        assert_eq!(sample.hap1(), HapIdx::new(10));
        assert_eq!(sample.hap2(), HapIdx::new(11));
        assert_eq!(HapIdx::new(11).sample(), sample);
    }

    #[test]
    fn test_samples_lookup() {
        let samples = Samples::from_ids(vec!["A".to_string(), "B".to_string(), "C".to_string()]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples.n_haps(), 6);
        assert_eq!(samples.index_of("B"), Some(SampleIdx::new(1)));
        assert_eq!(samples.index_of("Z"), None);
        assert_eq!(&samples[SampleIdx::new(2)], "C");
    }
}
