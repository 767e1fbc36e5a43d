//! # Analysis Statistics
//!
//! Additive counters shared by all workers. Updates are commutative
//! increments, so relaxed atomics are sufficient and no lock is needed.

use std::sync::atomic::{AtomicU64, Ordering};

/// Run-level statistics accumulated across workers
#[derive(Debug, Default)]
pub struct AnalysisStats {
    n_markers: AtomicU64,
    n_samples: AtomicU64,
    n_segments: AtomicU64,
    discord_count: AtomicU64,
    total_count: AtomicU64,
}

impl AnalysisStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_markers(&self, count: u64) {
        self.n_markers.fetch_add(count, Ordering::Relaxed);
    }

    pub fn n_markers(&self) -> u64 {
        self.n_markers.load(Ordering::Relaxed)
    }

    pub fn add_samples(&self, count: u64) {
        self.n_samples.fetch_add(count, Ordering::Relaxed);
    }

    pub fn n_samples(&self) -> u64 {
        self.n_samples.load(Ordering::Relaxed)
    }

    pub fn increment_segments(&self) {
        self.n_segments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn n_segments(&self) -> u64 {
        self.n_segments.load(Ordering::Relaxed)
    }

    /// Fold one segment's allele discordance counts into the running rate
    pub fn update_discord_rate(&self, discordant: u64, total: u64) {
        debug_assert!(discordant <= total);
        self.discord_count.fetch_add(discordant, Ordering::Relaxed);
        self.total_count.fetch_add(total, Ordering::Relaxed);
    }

    /// Pooled allele discordance rate across all examined segments
    pub fn discord_rate(&self) -> f64 {
        let num = self.discord_count.load(Ordering::Relaxed);
        let den = self.total_count.load(Ordering::Relaxed);
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = AnalysisStats::new();
        stats.add_markers(10);
        stats.add_markers(5);
        stats.add_samples(3);
        stats.increment_segments();
        stats.increment_segments();
        stats.update_discord_rate(1, 100);
        stats.update_discord_rate(3, 100);

        assert_eq!(stats.n_markers(), 15);
        assert_eq!(stats.n_samples(), 3);
        assert_eq!(stats.n_segments(), 2);
        assert!((stats.discord_rate() - 0.02).abs() < 1e-12);
    }
}
