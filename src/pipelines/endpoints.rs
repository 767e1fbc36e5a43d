//! # Endpoint Estimation Pipeline
//!
//! Drives per-segment endpoint estimation over the whole input: a single
//! reader thread batches segment lines into a bounded queue, worker
//! threads each own an `IbdEnds` refiner and a compression buffer, and a
//! mutex-guarded sink writes whole compressed blocks so lines from one
//! input block stay consecutive in the output. Per-segment results are
//! reproducible for any thread count because each segment's sampled
//! probabilities come from an RNG reseeded with the segment's own key.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io::Write;
use tracing::info;

use crate::config::Config;
use crate::data::frame::{MarkerFrame, Orientation};
use crate::data::genetic_map::GeneticMap;
use crate::data::segment::SegmentParser;
use crate::error::{IbdEndsError, Result};
use crate::io::sink::{compress_chunk, SyncSink};
use crate::io::{open_text, spawn_block_reader, vcf, BLOCK_SIZE};
use crate::model::{EndpointModel, IbdEnds};
use crate::pipelines::stats::AnalysisStats;

/// Bytes a worker buffers before flushing a compressed block
const FLUSH_THRESHOLD: usize = 1 << 18;

/// Minimum segment length for error-rate estimation, in Morgans
const MIN_ERR_ESTIMATION_MORGANS: f64 = 0.02;

/// The whole-run endpoint estimation workflow
pub struct EndpointPipeline {
    config: Config,
}

impl EndpointPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the analysis and return the accumulated statistics.
    pub fn run(&self) -> Result<Arc<AnalysisStats>> {
        let config = &self.config;
        let stats = Arc::new(AnalysisStats::new());

        info!(map = ?config.map, "reading genetic map");
        let gen_map = GeneticMap::from_file(&config.map)?;
        let chrom_interval = config.chrom_interval()?;
        let exclude = config.load_exclude_samples()?;

        info!(gt = ?config.gt, "reading phased genotypes");
        let source = vcf::read_phased(
            &config.gt,
            &gen_map,
            chrom_interval.as_ref(),
            &exclude,
            config.min_maf,
        )?;
        let chrom_map = gen_map
            .chrom_map(source.markers.chrom())
            .ok_or_else(|| {
                IbdEndsError::invalid_data(format!(
                    "no genetic map positions for chromosome {}",
                    source.markers.chrom()
                ))
            })?;
        let frame = Arc::new(MarkerFrame::new(
            source.markers,
            source.samples,
            source.alleles,
            chrom_map,
        )?);

        info!(
            markers = frame.n_markers(),
            samples = frame.n_samples(),
            "building endpoint model"
        );
        let model = Arc::new(EndpointModel::new(config.model_params(), Arc::clone(&frame))?);
        let parser = SegmentParser::new(&frame);

        let sink = SyncSink::create(&config.ibd_out_path())?;
        let mut header = output_header(config);
        header.push('\n');
        sink.write_chunk(&compress_chunk(header.as_bytes())?)?;

        let n_threads = config.nthreads();
        info!(threads = n_threads, ibd = ?config.ibd, "estimating segment endpoints");
        let (reader_handle, rx) =
            spawn_block_reader(open_text(&config.ibd)?, BLOCK_SIZE, 2 * n_threads);

        let worker_result: Result<()> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(n_threads);
            for _ in 0..n_threads {
                let rx = rx.clone();
                let model = Arc::clone(&model);
                let parser = &parser;
                let stats = &*stats;
                let sink = &sink;
                handles.push(
                    scope.spawn(move || Worker::new(config, parser, stats, sink, model).run(rx)),
                );
            }
            drop(rx);
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| IbdEndsError::algorithm("worker thread panicked"))??;
            }
            Ok(())
        });
        worker_result?;
        reader_handle
            .join()
            .map_err(|_| IbdEndsError::algorithm("reader thread panicked"))??;

        stats.add_markers(frame.n_markers() as u64);
        stats.add_samples(frame.n_samples() as u64);
        sink.finish()?;
        info!(segments = stats.n_segments(), "analysis complete");
        Ok(stats)
    }
}

/// Per-thread segment processing state
struct Worker<'a> {
    config: &'a Config,
    parser: &'a SegmentParser,
    stats: &'a AnalysisStats,
    sink: &'a SyncSink,
    model: Arc<EndpointModel>,
    ibd_ends: IbdEnds,
    n_quantiles_p1: usize,
    fwd_probs: Vec<f64>,
    bwd_probs: Vec<f64>,
    fwd_ends: Vec<i64>,
    bwd_ends: Vec<i64>,
    buffer: Vec<u8>,
}

impl<'a> Worker<'a> {
    fn new(
        config: &'a Config,
        parser: &'a SegmentParser,
        stats: &'a AnalysisStats,
        sink: &'a SyncSink,
        model: Arc<EndpointModel>,
    ) -> Self {
        let probs = extended_probs(config);
        let n = probs.len();
        Self {
            config,
            parser,
            stats,
            sink,
            ibd_ends: IbdEnds::new(Arc::clone(&model)),
            model,
            n_quantiles_p1: config.quantiles.len() + 1,
            bwd_probs: probs.clone(),
            fwd_probs: probs,
            fwd_ends: vec![0; n],
            bwd_ends: vec![0; n],
            buffer: Vec::with_capacity(FLUSH_THRESHOLD + FLUSH_THRESHOLD / 2),
        }
    }

    fn run(mut self, rx: Receiver<Vec<String>>) -> Result<()> {
        for block in rx.iter() {
            for line in &block {
                self.process_segment(line)?;
            }
            self.flush(FLUSH_THRESHOLD)?;
        }
        self.flush(1)?;
        Ok(())
    }

    fn process_segment(&mut self, line: &str) -> Result<()> {
        let seg = match self.parser.parse(line)? {
            Some(seg) => seg,
            None => return Ok(()),
        };
        self.stats.increment_segments();
        if self.config.nsamples > 0 {
            let mut rng =
                ChaCha8Rng::seed_from_u64((self.config.seed as u64) ^ seg.seed_key());
            for j in self.n_quantiles_p1..self.fwd_probs.len() {
                self.fwd_probs[j] = rng.gen();
                self.bwd_probs[j] = rng.gen();
            }
        }
        let focus_pos = self.ibd_ends.get_ends(
            &seg,
            &self.fwd_probs,
            &mut self.fwd_ends,
            &self.bwd_probs,
            &mut self.bwd_ends,
        )?;
        if self.config.estimate_err {
            update_discord_stats(
                self.model.frame(),
                self.stats,
                seg.hap1() as usize,
                seg.hap2() as usize,
                self.bwd_ends[0],
                self.fwd_ends[0],
            );
        }

        write!(self.buffer, "{}\t{}", line, focus_pos)?;
        // element 0 is the internal convergence quantile and is not emitted
        for j in 1..self.fwd_ends.len() {
            let start_morgans = self.model.base_to_morgans(self.bwd_ends[j]);
            let end_morgans = self.model.base_to_morgans(self.fwd_ends[j]);
            let cm = 100.0 * (end_morgans - start_morgans);
            write!(
                self.buffer,
                "\t{}\t{}\t{:.3}",
                self.bwd_ends[j], self.fwd_ends[j], cm
            )?;
        }
        self.buffer.push(b'\n');
        Ok(())
    }

    fn flush(&mut self, threshold: usize) -> Result<()> {
        if self.buffer.len() >= threshold && !self.buffer.is_empty() {
            let chunk = compress_chunk(&self.buffer)?;
            self.sink.write_chunk(&chunk)?;
            self.buffer.clear();
        }
        Ok(())
    }
}

/// Probability vector convention: element 0 is the internal convergence
/// probability, elements `1..=Q` the user quantiles, and the trailing
/// `nsamples` slots are refilled per segment with uniform draws.
fn extended_probs(config: &Config) -> Vec<f64> {
    let mut probs = Vec::with_capacity(config.quantiles.len() + config.nsamples + 1);
    probs.push(config.length_quantile);
    probs.extend_from_slice(&config.quantiles);
    probs.resize(config.quantiles.len() + config.nsamples + 1, 0.0);
    probs
}

/// Count allele discordances over the base-pair interval of one segment's
/// convergence endpoints and fold them into the running error-rate
/// estimate. Intervals shorter than `MIN_ERR_ESTIMATION_MORGANS` are
/// skipped.
fn update_discord_stats(
    frame: &MarkerFrame,
    stats: &AnalysisStats,
    hap1: usize,
    hap2: usize,
    start_pos: i64,
    end_pos: i64,
) {
    debug_assert!(start_pos <= end_pos);
    let view = frame.view(Orientation::Forward);
    let bases = view.bases();
    let start_marker = match bases.binary_search(&start_pos) {
        Ok(i) => i,
        Err(i) => i,
    };
    let end_marker = match bases.binary_search(&end_pos) {
        Ok(i) => i as isize,
        Err(i) => i as isize - 1,
    };
    if (start_marker as isize) > end_marker {
        return;
    }
    let end_marker = end_marker as usize;
    let length = view.morgan(end_marker) - view.morgan(start_marker);
    if length < MIN_ERR_ESTIMATION_MORGANS {
        return;
    }
    let mut discordant = 0u64;
    for m in start_marker..=end_marker {
        if frame.allele(m, hap1) != frame.allele(m, hap2) {
            discordant += 1;
        }
    }
    stats.update_discord_rate(discordant, (end_marker - start_marker + 1) as u64);
}

/// The tab-delimited output header for the configured quantiles and
/// sampled endpoint draws.
pub fn output_header(config: &Config) -> String {
    let mut header = String::with_capacity(80);
    header.push_str("ID1\tHAP1\tID2\tHAP2\tCHROM\tSTART\tEND\tCM\tFOCUS");
    for &q in &config.quantiles {
        let suffix = quantile_suffix(q);
        header.push_str(&format!("\tSTA{0}\tEND{0}\tCM{0}", suffix));
    }
    for j in 1..=config.nsamples {
        header.push_str(&format!("\tSTA-{0}\tEND-{0}\tCM-{0}", j));
    }
    header
}

/// Render a quantile as its decimal fraction with at least two and at
/// most seven digits, e.g. `0.5 -> ".50"`, `0.125 -> ".125"`.
fn quantile_suffix(q: f64) -> String {
    let full = format!("{:.7}", q);
    let dot = full.find('.').unwrap_or(0);
    let frac = &full[dot..];
    let trimmed = frac.trim_end_matches('0');
    if trimmed.len() < 3 {
        frac[..3].to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_suffix() {
        assert_eq!(quantile_suffix(0.5), ".50");
        assert_eq!(quantile_suffix(0.05), ".05");
        assert_eq!(quantile_suffix(0.125), ".125");
        assert_eq!(quantile_suffix(0.9), ".90");
        assert_eq!(quantile_suffix(0.975), ".975");
    }

    #[test]
    fn test_extended_probs_layout() {
        let mut config = test_config();
        config.quantiles = vec![0.25, 0.75];
        config.nsamples = 3;
        config.length_quantile = 0.05;
        let probs = extended_probs(&config);
        assert_eq!(probs.len(), 6);
        assert_eq!(probs[0], 0.05);
        assert_eq!(&probs[1..3], &[0.25, 0.75]);
        assert_eq!(&probs[3..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_output_header() {
        let mut config = test_config();
        config.quantiles = vec![0.5];
        config.nsamples = 2;
        let header = output_header(&config);
        assert!(header.starts_with("ID1\tHAP1\tID2\tHAP2\tCHROM\tSTART\tEND\tCM\tFOCUS"));
        assert!(header.contains("STA.50\tEND.50\tCM.50"));
        assert!(header.ends_with("STA-1\tEND-1\tCM-1\tSTA-2\tEND-2\tCM-2"));
    }

    fn test_config() -> Config {
        Config {
            gt: "gt.vcf".into(),
            ibd: "segments.ibd".into(),
            map: "plink.map".into(),
            out: "out".into(),
            chrom: None,
            excludesamples: None,
            quantiles: vec![0.5],
            nsamples: 0,
            nthreads: Some(1),
            err: 0.0005,
            estimate_err: true,
            gc_err: 0.1,
            gc_bp: 1000,
            min_maf: 0.001,
            seed: -99999,
            ne: 10_000.0,
            local_haps: 10_000,
            global_pos: 1000,
            global_segments: 2000,
            global_quantile: 0.9,
            global_factor: 3.0,
            max_local_cdf: 0.999,
            max_its: 10,
            fix_focus: false,
            length_quantile: 0.05,
            max_diff: 0.1,
        }
    }
}
