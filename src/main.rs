//! # ibd-ends: Probabilistic IBD Segment Endpoint Estimation
//!
//! ## Usage
//! ```bash
//! ibd-ends --gt phased.vcf.gz --ibd segments.ibd.gz --map plink.map --out run1
//! ```
//!
//! Writes `<out>.ibd.gz` with per-segment endpoint quantiles and
//! `<out>.log` with the analysis summary.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::time::Instant;

use ibd_ends::pipelines::AnalysisStats;
use ibd_ends::{Config, EndpointPipeline, Result};

/// Warn when the estimated error rate differs from `err` by this factor
const MAX_ERR_RATIO: f64 = 3.0;

fn main() {
    if let Err(e) = run() {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let start = Instant::now();

    let config = Config::parse_and_validate()?;
    init_logging();

    let n_threads = config.nthreads();
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
        .ok();

    let mut log = String::with_capacity(600);
    append_line(&mut log, &format!("ibd-ends {}", env!("CARGO_PKG_VERSION")));
    append_line(&mut log, "");
    append_line(&mut log, &parameter_block(&config, n_threads));

    let pipeline = EndpointPipeline::new(config.clone());
    let stats = pipeline.run()?;

    append_line(&mut log, "");
    append_line(&mut log, &summary_block(&config, &stats));
    append_line(
        &mut log,
        &format!("\nWallclock time:    :  {:.2} seconds", start.elapsed().as_secs_f64()),
    );

    let mut log_file = File::create(config.log_path())?;
    log_file.write_all(log.as_bytes())?;
    println!("{}", log);
    Ok(())
}

fn append_line(log: &mut String, line: &str) {
    log.push_str(line);
    log.push('\n');
}

fn parameter_block(config: &Config, n_threads: usize) -> String {
    let mut s = String::with_capacity(300);
    let _ = writeln!(s, "Parameters");
    let _ = writeln!(s, "  gt               :  {}", config.gt.display());
    if let Some(ref chrom) = config.chrom {
        let _ = writeln!(s, "  chrom            :  {}", chrom);
    }
    let _ = writeln!(s, "  ibd              :  {}", config.ibd.display());
    let _ = writeln!(s, "  map              :  {}", config.map.display());
    let _ = writeln!(s, "  out              :  {}", config.out);
    if let Some(ref path) = config.excludesamples {
        let _ = writeln!(s, "  excludesamples   :  {}", path.display());
    }
    let quantiles = config
        .quantiles
        .iter()
        .map(|q| q.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let _ = writeln!(s, "  quantiles        :  {}", quantiles);
    let _ = writeln!(s, "  nsamples         :  {}", config.nsamples);
    let _ = writeln!(s, "  err              :  {}", config.err);
    let _ = writeln!(s, "  estimate-err     :  {}", config.estimate_err);
    let _ = writeln!(s, "  gc-err           :  {}", config.gc_err);
    let _ = writeln!(s, "  gc-bp            :  {}", config.gc_bp);
    let _ = writeln!(s, "  min-maf          :  {}", config.min_maf);
    let _ = writeln!(s, "  seed             :  {}", config.seed);
    let _ = write!(s, "  nthreads         :  {}", n_threads);
    s
}

fn summary_block(config: &Config, stats: &AnalysisStats) -> String {
    let mut s = String::with_capacity(300);
    let _ = writeln!(s, "Analysis summary");
    let _ = writeln!(s, "  samples          :  {}", stats.n_samples());
    let _ = writeln!(s, "  markers          :  {}", stats.n_markers());
    let _ = write!(s, "  segments         :  {}", stats.n_segments());
    if config.estimate_err {
        let est = stats.discord_rate();
        let _ = write!(s, "\n  estimated err    :  {:.2e}", est);
        let ratio_high = est >= config.err && est / config.err >= MAX_ERR_RATIO;
        let ratio_low = config.err >= est && est > 0.0 && config.err / est >= MAX_ERR_RATIO;
        if ratio_high || ratio_low {
            let _ = write!(s, "      Recommendation: reanalyze with err={:.2e}", est);
        }
    }
    s
}
