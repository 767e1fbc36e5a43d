//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::error::{IbdEndsError, Result};
use crate::model::ModelParams;

/// ibd-ends: Probabilistic IBD segment endpoint estimation
#[derive(Parser, Debug, Clone)]
#[command(name = "ibd-ends")]
#[command(version = "0.1.0")]
#[command(about = "Probabilistic IBD segment endpoint estimation", long_about = None)]
pub struct Config {
    // ============ Data Parameters ============
    /// Input VCF file with phased, non-missing GT data (required)
    #[arg(long, value_name = "FILE")]
    pub gt: PathBuf,

    /// IBD segment file produced from the input VCF (required)
    #[arg(long, value_name = "FILE")]
    pub ibd: PathBuf,

    /// PLINK map file with cM units (required)
    #[arg(long, value_name = "FILE")]
    pub map: PathBuf,

    /// Output file prefix (required)
    #[arg(long, short, value_name = "PREFIX")]
    pub out: String,

    /// Chromosome or region [chrom] or [chrom]:[start]-[end]
    #[arg(long, value_name = "REGION")]
    pub chrom: Option<String>,

    /// File with sample IDs to exclude (one per line)
    #[arg(long, value_name = "FILE")]
    pub excludesamples: Option<PathBuf>,

    // ============ Algorithm Parameters ============
    /// Comma-separated endpoint quantiles, each in (0, 1)
    #[arg(long, value_delimiter = ',', default_value = "0.5")]
    pub quantiles: Vec<f64>,

    /// Number of independent sampled endpoint draws per segment
    #[arg(long, default_value = "0")]
    pub nsamples: usize,

    /// Number of threads (default: all available cores)
    #[arg(long)]
    pub nthreads: Option<usize>,

    /// IBD allele mismatch probability
    #[arg(long, default_value = "0.0005")]
    pub err: f64,

    /// Report an aggregate allele discordance rate estimate
    #[arg(long = "estimate-err", default_value_t = true, action = clap::ArgAction::Set)]
    pub estimate_err: bool,

    /// Gene conversion allele mismatch probability
    #[arg(long = "gc-err", default_value = "0.1")]
    pub gc_err: f64,

    /// Maximum gene conversion tract length in base pairs
    #[arg(long = "gc-bp", default_value = "1000")]
    pub gc_bp: i64,

    /// Minimum permitted minor allele frequency
    #[arg(long = "min-maf", default_value = "0.001")]
    pub min_maf: f64,

    /// Random seed for reproducibility
    #[arg(long, default_value = "-99999")]
    pub seed: i64,

    // ============ Model Parameters ============
    /// Constant effective population size
    #[arg(long, default_value = "10000")]
    pub ne: f64,

    /// Cap on haplotypes sampled for local IBS counts
    #[arg(long = "local-haps", default_value = "10000")]
    pub local_haps: usize,

    /// Number of random foci sampled for the global IBS length distribution
    #[arg(long = "global-pos", default_value = "1000")]
    pub global_pos: usize,

    /// Haplotype pair draws per sampled focus
    #[arg(long = "global-segments", default_value = "2000")]
    pub global_segments: usize,

    /// Quantile of per-focus lengths used for outlier filtering
    #[arg(long = "global-quantile", default_value = "0.9")]
    pub global_quantile: f64,

    /// Factor multiplied by the median quantile length to set the outlier cutoff
    #[arg(long = "global-factor", default_value = "3.0")]
    pub global_factor: f64,

    /// CDF threshold at which local IBS count rows are truncated
    #[arg(long = "max-local-cdf", default_value = "0.999")]
    pub max_local_cdf: f64,

    /// Maximum iterative endpoint updates per segment side
    #[arg(long = "max-its", default_value = "10")]
    pub max_its: usize,

    /// Do not update the focus position between iterations
    #[arg(long = "fix-focus", default_value_t = false, action = clap::ArgAction::Set)]
    pub fix_focus: bool,

    /// Convergence probability used for the internal endpoint estimate
    #[arg(long = "length-quantile", default_value = "0.05")]
    pub length_quantile: f64,

    /// Relative change below which an endpoint is declared converged
    #[arg(long = "max-diff", default_value = "0.1")]
    pub max_diff: f64,
}

/// A chromosome restriction, either a whole chromosome or a base-pair range
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChromInterval {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl ChromInterval {
    /// Parse `CHROM` or `CHROM:START-END`
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || IbdEndsError::config(format!("invalid chrom parameter: {}", s));
        match s.split_once(':') {
            None => {
                if s.is_empty() {
                    return Err(invalid());
                }
                Ok(Self {
                    chrom: s.to_string(),
                    start: 0,
                    end: i64::MAX,
                })
            }
            Some((chrom, range)) => {
                let (start, end) = range.split_once('-').ok_or_else(invalid)?;
                let start: i64 = start.parse().map_err(|_| invalid())?;
                let end: i64 = end.parse().map_err(|_| invalid())?;
                if chrom.is_empty() || start < 0 || end < start {
                    return Err(invalid());
                }
                Ok(Self {
                    chrom: chrom.to_string(),
                    start,
                    end,
                })
            }
        }
    }

    /// Check whether a record position falls inside this interval
    pub fn contains(&self, chrom: &str, pos: i64) -> bool {
        self.chrom == chrom && pos >= self.start && pos <= self.end
    }
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        for path in [&self.gt, &self.ibd, &self.map] {
            if !path.exists() {
                return Err(IbdEndsError::FileNotFound { path: path.clone() });
            }
        }
        if let Some(ref path) = self.excludesamples {
            if !path.exists() {
                return Err(IbdEndsError::FileNotFound { path: path.clone() });
            }
        }

        if Path::new(&self.out).is_dir() {
            return Err(IbdEndsError::config(format!(
                "'out' parameter cannot be a directory: {}",
                self.out
            )));
        }
        self.check_output_collisions()?;

        if let Some(ref chrom) = self.chrom {
            ChromInterval::parse(chrom)?;
        }

        if self.quantiles.is_empty() {
            return Err(IbdEndsError::config("at least one quantile is required"));
        }
        for &q in &self.quantiles {
            if !q.is_finite() || q <= 0.0 || q >= 1.0 {
                return Err(IbdEndsError::config(format!("invalid quantile: {}", q)));
            }
        }

        check_prob("err", self.err)?;
        check_prob("gc-err", self.gc_err)?;
        check_prob("global-quantile", self.global_quantile)?;
        check_prob("max-local-cdf", self.max_local_cdf)?;
        check_prob("length-quantile", self.length_quantile)?;
        check_prob("max-diff", self.max_diff)?;

        if self.gc_bp < 0 {
            return Err(IbdEndsError::config("gc-bp must be non-negative"));
        }
        if !(self.min_maf > 0.0 && self.min_maf <= 0.5) {
            return Err(IbdEndsError::config("min-maf must be in (0, 0.5]"));
        }
        if !self.ne.is_finite() || self.ne < 1.0 {
            return Err(IbdEndsError::config("ne must be finite and at least 1"));
        }
        if self.local_haps == 0 || self.local_haps > ModelParams::MAX_LOCAL_HAPS {
            return Err(IbdEndsError::config(format!(
                "local-haps must be in [1, {}]",
                ModelParams::MAX_LOCAL_HAPS
            )));
        }
        if self.global_pos == 0 || self.global_segments == 0 {
            return Err(IbdEndsError::config(
                "global-pos and global-segments must be positive",
            ));
        }
        if !self.global_factor.is_finite() || self.global_factor <= 0.0 {
            return Err(IbdEndsError::config("global-factor must be positive"));
        }
        if self.max_its == 0 {
            return Err(IbdEndsError::config("max-its must be positive"));
        }
        if let Some(n) = self.nthreads {
            if n == 0 {
                return Err(IbdEndsError::config("nthreads must be positive"));
            }
        }

        Ok(())
    }

    fn check_output_collisions(&self) -> Result<()> {
        let outputs = [self.ibd_out_path(), self.log_path()];
        let mut inputs = vec![self.gt.clone(), self.ibd.clone(), self.map.clone()];
        if let Some(ref path) = self.excludesamples {
            inputs.push(path.clone());
        }
        for out in &outputs {
            if inputs.iter().any(|p| p == out) {
                return Err(IbdEndsError::config(format!(
                    "output file same as input file: {}",
                    out.display()
                )));
            }
        }
        Ok(())
    }

    /// Load sample IDs to exclude from the exclusion file
    ///
    /// Returns an empty set if no exclusion file is specified.
    pub fn load_exclude_samples(&self) -> Result<std::collections::HashSet<String>> {
        use std::fs::File;
        use std::io::{BufRead, BufReader};

        let mut exclude_set = std::collections::HashSet::new();

        if let Some(ref path) = self.excludesamples {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line?;
                let id = line.trim();
                if !id.is_empty() && !id.starts_with('#') {
                    exclude_set.insert(id.to_string());
                }
            }
        }

        Ok(exclude_set)
    }

    /// Get the parsed chromosome interval, if one was specified
    pub fn chrom_interval(&self) -> Result<Option<ChromInterval>> {
        self.chrom
            .as_deref()
            .map(ChromInterval::parse)
            .transpose()
    }

    /// Get the number of threads to use
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Model hyperparameters derived from this configuration
    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            ne: self.ne,
            err: self.err,
            gc_err: self.gc_err,
            gc_bp: self.gc_bp,
            seed: self.seed,
            local_haps: self.local_haps,
            global_pos: self.global_pos,
            global_segments: self.global_segments,
            global_quantile: self.global_quantile,
            global_factor: self.global_factor,
            max_local_cdf: self.max_local_cdf,
            max_its: self.max_its,
            fix_focus: self.fix_focus,
            length_quantile: self.length_quantile,
            max_diff: self.max_diff,
        }
    }

    /// Path of the compressed IBD endpoint output file
    pub fn ibd_out_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.ibd.gz", self.out))
    }

    /// Path of the analysis log file
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.log", self.out))
    }
}

fn check_prob(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value >= 1.0 {
        return Err(IbdEndsError::config(format!(
            "{} must be in (0, 1): {}",
            name, value
        )));
    }
    Ok(())
}
