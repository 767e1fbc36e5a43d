//! # I/O Module
//!
//! File reading/writing boundaries: phased VCF input, block-buffered
//! segment reading, and the synchronized compressed output sink.

pub mod block;
pub mod sink;
pub mod vcf;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use noodles::bgzf;

use crate::error::Result;

pub use block::{spawn_block_reader, BLOCK_SIZE};
pub use sink::SyncSink;
pub use vcf::VcfSource;

/// Open a text file for buffered reading, transparently decompressing
/// bgzip/gzip input selected by file extension.
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let is_gzipped = path
        .extension()
        .map(|e| e == "gz" || e == "bgz")
        .unwrap_or(false);
    let reader: Box<dyn BufRead + Send> = if is_gzipped {
        Box::new(BufReader::new(bgzf::Reader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}
