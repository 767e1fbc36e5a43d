//! # VCF Reading
//!
//! Parse a phased, non-missing VCF into the inputs of a `MarkerFrame`.
//! Uses the `noodles` crate for the header and bgzf decompression; record
//! lines are parsed directly.
//!
//! Records are restricted to a single chromosome (the first one seen, or
//! the one named by the `chrom` argument) and to the base-pair span of the
//! genetic map for that chromosome. Markers failing the minor-allele-count
//! filter are dropped.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use noodles::vcf::Header;
use rayon::prelude::*;
use tracing::info;

use crate::config::ChromInterval;
use crate::data::genetic_map::GeneticMap;
use crate::data::haplotype::Samples;
use crate::data::marker::{Marker, Markers};
use crate::error::{IbdEndsError, Result};
use crate::io::open_text;

/// Decoded phased haplotype input for one chromosome
pub struct VcfSource {
    pub samples: Arc<Samples>,
    pub markers: Markers,
    /// Marker-major allele matrix, `markers.len() * samples.n_haps()` entries
    pub alleles: Vec<u8>,
}

/// Read phased genotypes from a VCF or bgzipped VCF file.
pub fn read_phased(
    path: &Path,
    gen_map: &GeneticMap,
    chrom_interval: Option<&ChromInterval>,
    exclude_samples: &HashSet<String>,
    min_maf: f64,
) -> Result<VcfSource> {
    from_reader(open_text(path)?, gen_map, chrom_interval, exclude_samples, min_maf)
}

/// Read phased genotypes from any buffered reader.
pub fn from_reader(
    mut reader: Box<dyn BufRead + Send>,
    gen_map: &GeneticMap,
    chrom_interval: Option<&ChromInterval>,
    exclude_samples: &HashSet<String>,
    min_maf: f64,
) -> Result<VcfSource> {
    // Read header
    let mut header_str = String::new();
    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }
        if line.starts_with('#') {
            header_str.push_str(&line);
            if line.starts_with("#CHROM") {
                break;
            }
        } else {
            break;
        }
    }

    let header: Header = header_str
        .parse()
        .map_err(|e: noodles::vcf::header::ParseError| IbdEndsError::vcf(e.to_string()))?;

    let sample_names: Vec<String> = header.sample_names().iter().map(|s| s.to_string()).collect();
    let include_indices: Vec<usize> = sample_names
        .iter()
        .enumerate()
        .filter(|(_, id)| !exclude_samples.contains(*id))
        .map(|(i, _)| i)
        .collect();
    let kept_ids: Vec<String> = include_indices
        .iter()
        .map(|&i| sample_names[i].clone())
        .collect();
    if kept_ids.is_empty() {
        return Err(IbdEndsError::vcf("no samples remain after exclusion"));
    }
    let samples = Arc::new(Samples::from_ids(kept_ids));
    let n_haps = samples.n_haps();
    let min_mac = ((n_haps as f64 * min_maf).ceil() as u64).max(1);

    // Stream records on the analysis chromosome inside the map span
    let mut chrom: Option<String> = None;
    let mut map_span: (i64, i64) = (0, 0);
    let mut records: Vec<(Marker, Vec<u8>)> = Vec::with_capacity(8192);
    let mut line = String::new();
    let mut line_no = 0usize;
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split('\t');
        let parse_err =
            |msg: String| IbdEndsError::parse(line_no, format!("{} [{}]", msg, short(trimmed)));
        let rec_chrom = fields
            .next()
            .ok_or_else(|| parse_err("missing CHROM".into()))?;
        let pos: i64 = fields
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| parse_err("unparsable POS".into()))?;

        if let Some(ci) = chrom_interval {
            if ci.chrom != rec_chrom || pos < ci.start {
                if chrom.is_some() {
                    break;
                }
                continue;
            }
            if pos > ci.end {
                break;
            }
        }

        match &chrom {
            None => {
                let map = gen_map.chrom_map(rec_chrom).ok_or_else(|| {
                    IbdEndsError::invalid_data(format!(
                        "no genetic map positions for chromosome {}",
                        rec_chrom
                    ))
                })?;
                map_span = (map.first_pos(), map.last_pos());
                chrom = Some(rec_chrom.to_string());
            }
            Some(c) if c != rec_chrom => break,
            Some(_) => {}
        }
        if pos < map_span.0 {
            continue;
        }
        if pos > map_span.1 {
            break;
        }

        let id = fields.next().ok_or_else(|| parse_err("missing ID".into()))?;
        let _ref_allele = fields
            .next()
            .ok_or_else(|| parse_err("missing REF".into()))?;
        let alt = fields.next().ok_or_else(|| parse_err("missing ALT".into()))?;
        let _qual = fields.next();
        let _filter = fields.next();
        let _info = fields.next();
        let format = fields
            .next()
            .ok_or_else(|| parse_err("missing FORMAT".into()))?;
        if format.split(':').next() != Some("GT") {
            return Err(IbdEndsError::vcf(format!(
                "first FORMAT field is not GT at line {}",
                line_no
            )));
        }

        let n_alleles: usize = if alt == "." { 1 } else { 1 + alt.split(',').count() };

        let marker_id: Option<Arc<str>> = if id == "." { None } else { Some(id.into()) };
        let genotype_fields: Vec<&str> = fields.collect();
        if genotype_fields.len() != sample_names.len() {
            return Err(IbdEndsError::vcf(format!(
                "expected {} genotype columns, found {} at line {}",
                sample_names.len(),
                genotype_fields.len(),
                line_no
            )));
        }

        let mut row = Vec::with_capacity(n_haps);
        for &col in include_indices.iter() {
            let gt = genotype_fields[col].split(':').next().unwrap_or("");
            let (a1, a2) = parse_phased_gt(gt, n_alleles, line_no)?;
            row.push(a1);
            row.push(a2);
        }
        records.push((Marker::new(pos, marker_id, n_alleles as u16), row));
    }

    let chrom = chrom.ok_or_else(|| {
        IbdEndsError::vcf("no VCF records within chromosome interval and genetic map")
    })?;

    // Minor allele count filter
    let n_before = records.len();
    let keep: Vec<bool> = records
        .par_iter()
        .map(|(marker, row)| mac(row, marker.n_alleles()) >= min_mac)
        .collect();
    let mut keep_iter = keep.iter();
    records.retain(|_| *keep_iter.next().unwrap_or(&false));
    info!(
        chrom = %chrom,
        markers = records.len(),
        filtered = n_before - records.len(),
        samples = samples.len(),
        "read phased genotypes"
    );

    let mut markers = Vec::with_capacity(records.len());
    let mut alleles = Vec::with_capacity(records.len() * n_haps);
    for (marker, row) in records {
        markers.push(marker);
        alleles.extend_from_slice(&row);
    }
    Ok(VcfSource {
        samples,
        markers: Markers::new(&chrom, markers)?,
        alleles,
    })
}

/// Second-largest allele count in a marker row
fn mac(row: &[u8], n_alleles: usize) -> u64 {
    let mut counts = vec![0u64; n_alleles];
    for &a in row {
        counts[a as usize] += 1;
    }
    counts.sort_unstable();
    if counts.len() < 2 {
        0
    } else {
        counts[counts.len() - 2]
    }
}

fn parse_phased_gt(gt: &str, n_alleles: usize, line_no: usize) -> Result<(u8, u8)> {
    if gt.contains('/') {
        return Err(IbdEndsError::vcf(format!(
            "unphased genotype ({}) at line {}",
            gt, line_no
        )));
    }
    let (a1, a2) = gt.split_once('|').ok_or_else(|| {
        IbdEndsError::vcf(format!("malformed genotype ({}) at line {}", gt, line_no))
    })?;
    let parse = |s: &str| -> Result<u8> {
        if s == "." {
            return Err(IbdEndsError::vcf(format!(
                "missing allele in genotype ({}) at line {}",
                gt, line_no
            )));
        }
        let v: usize = s.parse().map_err(|_| {
            IbdEndsError::vcf(format!("malformed genotype ({}) at line {}", gt, line_no))
        })?;
        if v >= n_alleles || v > u8::MAX as usize {
            return Err(IbdEndsError::vcf(format!(
                "allele index {} out of range at line {}",
                v, line_no
            )));
        }
        Ok(v as u8)
    };
    Ok((parse(a1)?, parse(a2)?))
}

fn short(line: &str) -> &str {
    line.get(..60).unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "##fileformat=VCFv4.2\n\
        ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";

    fn read(body: &str, min_maf: f64) -> Result<VcfSource> {
        let text = format!("{}{}", HEADER, body);
        let map_text = "1 . 0.0 100\n1 . 1.0 1000\n";
        let gen_map = GeneticMap::from_reader(Cursor::new(map_text)).unwrap();
        from_reader(
            Box::new(Cursor::new(text.into_bytes())),
            &gen_map,
            None,
            &HashSet::new(),
            min_maf,
        )
    }

    #[test]
    fn test_read_phased() {
        let body = "1\t100\trs1\tA\tT\t.\tPASS\t.\tGT\t0|1\t1|0\n\
            1\t200\t.\tG\tC\t.\tPASS\t.\tGT\t1|1\t0|0\n";
        let src = read(body, 0.001).unwrap();
        assert_eq!(src.samples.len(), 2);
        assert_eq!(src.markers.len(), 2);
        assert_eq!(src.markers.chrom(), "1");
        assert_eq!(src.alleles, vec![0, 1, 1, 0, 1, 1, 0, 0]);
        assert_eq!(src.markers[0].id.as_deref(), Some("rs1"));
        assert!(src.markers[1].id.is_none());
    }

    #[test]
    fn test_mac_filter() {
        // second marker is monomorphic and must be dropped
        let body = "1\t100\t.\tA\tT\t.\t.\t.\tGT\t0|1\t1|0\n\
            1\t200\t.\tG\tC\t.\t.\t.\tGT\t0|0\t0|0\n\
            1\t300\t.\tG\tC\t.\t.\t.\tGT\t1|0\t0|0\n";
        let src = read(body, 0.001).unwrap();
        assert_eq!(src.markers.len(), 2);
        assert_eq!(src.markers[1].pos, 300);
    }

    #[test]
    fn test_map_span_restriction() {
        // positions outside [100, 1000] are dropped
        let body = "1\t50\t.\tA\tT\t.\t.\t.\tGT\t0|1\t1|0\n\
            1\t100\t.\tA\tT\t.\t.\t.\tGT\t0|1\t1|0\n\
            1\t2000\t.\tA\tT\t.\t.\t.\tGT\t0|1\t1|0\n";
        let src = read(body, 0.001).unwrap();
        assert_eq!(src.markers.len(), 1);
        assert_eq!(src.markers[0].pos, 100);
    }

    #[test]
    fn test_unphased_is_fatal() {
        let body = "1\t100\t.\tA\tT\t.\t.\t.\tGT\t0/1\t1|0\n";
        assert!(read(body, 0.001).is_err());
    }

    #[test]
    fn test_missing_is_fatal() {
        let body = "1\t100\t.\tA\tT\t.\t.\t.\tGT\t.|1\t1|0\n";
        assert!(read(body, 0.001).is_err());
    }
}
