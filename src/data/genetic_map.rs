//! # Genetic Map Interpolation
//!
//! PLINK-format genetic map reading and base-pair to centiMorgan
//! interpolation. Marker cM positions are floored to a minimum spacing of
//! 1e-6 cM so that Morgan positions are strictly increasing.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{IbdEndsError, Result};
use crate::io::open_text;

/// Minimum spacing between successive marker cM positions
pub const MIN_CM_DIST: f64 = 1e-6;

/// Genetic map anchors for one chromosome
#[derive(Clone, Debug)]
pub struct ChromMap {
    base: Vec<i64>,
    cm: Vec<f64>,
}

impl ChromMap {
    /// Number of map anchor positions
    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// First anchor base position
    pub fn first_pos(&self) -> i64 {
        self.base[0]
    }

    /// Last anchor base position
    pub fn last_pos(&self) -> i64 {
        self.base[self.base.len() - 1]
    }

    /// Interpolate the cM position of a base-pair coordinate.
    ///
    /// Positions outside the anchor range are extrapolated from the
    /// terminal anchor interval.
    pub fn interpolate_cm(&self, bp: i64) -> f64 {
        match self.base.binary_search(&bp) {
            Ok(i) => self.cm[i],
            Err(ins) => {
                let last = self.base.len() - 1;
                let (a, b) = if ins == 0 {
                    (0, 1)
                } else if ins > last {
                    (last - 1, last)
                } else {
                    (ins - 1, ins)
                };
                let (x1, x2) = (self.base[a], self.base[b]);
                let (y1, y2) = (self.cm[a], self.cm[b]);
                y1 + ((bp - x1) as f64 / (x2 - x1) as f64) * (y2 - y1)
            }
        }
    }

    /// The cM position of each marker, with the minimum spacing floor
    /// applied so the sequence is strictly increasing.
    pub fn marker_cm_positions(&self, marker_pos: &[i64]) -> Vec<f64> {
        let mut cm = Vec::with_capacity(marker_pos.len());
        for &pos in marker_pos {
            let mut value = self.interpolate_cm(pos);
            if let Some(&prev) = cm.last() {
                if value < prev + MIN_CM_DIST {
                    value = prev + MIN_CM_DIST;
                }
            }
            cm.push(value);
        }
        cm
    }
}

/// A PLINK-format genetic map, keyed by chromosome
#[derive(Clone, Debug, Default)]
pub struct GeneticMap {
    chroms: HashMap<String, ChromMap>,
}

impl GeneticMap {
    /// Load from a PLINK-format genetic map file.
    ///
    /// Rows are whitespace-delimited `chrom id cM bp`.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_reader(open_text(path)?)
    }

    /// Load from any buffered reader
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut chroms: HashMap<String, ChromMap> = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let err = |msg: &str| IbdEndsError::parse(line_no + 1, format!("{}: [{}]", msg, line));
            let chrom = fields.next().ok_or_else(|| err("missing chromosome"))?;
            let _id = fields.next().ok_or_else(|| err("missing marker id"))?;
            let cm: f64 = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err("unparsable cM position"))?;
            let bp: i64 = fields
                .next()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| err("unparsable base position"))?;

            let map = chroms.entry(chrom.to_string()).or_insert_with(|| ChromMap {
                base: Vec::new(),
                cm: Vec::new(),
            });
            if let Some(&last) = map.base.last() {
                if bp <= last {
                    return Err(err("map positions not strictly increasing"));
                }
            }
            map.base.push(bp);
            map.cm.push(cm);
        }

        for (chrom, map) in &chroms {
            if map.len() < 2 {
                return Err(IbdEndsError::invalid_data(format!(
                    "genetic map for chromosome {} has fewer than two positions",
                    chrom
                )));
            }
        }
        Ok(Self { chroms })
    }

    /// Get the map for a chromosome, if present
    pub fn chrom_map(&self, chrom: &str) -> Option<&ChromMap> {
        self.chroms.get(chrom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn test_map() -> GeneticMap {
        let text = "\
1 . 0.0 100\n\
1 . 1.0 1100\n\
1 . 3.0 2100\n\
2 . 0.0 500\n\
2 . 2.0 1500\n";
        GeneticMap::from_reader(Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_interpolation() {
        let map = test_map();
        let chr1 = map.chrom_map("1").unwrap();
        assert!((chr1.interpolate_cm(100) - 0.0).abs() < 1e-12);
        assert!((chr1.interpolate_cm(600) - 0.5).abs() < 1e-12);
        assert!((chr1.interpolate_cm(1600) - 2.0).abs() < 1e-12);
        // extrapolation past the last anchor follows the terminal slope
        assert!((chr1.interpolate_cm(2600) - 4.0).abs() < 1e-12);
        assert!(map.chrom_map("3").is_none());
    }

    #[test]
    fn test_min_spacing_floor() {
        let map = test_map();
        let chr1 = map.chrom_map("1").unwrap();
        // three markers at nearly the same position are forced apart
        let cm = chr1.marker_cm_positions(&[600, 600, 601, 1100]);
        assert!(cm[1] - cm[0] >= MIN_CM_DIST);
        assert!(cm[2] - cm[1] >= MIN_CM_DIST - 1e-15);
        assert!(cm.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_parse_errors() {
        let bad = "1 . zero 100\n";
        assert!(GeneticMap::from_reader(Cursor::new(bad)).is_err());
        let decreasing = "1 . 0.0 100\n1 . 1.0 50\n";
        assert!(GeneticMap::from_reader(Cursor::new(decreasing)).is_err());
        let single = "1 . 0.0 100\n";
        assert!(GeneticMap::from_reader(Cursor::new(single)).is_err());
    }
}
