//! Count-to-physical lookup tables
//!
//! CEReS distributes one two-column text file per band (`count2tbb`): digital
//! number, then reflectance x100 or brightness temperature. Calibration uses
//! the digital number directly as an index, so the first column must run
//! 0, 1, 2, ... without gaps.

use crate::band::BandId;
use crate::config::BandDescriptor;
use crate::types::{GeoError, GeoResult};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Physical values indexed by digital number
#[derive(Debug, Clone, PartialEq)]
pub struct Lut {
    values: Vec<f32>,
}

impl Lut {
    pub fn new(values: Vec<f32>) -> GeoResult<Self> {
        if values.is_empty() {
            return Err(GeoError::CalibrationRange("lookup table is empty".to_string()));
        }
        Ok(Self { values })
    }

    /// Parse the two-column text format
    pub fn parse(text: &str) -> GeoResult<Self> {
        let mut values = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut columns = line.split_whitespace();
            let (dn, value) = match (columns.next(), columns.next()) {
                (Some(dn), Some(value)) => (dn, value),
                _ => {
                    return Err(GeoError::CalibrationRange(format!(
                        "line {}: expected two columns, got '{}'",
                        line_no + 1,
                        line
                    )))
                }
            };

            let parse = |s: &str| {
                s.parse::<f64>().map_err(|_| {
                    GeoError::CalibrationRange(format!("line {}: '{}' is not a number", line_no + 1, s))
                })
            };
            let dn = parse(dn)?;
            let value = parse(value)?;

            if dn != values.len() as f64 {
                return Err(GeoError::CalibrationRange(format!(
                    "line {}: digital number {} out of sequence, expected {}",
                    line_no + 1,
                    dn,
                    values.len()
                )));
            }
            values.push(value as f32);
        }

        Self::new(values)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> GeoResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GeoError::CalibrationRange(format!("cannot read lookup table {}: {}", path.display(), e))
        })?;

        let lut = Self::parse(&text).map_err(|e| match e {
            GeoError::CalibrationRange(msg) => GeoError::CalibrationRange(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        log::info!("Loaded {}-entry lookup table from {}", lut.len(), path.display());
        Ok(lut)
    }

    /// Number of digital numbers covered
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, dn: u16) -> Option<f32> {
        self.values.get(dn as usize).copied()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Per-band tables, parsed once per process
#[derive(Debug, Default)]
pub struct LutCache {
    tables: HashMap<BandId, Arc<Lut>>,
}

impl LutCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for this band, loading it on first use
    pub fn get_or_load(&mut self, descriptor: &BandDescriptor) -> GeoResult<Arc<Lut>> {
        if let Some(lut) = self.tables.get(&descriptor.band) {
            return Ok(Arc::clone(lut));
        }

        let path = descriptor.lut_path.as_ref().ok_or_else(|| {
            GeoError::CalibrationRange(format!("no lookup table configured for {}", descriptor.band))
        })?;

        let lut = Arc::new(Lut::load(path)?);
        self.tables.insert(descriptor.band, Arc::clone(&lut));
        Ok(lut)
    }

    /// Bands currently held in memory
    pub fn cached(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(lut_path: Option<PathBuf>) -> BandDescriptor {
        BandDescriptor {
            band: BandId::parse("tir.01").unwrap(),
            edge_length: 4,
            resolution: 0.02,
            downsample: 1,
            lut_path,
            output_dir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn test_parse_count2tbb_format() {
        let lut = Lut::parse("# count tbb\n0 180.5\n1 181.0\n\n2   181.75\n").unwrap();
        assert_eq!(lut.len(), 3);
        assert_eq!(lut.get(2), Some(181.75));
        assert_eq!(lut.get(3), None);
    }

    #[test]
    fn test_parse_rejects_gaps_and_garbage() {
        assert!(Lut::parse("0 1.0\n2 3.0\n").is_err());
        assert!(Lut::parse("1 1.0\n").is_err());
        assert!(Lut::parse("0 abc\n").is_err());
        assert!(Lut::parse("0\n").is_err());
        assert!(Lut::parse("# only comments\n").is_err());
    }

    #[test]
    fn test_load_error_names_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ext.01");
        std::fs::write(&path, "0 1.0\n1 2.0\n3 4.0\n").unwrap();

        let message = Lut::load(&path).unwrap_err().to_string();
        assert_eq!(message.matches("Calibration error").count(), 1, "{}", message);
        assert!(message.contains("ext.01: line 3"), "{}", message);
    }

    #[test]
    fn test_cache_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tir.01");
        std::fs::write(&path, "0 0.0\n1 2.0\n").unwrap();

        let desc = descriptor(Some(path.clone()));
        let mut cache = LutCache::new();
        let first = cache.get_or_load(&desc).unwrap();

        // A second lookup must not touch the file again
        std::fs::remove_file(&path).unwrap();
        let second = cache.get_or_load(&desc).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.cached(), 1);
    }

    #[test]
    fn test_missing_lut() {
        let mut cache = LutCache::new();
        let err = cache.get_or_load(&descriptor(None)).unwrap_err();
        assert_eq!(err.kind(), crate::types::FailureKind::CalibrationRange);

        let err = cache
            .get_or_load(&descriptor(Some(PathBuf::from("/nonexistent/tir.01"))))
            .unwrap_err();
        assert_eq!(err.kind(), crate::types::FailureKind::CalibrationRange);
    }
}
