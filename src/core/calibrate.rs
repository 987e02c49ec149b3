use crate::io::lut::Lut;
use crate::types::{DnImage, GeoError, GeoResult, PhysicalImage};
use std::sync::Arc;

/// Radiometric calibration by direct LUT indexing
///
/// Each digital number is used as an index into the band's table; there is
/// no interpolation between entries.
pub struct CalibrationProcessor {
    lut: Arc<Lut>,
}

impl CalibrationProcessor {
    pub fn new(lut: Arc<Lut>) -> Self {
        Self { lut }
    }

    /// Map every count through the table
    pub fn calibrate(&self, raw: &DnImage) -> GeoResult<PhysicalImage> {
        let (rows, cols) = raw.dim();
        log::info!("Applying LUT calibration to {}x{} granule", rows, cols);

        self.check_domain(raw)?;

        let table = self.lut.values();
        Ok(raw.mapv(|dn| table[dn as usize]))
    }

    /// Every count must address an entry of the table
    fn check_domain(&self, raw: &DnImage) -> GeoResult<()> {
        let limit = self.lut.len();
        let max = match raw.iter().max() {
            Some(&max) => max,
            None => return Ok(()),
        };

        if max as usize >= limit {
            let offending = raw.iter().filter(|&&dn| dn as usize >= limit).count();
            return Err(GeoError::CalibrationRange(format!(
                "digital number {} outside lookup table of {} entries ({} pixels affected)",
                max, limit, offending
            )));
        }

        Ok(())
    }
}
