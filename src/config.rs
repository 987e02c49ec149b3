//! Run configuration for the acquisition loop and the decode pipeline
//!
//! Everything that used to be a module-level constant lives here and is handed to
//! each component at construction. Geometry defaults come from [`BandFamily`];
//! a band entry may override them, which keeps every stage reading the same
//! resolved [`BandDescriptor`].

use crate::band::{BandFamily, BandId};
use crate::types::{BoundingBox, GeoError, GeoResult, GridOrigin};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// CEReS gridded full-disk archive
pub const DEFAULT_REMOTE_ROOT: &str = "ftp://hmwr829gr.cr.chiba-u.ac.jp/gridded/FD/V20190123";

/// File name looked up under the platform config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Inclusive calendar grid walked by the acquisition loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    pub years: [u16; 2],
    pub months: [u8; 2],
    pub days: [u8; 2],
    pub hours: [u8; 2],
    /// Minutes past the hour are 0, step, 2*step, ... below 60
    pub minute_step: u8,
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self {
            years: [2023, 2023],
            months: [1, 8],
            days: [1, 31],
            hours: [1, 4],
            minute_step: 10,
        }
    }
}

impl TimeGrid {
    pub fn minutes(&self) -> impl Iterator<Item = u8> {
        (0..60u8).step_by(self.minute_step.max(1) as usize)
    }

    /// Number of timestamps on the grid
    pub fn len(&self) -> usize {
        let span = |r: [u8; 2]| (r[1] as usize + 1).saturating_sub(r[0] as usize);
        let years = (self.years[1] as usize + 1).saturating_sub(self.years[0] as usize);
        years * span(self.months) * span(self.days) * span(self.hours) * self.minutes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> GeoResult<()> {
        check_range("years", self.years[0] as u32, self.years[1] as u32, 1970, 9999)?;
        check_range("months", self.months[0] as u32, self.months[1] as u32, 1, 12)?;
        check_range("days", self.days[0] as u32, self.days[1] as u32, 1, 31)?;
        check_range("hours", self.hours[0] as u32, self.hours[1] as u32, 0, 23)?;
        if self.minute_step == 0 || self.minute_step > 60 {
            return Err(GeoError::Config(format!(
                "minute_step must be within 1-60, got {}",
                self.minute_step
            )));
        }
        Ok(())
    }
}

fn check_range(name: &str, start: u32, end: u32, min: u32, max: u32) -> GeoResult<()> {
    if start > end || start < min || end > max {
        return Err(GeoError::Config(format!(
            "{} range [{}, {}] must be ordered and within {}-{}",
            name, start, end, min, max
        )));
    }
    Ok(())
}

/// Settings for the retrieval job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// `ftp://` or `http(s)://` root of the gridded archive
    pub remote_root: String,
    /// Where decompressed granules are written
    pub output_dir: PathBuf,
    pub bands: Vec<BandId>,
    pub time: TimeGrid,
    /// Connect/read timeout for remote transfers
    pub timeout_secs: u64,
    pub ftp_user: String,
    pub ftp_password: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            output_dir: PathBuf::from("data/original/ext_01"),
            bands: vec![BandId { family: BandFamily::Ext, number: 1 }],
            time: TimeGrid::default(),
            timeout_secs: 300,
            ftp_user: "anonymous".to_string(),
            ftp_password: "anonymous".to_string(),
        }
    }
}

/// Settings for the decode job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Directory scanned for `*.geoss` granules
    pub input_dir: PathBuf,
    /// Base directory for relative LUT paths
    pub lut_dir: PathBuf,
    /// Area of interest the output is cropped to
    pub aoi: BoundingBox,
    /// Geographic position of pixel (0, 0) in every full-disk grid
    pub origin: GridOrigin,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/original/ext_01"),
            lut_dir: PathBuf::from("data/lut"),
            aoi: BoundingBox::JAPAN,
            origin: GridOrigin::default(),
        }
    }
}

/// One `[[bands]]` entry as written in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandConfig {
    pub band: BandId,
    pub output_dir: PathBuf,
    /// LUT file, relative to `decode.lut_dir` unless absolute
    #[serde(default)]
    pub lut: Option<PathBuf>,
    /// Block size for mean downsampling, 1 disables it
    #[serde(default = "default_downsample")]
    pub downsample: usize,
    #[serde(default)]
    pub edge_length: Option<usize>,
    #[serde(default)]
    pub resolution: Option<f64>,
}

fn default_downsample() -> usize {
    1
}

impl BandConfig {
    /// Band with family geometry, a LUT named after the band and no downsampling
    pub fn standard(band: BandId, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            band,
            output_dir: output_dir.into(),
            lut: Some(PathBuf::from(band.token())),
            downsample: 1,
            edge_length: None,
            resolution: None,
        }
    }
}

/// Fully resolved per-band behaviour shared by every decode stage
#[derive(Debug, Clone, PartialEq)]
pub struct BandDescriptor {
    pub band: BandId,
    /// Side of the square raw raster in pixels
    pub edge_length: usize,
    /// Native degrees per pixel
    pub resolution: f64,
    pub downsample: usize,
    pub lut_path: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl BandDescriptor {
    /// Number of u16 values in a raw granule
    pub fn element_count(&self) -> usize {
        self.edge_length * self.edge_length
    }

    /// Degrees per pixel after downsampling
    pub fn output_resolution(&self) -> f64 {
        self.resolution * self.downsample as f64
    }
}

/// Lookup from band to descriptor; unknown bands are rejected, never defaulted
#[derive(Debug, Clone, Default)]
pub struct BandTable {
    descriptors: HashMap<BandId, BandDescriptor>,
}

impl BandTable {
    pub fn insert(&mut self, descriptor: BandDescriptor) {
        self.descriptors.insert(descriptor.band, descriptor);
    }

    pub fn get(&self, band: &BandId) -> GeoResult<&BandDescriptor> {
        self.descriptors
            .get(band)
            .ok_or_else(|| GeoError::PatternDispatch(format!("band {} is not configured", band)))
    }

    /// Dispatch a granule file name to its descriptor
    pub fn for_file_name(&self, file_name: &str) -> GeoResult<&BandDescriptor> {
        let band = BandId::from_file_name(file_name)?;
        self.get(&band)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub acquisition: AcquisitionConfig,
    pub decode: DecodeConfig,
    pub bands: Vec<BandConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let band = |family, number| BandId { family, number };
        let mut ext = BandConfig::standard(band(BandFamily::Ext, 1), "data/geotiff/ext_01_1km");
        ext.downsample = 2;

        Self {
            acquisition: AcquisitionConfig::default(),
            decode: DecodeConfig::default(),
            bands: vec![
                BandConfig::standard(band(BandFamily::Vis, 1), "data/geotiff/vis_01"),
                BandConfig::standard(band(BandFamily::Vis, 2), "data/geotiff/vis_02"),
                BandConfig::standard(band(BandFamily::Vis, 3), "data/geotiff/vis_03"),
                BandConfig::standard(band(BandFamily::Tir, 1), "data/geotiff/tir_01"),
                BandConfig::standard(band(BandFamily::Tir, 2), "data/geotiff/tir_02"),
                ext,
            ],
        }
    }
}

impl PipelineConfig {
    /// Read and validate a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> GeoResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| GeoError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| GeoError::Config(format!("cannot parse {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Explicit path, then the platform config directory, then built-in defaults
    pub fn load_or_default(explicit: Option<&Path>) -> GeoResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(path);
            }
        }

        log::info!("No configuration file found, using built-in defaults");
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/himawari-geoss/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("himawari-geoss").join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> GeoResult<()> {
        self.acquisition.time.validate()?;

        if self.acquisition.bands.is_empty() {
            return Err(GeoError::Config("acquisition.bands is empty".to_string()));
        }
        if self.acquisition.timeout_secs == 0 {
            return Err(GeoError::Config("acquisition.timeout_secs must be positive".to_string()));
        }

        let aoi = &self.decode.aoi;
        if !(aoi.min_lat < aoi.max_lat && aoi.min_lon < aoi.max_lon) {
            return Err(GeoError::Config(format!("bounding box is empty or inverted: {:?}", aoi)));
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.bands {
            if !seen.insert(entry.band) {
                return Err(GeoError::Config(format!("band {} configured twice", entry.band)));
            }
            if entry.downsample == 0 {
                return Err(GeoError::Config(format!("band {}: downsample must be at least 1", entry.band)));
            }
            if entry.edge_length == Some(0) {
                return Err(GeoError::Config(format!("band {}: edge_length must be positive", entry.band)));
            }
            if let Some(res) = entry.resolution {
                if !(res.is_finite() && res > 0.0) {
                    return Err(GeoError::Config(format!("band {}: resolution must be positive", entry.band)));
                }
            }
        }

        Ok(())
    }

    /// Resolve `[[bands]]` entries into descriptors
    pub fn band_table(&self) -> BandTable {
        let mut table = BandTable::default();
        for entry in &self.bands {
            table.insert(BandDescriptor {
                band: entry.band,
                edge_length: entry.edge_length.unwrap_or_else(|| entry.band.family.edge_length()),
                resolution: entry.resolution.unwrap_or_else(|| entry.band.family.resolution()),
                downsample: entry.downsample,
                lut_path: entry.lut.as_ref().map(|lut| self.decode.lut_dir.join(lut)),
                output_dir: entry.output_dir.clone(),
            });
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();

        let table = config.band_table();
        assert_eq!(table.len(), 6);

        let ext = table.for_file_name("202301010100.ext.01.fld.geoss").unwrap();
        assert_eq!(ext.edge_length, 24000);
        assert_eq!(ext.downsample, 2);
        assert!((ext.output_resolution() - 0.01).abs() < 1e-12);
        assert_eq!(ext.lut_path.as_deref(), Some(Path::new("data/lut/ext.01")));

        let tir = table.for_file_name("202301010100.tir.02.fld.geoss").unwrap();
        assert_eq!(tir.edge_length, 6000);
        assert_eq!(tir.downsample, 1);
    }

    #[test]
    fn test_unconfigured_band_is_rejected() {
        let table = PipelineConfig::default().band_table();
        // sir is a known family but not in the default table
        let err = table.for_file_name("202301010100.sir.01.fld.geoss").unwrap_err();
        assert_eq!(err.kind(), crate::types::FailureKind::PatternDispatch);
    }

    #[test]
    fn test_time_grid_size() {
        let grid = TimeGrid::default();
        // 1 year x 8 months x 31 days x 4 hours x 6 minutes
        assert_eq!(grid.len(), 8 * 31 * 4 * 6);
        assert_eq!(grid.minutes().collect::<Vec<_>>(), vec![0, 10, 20, 30, 40, 50]);
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            [acquisition]
            remote_root = "http://example.org/gridded"
            output_dir = "/tmp/raw"
            bands = ["tir.01", "vis.02"]
            timeout_secs = 30

            [acquisition.time]
            years = [2022, 2023]
            months = [6, 6]
            days = [1, 2]
            hours = [0, 0]
            minute_step = 30

            [decode]
            input_dir = "/tmp/raw"
            lut_dir = "/opt/lut"
            aoi = { min_lon = 130.0, max_lon = 140.0, min_lat = 30.0, max_lat = 40.0 }

            [[bands]]
            band = "tir.01"
            output_dir = "/tmp/out/tir_01"
            lut = "tir.01"

            [[bands]]
            band = "vis.02"
            output_dir = "/tmp/out/vis_02"
            downsample = 4
            resolution = 0.01
        "#;

        let config: PipelineConfig = toml::from_str(text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.acquisition.bands.len(), 2);
        assert_eq!(config.acquisition.time.len(), 2 * 1 * 2 * 1 * 2);
        assert_eq!(config.decode.origin, GridOrigin::default());

        let table = config.band_table();
        let vis = table.get(&BandId::parse("vis.02").unwrap()).unwrap();
        assert_eq!(vis.downsample, 4);
        assert!(vis.lut_path.is_none());
        let tir = table.get(&BandId::parse("tir.01").unwrap()).unwrap();
        assert_eq!(tir.lut_path.as_deref(), Some(Path::new("/opt/lut/tir.01")));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PipelineConfig::default();
        config.acquisition.time.months = [9, 2];
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.acquisition.time.minute_step = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.bands.push(config.bands[0].clone());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.decode.aoi.min_lat = 50.0;
        assert!(config.validate().is_err());

        let bad_band = toml::from_str::<PipelineConfig>("[acquisition]\nbands = [\"vis.09\"]\n");
        assert!(bad_band.is_err());
    }
}
