use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw digital numbers as stored in a gridded granule
pub type DnImage = Array2<u16>;

/// Calibrated physical values (reflectance x100 or brightness temperature)
pub type PhysicalImage = Array2<f32>;

/// Geospatial bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Japan and surrounding seas
    pub const JAPAN: BoundingBox = BoundingBox {
        min_lon: 122.0,
        max_lon: 149.0,
        min_lat: 24.0,
        max_lat: 46.0,
    };
}

/// Top-left corner of the gridded full-disk product
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridOrigin {
    pub lat: f64,
    pub lon: f64,
}

impl Default for GridOrigin {
    fn default() -> Self {
        // CEReS gridded FD products span 60N..60S, 85E..155W
        Self { lat: 60.0, lon: 85.0 }
    }
}

/// Geospatial transformation parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform with square pixels
    pub fn north_up(top_left_x: f64, top_left_y: f64, resolution: f64) -> Self {
        Self {
            top_left_x,
            pixel_width: resolution,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height: -resolution,
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Stable failure classification used in logs and run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RemoteFetch,
    Decompression,
    PatternDispatch,
    CalibrationRange,
    GeometryBounds,
    OutputWrite,
    ShapeMismatch,
    Config,
    Io,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::RemoteFetch => "remote-fetch",
            FailureKind::Decompression => "decompression",
            FailureKind::PatternDispatch => "pattern-dispatch",
            FailureKind::CalibrationRange => "calibration-range",
            FailureKind::GeometryBounds => "geometry-bounds",
            FailureKind::OutputWrite => "output-write",
            FailureKind::ShapeMismatch => "shape-mismatch",
            FailureKind::Config => "config",
            FailureKind::Io => "io",
        };
        write!(f, "{}", name)
    }
}

/// Error types for granule retrieval and decoding
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("Decompression failed: {0}")]
    Decompression(String),

    #[error("No band configuration matches: {0}")]
    PatternDispatch(String),

    #[error("Calibration error: {0}")]
    CalibrationRange(String),

    #[error("Subset outside raster extent: {0}")]
    GeometryBounds(String),

    #[error("Output write failed: {0}")]
    OutputWrite(String),

    #[error("Raw granule is {actual} bytes, expected {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl GeoError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GeoError::RemoteFetch(_) => FailureKind::RemoteFetch,
            GeoError::Decompression(_) => FailureKind::Decompression,
            GeoError::PatternDispatch(_) => FailureKind::PatternDispatch,
            GeoError::CalibrationRange(_) => FailureKind::CalibrationRange,
            GeoError::GeometryBounds(_) => FailureKind::GeometryBounds,
            GeoError::OutputWrite(_) | GeoError::Gdal(_) => FailureKind::OutputWrite,
            GeoError::ShapeMismatch { .. } => FailureKind::ShapeMismatch,
            GeoError::Config(_) => FailureKind::Config,
            GeoError::Io(_) => FailureKind::Io,
        }
    }
}

/// Result type for retrieval and decode operations
pub type GeoResult<T> = Result<T, GeoError>;

/// What happened to a single granule
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A new file was published at this path
    Completed(PathBuf),
    /// The target already existed
    Skipped(PathBuf),
}

/// Per-run tally of granule outcomes
#[derive(Debug, Clone, Default)]
pub struct ProcessingSummary {
    pub completed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(String, FailureKind)>,
}

impl ProcessingSummary {
    /// Record and log the outcome for one identifier
    pub fn record(&mut self, item: &str, result: GeoResult<ItemOutcome>) {
        match result {
            Ok(ItemOutcome::Completed(path)) => {
                log::info!("{}: written {}", item, path.display());
                self.completed.push(path);
            }
            Ok(ItemOutcome::Skipped(path)) => {
                log::info!("{}: already exists, skipping {}", item, path.display());
                self.skipped.push(path);
            }
            Err(e) => {
                log::warn!("{}: {} failure: {}", item, e.kind(), e);
                self.failed.push((item.to_string(), e.kind()));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn failures_of(&self, kind: FailureKind) -> usize {
        self.failed.iter().filter(|(_, k)| *k == kind).count()
    }
}

impl std::fmt::Display for ProcessingSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} completed, {} skipped, {} failed",
            self.completed.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tally() {
        let mut summary = ProcessingSummary::default();
        summary.record("a", Ok(ItemOutcome::Completed(PathBuf::from("/tmp/a"))));
        summary.record("b", Ok(ItemOutcome::Skipped(PathBuf::from("/tmp/b"))));
        summary.record("c", Err(GeoError::RemoteFetch("550 not found".to_string())));
        summary.record("d", Err(GeoError::ShapeMismatch { expected: 8, actual: 6 }));

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failures_of(FailureKind::RemoteFetch), 1);
        assert_eq!(summary.failures_of(FailureKind::ShapeMismatch), 1);
        assert_eq!(summary.to_string(), "1 completed, 1 skipped, 2 failed");
    }

    #[test]
    fn test_north_up_transform() {
        let gt = GeoTransform::north_up(122.0, 46.0, 0.01);
        assert_eq!(gt.to_gdal(), [122.0, 0.01, 0.0, 46.0, 0.0, -0.01]);
    }
}
