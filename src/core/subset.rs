use crate::config::BandDescriptor;
use crate::types::{BoundingBox, GeoError, GeoResult, GridOrigin, PhysicalImage};
use ndarray::{s, Array2};

/// Snap tolerance when converting degrees to pixel indices
const INDEX_EPSILON: f64 = 1e-6;

/// Half-open pixel window inside a full-disk grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsetWindow {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl SubsetWindow {
    /// Pixel bounds of `aoi` in a grid whose pixel (0, 0) sits at `origin`
    ///
    /// `row = (origin.lat - lat) / resolution`, `col = (lon - origin.lon) / resolution`
    pub fn compute(aoi: &BoundingBox, origin: &GridOrigin, resolution: f64) -> GeoResult<Self> {
        let row_start = to_index((origin.lat - aoi.max_lat) / resolution, "max_lat")?;
        let row_end = to_index((origin.lat - aoi.min_lat) / resolution, "min_lat")?;
        let col_start = to_index((aoi.min_lon - origin.lon) / resolution, "min_lon")?;
        let col_end = to_index((aoi.max_lon - origin.lon) / resolution, "max_lon")?;

        if row_start >= row_end || col_start >= col_end {
            return Err(GeoError::GeometryBounds(format!(
                "empty window rows {}..{} cols {}..{}",
                row_start, row_end, col_start, col_end
            )));
        }

        Ok(Self { row_start, row_end, col_start, col_end })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.row_end - self.row_start, self.col_end - self.col_start)
    }

    /// The window must lie inside a `rows` x `cols` raster
    pub fn check_within(&self, rows: usize, cols: usize) -> GeoResult<()> {
        if self.row_end > rows || self.col_end > cols {
            return Err(GeoError::GeometryBounds(format!(
                "window rows {}..{} cols {}..{} exceeds {}x{} raster",
                self.row_start, self.row_end, self.col_start, self.col_end, rows, cols
            )));
        }
        Ok(())
    }
}

/// Truncate towards zero, but treat values within rounding noise of an
/// integer as that integer (14 / 0.005 must give 2800, not 2799)
fn to_index(value: f64, edge: &str) -> GeoResult<usize> {
    if !value.is_finite() || value < -INDEX_EPSILON {
        return Err(GeoError::GeometryBounds(format!(
            "{} maps to pixel index {:.3}, before the grid origin",
            edge, value
        )));
    }

    let nearest = value.round();
    let index = if (value - nearest).abs() < INDEX_EPSILON {
        nearest
    } else {
        value.floor()
    };
    Ok(index as usize)
}

/// Crop `image` to `window`
pub fn extract(image: &PhysicalImage, window: &SubsetWindow) -> GeoResult<PhysicalImage> {
    let (rows, cols) = image.dim();
    window.check_within(rows, cols)?;

    Ok(image
        .slice(s![window.row_start..window.row_end, window.col_start..window.col_end])
        .to_owned())
}

/// Mean of non-overlapping `factor` x `factor` blocks
///
/// Trailing rows/columns that do not fill a whole block are dropped.
pub fn block_mean(image: &PhysicalImage, factor: usize) -> GeoResult<PhysicalImage> {
    if factor == 0 {
        return Err(GeoError::GeometryBounds("downsample factor must be at least 1".to_string()));
    }
    if factor == 1 {
        return Ok(image.clone());
    }

    let (rows, cols) = image.dim();
    let out_rows = rows / factor;
    let out_cols = cols / factor;

    if out_rows == 0 || out_cols == 0 {
        return Err(GeoError::GeometryBounds(format!(
            "{}x{} block too large for {}x{} raster",
            factor, factor, rows, cols
        )));
    }
    if rows % factor != 0 || cols % factor != 0 {
        log::warn!(
            "{}x{} raster is not a multiple of {}, dropping {} rows and {} cols",
            rows,
            cols,
            factor,
            rows % factor,
            cols % factor
        );
    }

    let block_size = (factor * factor) as f64;
    // f64 accumulation keeps block sums exact for reflectance/temperature ranges
    let means: Vec<f32> = image
        .exact_chunks((factor, factor))
        .into_iter()
        .map(|block| (block.iter().map(|&v| v as f64).sum::<f64>() / block_size) as f32)
        .collect();

    Array2::from_shape_vec((out_rows, out_cols), means)
        .map_err(|e| GeoError::GeometryBounds(format!("Failed to assemble downsampled raster: {}", e)))
}

/// Crops calibrated full-disk rasters to the area of interest
pub struct SubsetProcessor {
    aoi: BoundingBox,
    origin: GridOrigin,
}

impl SubsetProcessor {
    pub fn new(aoi: BoundingBox, origin: GridOrigin) -> Self {
        Self { aoi, origin }
    }

    pub fn window(&self, descriptor: &BandDescriptor) -> GeoResult<SubsetWindow> {
        SubsetWindow::compute(&self.aoi, &self.origin, descriptor.resolution)
    }

    /// Shape written to disk for this band
    pub fn output_shape(&self, descriptor: &BandDescriptor) -> GeoResult<(usize, usize)> {
        let (rows, cols) = self.window(descriptor)?.shape();
        Ok((rows / descriptor.downsample, cols / descriptor.downsample))
    }

    /// Crop, then downsample when the band asks for it
    pub fn apply(&self, image: &PhysicalImage, descriptor: &BandDescriptor) -> GeoResult<PhysicalImage> {
        let window = self.window(descriptor)?;
        log::debug!("{} subset window: {:?}", descriptor.band, window);

        let cropped = extract(image, &window)?;
        if descriptor.downsample <= 1 {
            return Ok(cropped);
        }

        let reduced = block_mean(&cropped, descriptor.downsample)?;
        log::info!(
            "Downsampled {} by {}: {:?} -> {:?}",
            descriptor.band,
            descriptor.downsample,
            cropped.dim(),
            reduced.dim()
        );
        Ok(reduced)
    }
}
