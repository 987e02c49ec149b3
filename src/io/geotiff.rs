//! GeoTIFF export of cropped, calibrated rasters

use crate::band::GranuleId;
use crate::config::BandDescriptor;
use crate::types::{BoundingBox, GeoError, GeoResult, GeoTransform, ItemOutcome, PhysicalImage};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use std::path::{Path, PathBuf};

/// Geographic WGS84
pub const WGS84_EPSG: u32 = 4326;

/// Writes cropped rasters as single-band Float32 GeoTIFFs
pub struct GeoTiffExporter<'a> {
    descriptor: &'a BandDescriptor,
    aoi: BoundingBox,
}

impl<'a> GeoTiffExporter<'a> {
    pub fn new(descriptor: &'a BandDescriptor, aoi: BoundingBox) -> Self {
        Self { descriptor, aoi }
    }

    /// `<output_dir>/<input stem>.tif`
    pub fn output_path(&self, input: &Path) -> GeoResult<PathBuf> {
        let stem = input
            .file_stem()
            .ok_or_else(|| GeoError::OutputWrite(format!("{} has no file name", input.display())))?;

        let mut name = stem.to_os_string();
        name.push(".tif");
        Ok(self.descriptor.output_dir.join(name))
    }

    /// Upper-left corner of the AOI with the post-downsample pixel size
    pub fn geo_transform(&self) -> GeoTransform {
        GeoTransform::north_up(
            self.aoi.min_lon,
            self.aoi.max_lat,
            self.descriptor.output_resolution(),
        )
    }

    /// Export `image` for the granule read from `input`, unless already done
    pub fn export(&self, image: &PhysicalImage, input: &Path) -> GeoResult<ItemOutcome> {
        let output_path = self.output_path(input)?;
        if output_path.exists() {
            return Ok(ItemOutcome::Skipped(output_path));
        }

        std::fs::create_dir_all(&self.descriptor.output_dir).map_err(|e| {
            GeoError::OutputWrite(format!(
                "cannot create {}: {}",
                self.descriptor.output_dir.display(),
                e
            ))
        })?;

        let acquired = input
            .file_name()
            .and_then(|name| GranuleId::parse_file_name(&name.to_string_lossy()).ok())
            .and_then(|id| id.acquisition_time());

        // Staged next to the destination so the final rename stays on one filesystem
        let staged = tempfile::Builder::new()
            .prefix(".partial.")
            .suffix(".tif")
            .tempfile_in(&self.descriptor.output_dir)?
            .into_temp_path();

        self.write_geotiff(image, &staged, acquired)?;

        staged
            .persist(&output_path)
            .map_err(|e| GeoError::OutputWrite(format!("{}: {}", output_path.display(), e.error)))?;

        log::info!("File saved as {}", output_path.display());
        Ok(ItemOutcome::Completed(output_path))
    }

    fn write_geotiff(
        &self,
        image: &PhysicalImage,
        path: &Path,
        acquired: Option<chrono::NaiveDateTime>,
    ) -> GeoResult<()> {
        let (height, width) = image.dim();
        if height == 0 || width == 0 {
            return Err(GeoError::OutputWrite("refusing to write an empty raster".to_string()));
        }

        log::debug!("Writing {}x{} Float32 raster to {}", width, height, path.display());

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = driver.create_with_band_type::<f32, _>(
            path,
            width as isize,
            height as isize,
            1,
        )?;

        dataset.set_geo_transform(&self.geo_transform().to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(WGS84_EPSG)?)?;

        dataset.set_metadata_item("BAND", &self.descriptor.band.token(), "")?;
        if let Some(time) = acquired {
            dataset.set_metadata_item(
                "ACQUISITION_TIME",
                &time.and_utc().to_rfc3339(),
                "",
            )?;
        }

        let mut rasterband = dataset.rasterband(1)?;
        let flat_data: Vec<f32> = image.iter().copied().collect();
        let buffer = Buffer::new((width, height), flat_data);
        rasterband.write((0, 0), (width, height), &buffer)?;
        drop(rasterband);

        // Closing the dataset flushes the GTiff driver
        drop(dataset);
        Ok(())
    }
}
