//! Decode driver: Reshape -> Calibrate -> Subset/Downsample -> Export
//!
//! One granule is resident at a time. The raw counts are dropped as soon as
//! they are calibrated and the full-disk physical raster as soon as it is
//! cropped.

use crate::band::GEOSS_SUFFIX;
use crate::config::{BandTable, DecodeConfig, PipelineConfig};
use crate::core::calibrate::CalibrationProcessor;
use crate::core::subset::SubsetProcessor;
use crate::io::geoss::GeossReader;
use crate::io::geotiff::GeoTiffExporter;
use crate::io::lut::LutCache;
use crate::types::{GeoError, GeoResult, ItemOutcome, ProcessingSummary};
use std::path::{Path, PathBuf};

pub struct DecodePipeline {
    config: DecodeConfig,
    table: BandTable,
    luts: LutCache,
}

impl DecodePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            config: config.decode.clone(),
            table: config.band_table(),
            luts: LutCache::new(),
        }
    }

    /// Granules in the input directory, sorted by name
    pub fn discover(&self) -> GeoResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.config.input_dir).map_err(|e| {
            GeoError::Config(format!(
                "cannot list input directory {}: {}",
                self.config.input_dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_granule = path
                .file_name()
                .map(|name| name.to_string_lossy().ends_with(".geoss"))
                .unwrap_or(false);
            if is_granule && path.is_file() {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Decode every discovered granule; individual failures are recorded, not raised
    pub fn run(&mut self) -> GeoResult<ProcessingSummary> {
        let files = self.discover()?;
        log::info!(
            "Decode: {} granules in {}",
            files.len(),
            self.config.input_dir.display()
        );

        let mut summary = ProcessingSummary::default();
        for path in &files {
            let result = self.process_file(path);
            summary.record(&display_name(path), result);
        }

        log::info!("Decode finished: {}", summary);
        Ok(summary)
    }

    /// Run all four stages for one granule
    pub fn process_file(&mut self, path: &Path) -> GeoResult<ItemOutcome> {
        let file_name = display_name(path);
        if !file_name.ends_with(GEOSS_SUFFIX) {
            return Err(GeoError::PatternDispatch(format!(
                "'{}' does not end in {}",
                file_name, GEOSS_SUFFIX
            )));
        }

        let descriptor = self.table.for_file_name(&file_name)?;
        let exporter = GeoTiffExporter::new(descriptor, self.config.aoi);

        let output_path = exporter.output_path(path)?;
        if output_path.exists() {
            return Ok(ItemOutcome::Skipped(output_path));
        }

        // LUT before the raw read
        let lut = self.luts.get_or_load(descriptor)?;

        let raw = GeossReader::read(path, descriptor)?;
        let calibrated = CalibrationProcessor::new(lut).calibrate(&raw)?;
        drop(raw);

        let subset = SubsetProcessor::new(self.config.aoi, self.config.origin).apply(&calibrated, descriptor)?;
        drop(calibrated);

        exporter.export(&subset, path)
    }

    pub fn band_table(&self) -> &BandTable {
        &self.table
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;

    fn pipeline(input: &Path) -> DecodePipeline {
        let mut config = PipelineConfig::default();
        config.decode.input_dir = input.to_path_buf();
        DecodePipeline::new(&config)
    }

    #[test]
    fn test_discover_sorts_and_filters() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.tir.01.fld.geoss", "a.vis.01.fld.geoss", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.geoss")).unwrap();

        let files = pipeline(dir.path()).discover().unwrap();
        let names: Vec<String> = files.iter().map(|p| display_name(p)).collect();
        assert_eq!(names, vec!["a.vis.01.fld.geoss", "b.tir.01.fld.geoss"]);
    }

    #[test]
    fn test_missing_input_dir_is_fatal() {
        let err = pipeline(Path::new("/nonexistent/input")).run().unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);
    }

    #[test]
    fn test_unknown_band_is_dispatch_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("202301010100.abc.01.fld.geoss");
        std::fs::write(&path, [0u8; 8]).unwrap();

        let err = pipeline(dir.path()).process_file(&path).unwrap_err();
        assert_eq!(err.kind(), FailureKind::PatternDispatch);
    }
}
