//! Bulk retrieval of compressed granules on a fixed time grid

use crate::band::GranuleId;
use crate::config::AcquisitionConfig;
use crate::io::remote::RemoteSource;
use crate::types::{GeoError, GeoResult, ItemOutcome, ProcessingSummary};
use bzip2::read::MultiBzDecoder;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Walks the configured time grid and mirrors missing granules locally
pub struct AcquisitionLoop<S: RemoteSource> {
    config: AcquisitionConfig,
    source: S,
}

impl<S: RemoteSource> AcquisitionLoop<S> {
    pub fn new(config: AcquisitionConfig, source: S) -> Self {
        Self { config, source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Every identifier in the Cartesian product, in year/month/day/hour/minute/band order
    pub fn candidates(&self) -> Vec<GranuleId> {
        let time = &self.config.time;
        let mut ids = Vec::with_capacity(time.len() * self.config.bands.len());

        for year in time.years[0]..=time.years[1] {
            for month in time.months[0]..=time.months[1] {
                for day in time.days[0]..=time.days[1] {
                    for hour in time.hours[0]..=time.hours[1] {
                        for minute in time.minutes() {
                            for &band in &self.config.bands {
                                ids.push(GranuleId { year, month, day, hour, minute, band });
                            }
                        }
                    }
                }
            }
        }

        ids
    }

    /// Local path of the decompressed granule
    pub fn local_path(&self, id: &GranuleId) -> PathBuf {
        self.config.output_dir.join(id.file_name())
    }

    /// Run the whole grid. Only an unusable output directory aborts the run.
    pub fn run(&mut self) -> GeoResult<ProcessingSummary> {
        std::fs::create_dir_all(&self.config.output_dir).map_err(|e| {
            GeoError::Config(format!(
                "cannot create output directory {}: {}",
                self.config.output_dir.display(),
                e
            ))
        })?;

        let candidates = self.candidates();
        log::info!(
            "Acquisition: {} candidate granules into {}",
            candidates.len(),
            self.config.output_dir.display()
        );

        let mut summary = ProcessingSummary::default();
        for id in candidates {
            let result = self.acquire(&id);
            summary.record(&id.to_string(), result);
        }

        log::info!("Acquisition finished: {}", summary);
        Ok(summary)
    }

    /// Fetch, decompress and publish one granule unless it already exists
    pub fn acquire(&mut self, id: &GranuleId) -> GeoResult<ItemOutcome> {
        let target = self.local_path(id);
        if target.exists() {
            return Ok(ItemOutcome::Skipped(target));
        }

        let remote_path = id.remote_path();
        log::info!("Downloading: {}", self.source.describe(&remote_path));

        // The compressed intermediate is deleted when this handle drops
        let mut compressed = tempfile::Builder::new()
            .prefix(&format!(".{}.", id.compressed_name()))
            .tempfile_in(&self.config.output_dir)?;

        let bytes = self.source.fetch(&remote_path, compressed.as_file_mut())?;
        log::debug!("Fetched {} compressed bytes for {}", bytes, id);

        compressed.as_file_mut().seek(SeekFrom::Start(0))?;
        let decoded = decompress(compressed.as_file_mut())?;

        if let Err(e) = compressed.close() {
            log::warn!("Could not remove compressed intermediate for {}: {}", id, e);
        }
        publish(&self.config.output_dir, &target, &decoded)?;

        Ok(ItemOutcome::Completed(target))
    }
}

/// Inflate a complete bzip2 payload in memory
pub fn decompress<R: Read>(reader: R) -> GeoResult<Vec<u8>> {
    let mut decoder = MultiBzDecoder::new(reader);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| GeoError::Decompression(format!("Failed to decompress bzip2 data: {}", e)))?;

    if decompressed.is_empty() {
        return Err(GeoError::Decompression("Decompressed granule is empty".to_string()));
    }

    log::debug!("Decompressed {} bytes", decompressed.len());
    Ok(decompressed)
}

/// Write `bytes` next to `target` and rename into place
fn publish(dir: &Path, target: &Path, bytes: &[u8]) -> GeoResult<()> {
    let mut staged = tempfile::Builder::new().prefix(".partial.").tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged
        .persist(target)
        .map_err(|e| GeoError::OutputWrite(format!("{}: {}", target.display(), e.error)))?;
    Ok(())
}
