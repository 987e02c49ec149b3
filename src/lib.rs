//! himawari-geoss: Himawari AHI gridded full-disk retrieval and calibration
//!
//! Two batch jobs share a directory of decompressed granules: the acquisition
//! loop mirrors `.fld.geoss.bz2` files from the CEReS archive, and the decode
//! pipeline turns each granule into a calibrated GeoTIFF cropped to an area of
//! interest.

pub mod types;
pub mod band;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, GeoError, GeoResult, GeoTransform, GridOrigin, ItemOutcome, ProcessingSummary,
    FailureKind, DnImage, PhysicalImage
};
pub use band::{BandFamily, BandId, GranuleId};
pub use config::{BandDescriptor, BandTable, PipelineConfig};
pub use io::{AcquisitionLoop, GeoTiffExporter, GeossReader, Lut, LutCache, RemoteSource};
pub use core::{CalibrationProcessor, DecodePipeline, SubsetProcessor, SubsetWindow};
