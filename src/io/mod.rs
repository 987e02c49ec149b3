//! I/O modules for remote retrieval, raw granules, lookup tables and GeoTIFF output

pub mod remote;
pub mod acquisition;
pub mod geoss;
pub mod lut;
pub mod geotiff;

pub use remote::{RemoteSource, FtpSource, HttpSource, SourceSettings};
pub use acquisition::AcquisitionLoop;
pub use geoss::GeossReader;
pub use lut::{Lut, LutCache};
pub use geotiff::GeoTiffExporter;
