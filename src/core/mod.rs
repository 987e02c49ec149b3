//! Per-granule processing stages

pub mod calibrate;
pub mod subset;
pub mod pipeline;

// Re-export main types
pub use calibrate::CalibrationProcessor;
pub use subset::{SubsetProcessor, SubsetWindow, block_mean, extract};
pub use pipeline::DecodePipeline;
