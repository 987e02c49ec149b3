//! Raw gridded granule reader
//!
//! A `.fld.geoss` file is a headerless square grid of big-endian u16 counts,
//! row-major from the north-west corner. The side length is not stored in the
//! file and must come from the band descriptor.

use crate::config::BandDescriptor;
use crate::types::{DnImage, GeoError, GeoResult};
use ndarray::Array2;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes decoded per read; keeps the working set at one u16 raster
const CHUNK_BYTES: usize = 1 << 20;

/// Reads raw granules into 2-D digital number arrays
pub struct GeossReader;

impl GeossReader {
    /// Read a granule and reshape it to the descriptor's edge length
    pub fn read<P: AsRef<Path>>(path: P, descriptor: &BandDescriptor) -> GeoResult<DnImage> {
        let path = path.as_ref();
        let edge = descriptor.edge_length;
        log::debug!("Reading {} as {}x{} {}", path.display(), edge, edge, descriptor.band);

        let file = File::open(path)?;
        let expected = edge * edge * 2;
        let actual = file.metadata()?.len() as usize;
        if actual != expected {
            return Err(GeoError::ShapeMismatch { expected, actual });
        }

        let values = decode_counts(file, edge * edge)?;
        Array2::from_shape_vec((edge, edge), values).map_err(|_| GeoError::ShapeMismatch { expected, actual })
    }

    /// Decode big-endian u16 values into an `edge` x `edge` array
    pub fn reshape(bytes: &[u8], edge: usize) -> GeoResult<DnImage> {
        let expected = edge * edge * 2;
        if bytes.len() != expected {
            return Err(GeoError::ShapeMismatch { expected, actual: bytes.len() });
        }

        let values = decode_counts(bytes, edge * edge)?;
        Array2::from_shape_vec((edge, edge), values)
            .map_err(|_| GeoError::ShapeMismatch { expected, actual: bytes.len() })
    }

    /// Row-major flattening, the inverse of [`GeossReader::reshape`]
    pub fn flatten(image: &DnImage) -> Vec<u8> {
        image.iter().flat_map(|dn| dn.to_be_bytes()).collect()
    }
}

/// Read exactly `count` big-endian u16 values, one chunk at a time
fn decode_counts<R: Read>(mut reader: R, count: usize) -> GeoResult<Vec<u16>> {
    let mut values = Vec::with_capacity(count);
    let mut chunk = vec![0u8; CHUNK_BYTES.min(count * 2)];

    while values.len() < count {
        let want = ((count - values.len()) * 2).min(chunk.len());
        reader.read_exact(&mut chunk[..want])?;
        values.extend(
            chunk[..want]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]])),
        );
    }

    Ok(values)
}
