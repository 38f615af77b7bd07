//! Payload encoding: compact JSON and gzip.

use cuckoo_dxl_common::{Error, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::{Read, Write};

/// Highest gzip compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Serialize to compact UTF-8 JSON.
///
/// Values without a JSON form are reported as `Error::Serialization`.
pub fn to_compact_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

/// Compress `data` as a gzip member (DEFLATE with gzip header and trailer).
pub fn gzip_compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let level = level.min(MAX_COMPRESSION_LEVEL);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).map_err(Error::Compression)?;
    encoder.finish().map_err(Error::Compression)
}

/// Inflate a gzip member produced by [`gzip_compress`].
pub fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(Error::Compression)?;
    Ok(out)
}
