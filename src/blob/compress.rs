//! Fast lossless compression for blob bodies (spec §4.1: "LZ4-class" codec).

use crate::core::{EngineError, Result};

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4_flex::block::compress_prepend_size(bytes))
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::block::decompress_size_prepended(bytes)
        .map_err(|e| EngineError::DecompressionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let data = b"hello, world! hello, world! hello, world!".to_vec();
        let compressed = compress(&data).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn round_trips_empty_input() {
        let compressed = compress(&[]).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert!(decompressed.is_empty());
    }

    #[test]
    fn decompress_rejects_garbage() {
        assert!(decompress(&[1, 2, 3]).is_err());
    }
}
