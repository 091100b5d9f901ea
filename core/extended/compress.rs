//! Payload compression for extended values.

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("failed to compress payload: {0}")]
    CompressFailed(#[from] lz4_flex::block::CompressError),
    #[error("failed to decompress payload: {0}")]
    DecompressFailed(#[from] lz4_flex::block::DecompressError),
    #[error("decompressed payload has {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Compression coder handed to the extended store. Implementations hold no
/// per call state and are shared between cells.
pub trait Compressor: Send + Sync {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CompressionError>;

    /// Restores exactly `expected_len` bytes from `input`.
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CompressionError>;
}

/// LZ4 block compression.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>, CompressionError> {
        let mut output = vec![0; lz4_flex::block::get_maximum_output_size(input.len())];
        let n = lz4_flex::block::compress_into(input, &mut output)?;
        output.truncate(n);
        Ok(output)
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CompressionError> {
        let output = lz4_flex::block::decompress(input, expected_len)?;
        if output.len() != expected_len {
            return Err(CompressionError::LengthMismatch {
                expected: expected_len,
                actual: output.len(),
            });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_shrinks_repetitive_payload() {
        let input = b"rowstore ".repeat(2_000);
        let compressed = Lz4Compressor.compress(&input).unwrap();
        assert!(compressed.len() < input.len() / 10);

        let restored = Lz4Compressor.decompress(&compressed, input.len()).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn test_lz4_rejects_garbage() {
        let err = Lz4Compressor.decompress(&[0xFF; 16], 1024);
        assert!(err.is_err());
    }
}
