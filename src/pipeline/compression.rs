//! zlib payload compression stage.
//!
//! A compressed frame starts with `varint(decompressed_length)`. Zero means
//! the rest is stored raw; anything else is the exact inflated size.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::pipeline::PipelineError;
use crate::protocol::buf::ProtoRead;
use crate::protocol::varint::write_varint;

/// Largest payload a compressed frame may inflate to.
pub const MAX_DECOMPRESSED_LEN: usize = 8_388_608;

/// Outbound half.
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold: usize,
    level: Compression,
}

impl Compressor {
    pub fn new(threshold: usize) -> Self {
        Self { threshold, level: Compression::default() }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Write the compressed-frame form of `payload` to `out`.
    pub fn compress(&self, payload: &[u8], out: &mut BytesMut) -> Result<(), PipelineError> {
        if payload.len() < self.threshold {
            write_varint(out, 0);
            out.extend_from_slice(payload);
            return Ok(());
        }
        write_varint(out, payload.len() as i32);
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), self.level);
        encoder.write_all(payload).map_err(PipelineError::Deflate)?;
        let compressed = encoder.finish().map_err(PipelineError::Deflate)?;
        out.extend_from_slice(&compressed);
        Ok(())
    }
}

/// Inbound half.
#[derive(Debug, Clone)]
pub struct Decompressor {
    threshold: usize,
}

impl Decompressor {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Turn a compressed-frame body back into `varint(id) ++ body`.
    pub fn decompress(&self, mut frame: Bytes) -> Result<Bytes, PipelineError> {
        let declared = frame.read_varint()?;
        if declared == 0 {
            return Ok(frame);
        }
        if declared < 0 || declared as usize > MAX_DECOMPRESSED_LEN {
            return Err(PipelineError::DecompressedTooLarge(i64::from(declared)));
        }
        let expected = declared as usize;
        let mut inflated = Vec::with_capacity(expected);
        // One byte of slack so an oversized stream shows up as a mismatch.
        ZlibDecoder::new(&frame[..])
            .take(expected as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(PipelineError::Inflate)?;
        if inflated.len() != expected {
            return Err(PipelineError::DecompressedLengthMismatch {
                expected,
                actual: inflated.len(),
            });
        }
        Ok(Bytes::from(inflated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::buf::ProtoRead;

    fn compressed_frame(declared: i32, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::new();
        write_varint(&mut out, declared);
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        out.extend_from_slice(&encoder.finish().unwrap());
        out.freeze()
    }

    #[test]
    fn below_threshold_is_stored_raw() {
        let compressor = Compressor::new(256);
        let payload = vec![7u8; 255];
        let mut out = BytesMut::new();
        compressor.compress(&payload, &mut out).unwrap();

        let mut frame = out.freeze();
        assert_eq!(frame.clone().read_varint().unwrap(), 0);
        assert_eq!(Decompressor::new(256).decompress(frame.clone()).unwrap(), payload);
        frame.read_varint().unwrap();
        assert_eq!(&frame[..], &payload[..]);
    }

    #[test]
    fn at_threshold_is_deflated_with_real_length() {
        let compressor = Compressor::new(256);
        let payload: Vec<u8> = (0..256u32).map(|i| (i % 7) as u8).collect();
        let mut out = BytesMut::new();
        compressor.compress(&payload, &mut out).unwrap();

        let frame = out.freeze();
        assert_eq!(frame.clone().read_varint().unwrap(), 256);
        assert_eq!(Decompressor::new(256).decompress(frame).unwrap(), payload);
    }

    #[test]
    fn short_inflate_is_a_framing_error() {
        let frame = compressed_frame(150, &[1u8; 140]);
        let err = Decompressor::new(64).decompress(frame).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DecompressedLengthMismatch { expected: 150, actual: 140 }
        ));
    }

    #[test]
    fn long_inflate_is_a_framing_error() {
        let frame = compressed_frame(100, &[1u8; 140]);
        let err = Decompressor::new(64).decompress(frame).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DecompressedLengthMismatch { expected: 100, actual: 101 }
        ));
    }

    #[test]
    fn garbage_is_an_inflate_error() {
        let mut out = BytesMut::new();
        write_varint(&mut out, 64);
        out.extend_from_slice(b"definitely not zlib");
        assert!(matches!(
            Decompressor::new(64).decompress(out.freeze()),
            Err(PipelineError::Inflate(_))
        ));
    }

    #[test]
    fn absurd_declared_length_is_rejected() {
        let frame = compressed_frame(MAX_DECOMPRESSED_LEN as i32 + 1, b"x");
        assert!(matches!(
            Decompressor::new(64).decompress(frame),
            Err(PipelineError::DecompressedTooLarge(_))
        ));
    }
}
