//! Per-link byte transform pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound (socket → message):
//!     raw bytes → [cipher] → buffer → framing → [compression] → id/payload codec
//!
//! Outbound (message → socket):
//!     id/payload → [compression] → framing → [cipher] → raw bytes
//! ```
//!
//! # Design Decisions
//! - Stage positions are fixed by the struct layout: the cipher always wraps
//!   framing from the outside and compression always sits inside it, so no
//!   insertion can land in the wrong place
//! - Each optional stage is installed at most once per flow; a second
//!   install is an error, never a silent replacement
//! - Installing the inbound cipher decrypts whatever is already buffered but
//!   not yet framed, so bytes read in the same chunk as the key exchange are
//!   handled correctly

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::error::CodecError;

pub mod cipher;
pub mod compression;
pub mod framing;

use cipher::{StreamDecryptor, StreamEncryptor};
use compression::{Compressor, Decompressor};

/// Errors raised by pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage was installed twice on the same flow.
    #[error("{stage} stage already installed on the {flow} flow")]
    StageAlreadyInstalled { stage: StageKind, flow: Flow },

    /// Shared secret has the wrong size.
    #[error("shared secret must be 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Declared decompressed length does not match the inflated size.
    #[error("decompressed length mismatch: declared {expected}, inflated {actual}")]
    DecompressedLengthMismatch { expected: usize, actual: usize },

    /// Declared decompressed length is negative or above the limit.
    #[error("declared decompressed length {0} is out of range")]
    DecompressedTooLarge(i64),

    #[error("inflate failed: {0}")]
    Inflate(std::io::Error),

    #[error("deflate failed: {0}")]
    Deflate(std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Names of the pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Cipher,
    Framing,
    Compression,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageKind::Cipher => "cipher",
            StageKind::Framing => "framing",
            StageKind::Compression => "compression",
        };
        f.write_str(name)
    }
}

/// Half of a link a stage applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Inbound,
    Outbound,
}

impl std::fmt::Display for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Flow::Inbound => "inbound",
            Flow::Outbound => "outbound",
        })
    }
}

/// Transform stack of one physical link.
#[derive(Debug, Default)]
pub struct Pipeline {
    /// Plaintext bytes that have not been framed yet.
    inbound: BytesMut,
    decryptor: Option<StreamDecryptor>,
    encryptor: Option<StreamEncryptor>,
    decompressor: Option<Decompressor>,
    compressor: Option<Compressor>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installed stages of `flow`, outermost (socket side) first.
    pub fn stages(&self, flow: Flow) -> Vec<StageKind> {
        let (cipher, compression) = match flow {
            Flow::Inbound => (self.decryptor.is_some(), self.decompressor.is_some()),
            Flow::Outbound => (self.encryptor.is_some(), self.compressor.is_some()),
        };
        let mut stages = Vec::with_capacity(3);
        if cipher {
            stages.push(StageKind::Cipher);
        }
        stages.push(StageKind::Framing);
        if compression {
            stages.push(StageKind::Compression);
        }
        stages
    }

    /// Install the stream cipher on one flow.
    pub fn add_cipher(&mut self, flow: Flow, key: &[u8]) -> Result<(), PipelineError> {
        match flow {
            Flow::Inbound => {
                if self.decryptor.is_some() {
                    return Err(PipelineError::StageAlreadyInstalled { stage: StageKind::Cipher, flow });
                }
                let mut decryptor = StreamDecryptor::new(key)?;
                // Anything still buffered arrived after the peer switched on encryption.
                decryptor.apply(&mut self.inbound);
                self.decryptor = Some(decryptor);
            }
            Flow::Outbound => {
                if self.encryptor.is_some() {
                    return Err(PipelineError::StageAlreadyInstalled { stage: StageKind::Cipher, flow });
                }
                self.encryptor = Some(StreamEncryptor::new(key)?);
            }
        }
        tracing::debug!(%flow, "Cipher stage installed");
        Ok(())
    }

    /// Install the stream cipher on both flows.
    pub fn enable_encryption(&mut self, key: &[u8]) -> Result<(), PipelineError> {
        self.add_cipher(Flow::Inbound, key)?;
        self.add_cipher(Flow::Outbound, key)
    }

    /// Install compression on one flow.
    pub fn add_compression(&mut self, flow: Flow, threshold: usize) -> Result<(), PipelineError> {
        let installed = match flow {
            Flow::Inbound => self.decompressor.is_some(),
            Flow::Outbound => self.compressor.is_some(),
        };
        if installed {
            return Err(PipelineError::StageAlreadyInstalled { stage: StageKind::Compression, flow });
        }
        match flow {
            Flow::Inbound => self.decompressor = Some(Decompressor::new(threshold)),
            Flow::Outbound => self.compressor = Some(Compressor::new(threshold)),
        }
        tracing::debug!(%flow, threshold, "Compression stage installed");
        Ok(())
    }

    /// Install compression on both flows.
    pub fn enable_compression(&mut self, threshold: usize) -> Result<(), PipelineError> {
        self.add_compression(Flow::Inbound, threshold)?;
        self.add_compression(Flow::Outbound, threshold)
    }

    /// Accept bytes read from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        let start = self.inbound.len();
        self.inbound.extend_from_slice(data);
        if let Some(decryptor) = self.decryptor.as_mut() {
            decryptor.apply(&mut self.inbound[start..]);
        }
    }

    /// Next complete `varint(id) ++ body`, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, PipelineError> {
        let Some(frame) = framing::split_frame(&mut self.inbound)? else {
            return Ok(None);
        };
        match &self.decompressor {
            Some(decompressor) => decompressor.decompress(frame).map(Some),
            None => Ok(Some(frame)),
        }
    }

    /// Run `payload` (`varint(id) ++ body`) through the outbound stages into `out`.
    pub fn encode_frame(&mut self, payload: &[u8], out: &mut BytesMut) -> Result<(), PipelineError> {
        let start = out.len();
        match &self.compressor {
            Some(compressor) => {
                let mut inner = BytesMut::with_capacity(payload.len() + 5);
                compressor.compress(payload, &mut inner)?;
                framing::write_frame(&inner, out)?;
            }
            None => framing::write_frame(payload, out)?,
        }
        if let Some(encryptor) = self.encryptor.as_mut() {
            encryptor.apply(&mut out[start..]);
        }
        Ok(())
    }

    /// Bytes received but not yet framed.
    pub fn buffered(&self) -> usize {
        self.inbound.len()
    }
}
