//! AES-128/CFB-8 stream cipher stage.
//!
//! The protocol uses the shared secret as both key and IV. CFB-8 works on
//! one-byte blocks, so it can be applied to arbitrary chunks as they are
//! read from or written to the socket.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;

use crate::pipeline::PipelineError;

/// Length of the shared secret.
pub const KEY_LEN: usize = 16;

type Aes128Cfb8Enc = cfb8::Encryptor<Aes128>;
type Aes128Cfb8Dec = cfb8::Decryptor<Aes128>;

/// Outbound half: encrypts bytes in place.
pub struct StreamEncryptor {
    cipher: Aes128Cfb8Enc,
}

impl StreamEncryptor {
    pub fn new(key: &[u8]) -> Result<Self, PipelineError> {
        let cipher = Aes128Cfb8Enc::new_from_slices(key, key)
            .map_err(|_| PipelineError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.cipher.encrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

/// Inbound half: decrypts bytes in place.
pub struct StreamDecryptor {
    cipher: Aes128Cfb8Dec,
}

impl StreamDecryptor {
    pub fn new(key: &[u8]) -> Result<Self, PipelineError> {
        let cipher = Aes128Cfb8Dec::new_from_slices(key, key)
            .map_err(|_| PipelineError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data.chunks_mut(1) {
            self.cipher.decrypt_block_mut(GenericArray::from_mut_slice(byte));
        }
    }
}

impl std::fmt::Debug for StreamEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamEncryptor(aes-128-cfb8)")
    }
}

impl std::fmt::Debug for StreamDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamDecryptor(aes-128-cfb8)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = *b"0123456789abcdef";

    #[test]
    fn round_trip_across_chunk_boundaries() {
        let plain: Vec<u8> = (0u8..=200).collect();

        let mut whole = plain.clone();
        StreamEncryptor::new(&KEY).unwrap().apply(&mut whole);
        assert_ne!(whole, plain);

        // Same stream, encrypted in uneven pieces
        let mut pieces = plain.clone();
        let mut encryptor = StreamEncryptor::new(&KEY).unwrap();
        let (a, rest) = pieces.split_at_mut(3);
        let (b, c) = rest.split_at_mut(97);
        encryptor.apply(a);
        encryptor.apply(b);
        encryptor.apply(c);
        assert_eq!(pieces, whole);

        let mut decryptor = StreamDecryptor::new(&KEY).unwrap();
        let (a, b) = whole.split_at_mut(50);
        decryptor.apply(a);
        decryptor.apply(b);
        assert_eq!(whole, plain);
    }

    #[test]
    fn wrong_key_length_is_rejected() {
        assert!(matches!(
            StreamEncryptor::new(&[0u8; 8]),
            Err(PipelineError::InvalidKeyLength(8))
        ));
        assert!(matches!(
            StreamDecryptor::new(&[0u8; 32]),
            Err(PipelineError::InvalidKeyLength(32))
        ));
    }
}
