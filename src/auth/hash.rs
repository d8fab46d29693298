//! Server hash sent to the session service.
//!
//! SHA-1 over (server id, shared secret, DER public key), read as a signed
//! big-endian two's-complement number and printed in signed hexadecimal.
//! A digest with the top bit set therefore comes out negative, with a
//! leading `-`, and leading zeros are dropped.

use num_bigint::BigInt;
use sha1::{Digest, Sha1};

pub fn server_hash(server_id: &str, shared_secret: &[u8], public_key_der: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(server_id.as_bytes());
    hasher.update(shared_secret);
    hasher.update(public_key_der);
    let digest = hasher.finalize();
    BigInt::from_signed_bytes_be(&digest).to_str_radix(16)
}
