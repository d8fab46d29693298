//! Process-wide RSA keypair for the key exchange.

use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::auth::{AuthError, AuthResult};

/// Key size mandated by the protocol.
pub const RSA_KEY_BITS: usize = 1024;

/// RSA keypair plus the DER encoding clients receive.
pub struct ServerKeys {
    private: RsaPrivateKey,
    public: RsaPublicKey,
    public_der: Vec<u8>,
}

impl ServerKeys {
    /// Generate a fresh keypair. Slow; call once at startup.
    pub fn generate() -> AuthResult<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)?;
        let public = RsaPublicKey::from(&private);
        let public_der = public
            .to_public_key_der()
            .map_err(|e| AuthError::KeyEncoding(e.to_string()))?
            .as_bytes()
            .to_vec();
        tracing::info!(bits = RSA_KEY_BITS, "Generated server keypair");
        Ok(Self { private, public, public_der })
    }

    /// SubjectPublicKeyInfo DER, as sent in the encryption request.
    pub fn public_der(&self) -> &[u8] {
        &self.public_der
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// PKCS#1 v1.5 decrypt.
    pub fn decrypt(&self, ciphertext: &[u8]) -> AuthResult<Vec<u8>> {
        Ok(self.private.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }
}

impl std::fmt::Debug for ServerKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKeys")
            .field("bits", &RSA_KEY_BITS)
            .field("public_der_len", &self.public_der.len())
            .finish_non_exhaustive()
    }
}
