//! Per-login key exchange state.

use rand::Rng;
use uuid::Uuid;

use crate::auth::hash::server_hash;
use crate::auth::keys::ServerKeys;
use crate::auth::{AuthError, AuthResult};
use crate::pipeline::cipher::KEY_LEN;
use crate::protocol::packets::{EncryptionRequest, EncryptionResponse};

/// Server id sent in the encryption request; modern clients expect it empty.
pub const SERVER_ID: &str = "";

/// Length of the verify token.
pub const VERIFY_TOKEN_LEN: usize = 4;

/// Data attached to a connection between Hello and the end of login.
#[derive(Debug, Clone)]
pub struct HandshakeState {
    pub username: String,
    pub claimed_uuid: Uuid,
    verify_token: [u8; VERIFY_TOKEN_LEN],
}

/// Outcome of a successful key exchange.
#[derive(Debug, Clone)]
pub struct KeyExchange {
    pub shared_secret: [u8; KEY_LEN],
    /// Signed-hex hash to present to the session service.
    pub server_hash: String,
}

impl HandshakeState {
    pub fn new(username: String, claimed_uuid: Uuid) -> Self {
        Self {
            username,
            claimed_uuid,
            verify_token: rand::thread_rng().gen(),
        }
    }

    pub fn verify_token(&self) -> &[u8] {
        &self.verify_token
    }

    /// Encryption request for this attempt.
    pub fn encryption_request(&self, keys: &ServerKeys) -> EncryptionRequest {
        EncryptionRequest {
            server_id: SERVER_ID.to_string(),
            public_key: keys.public_der().to_vec().into(),
            verify_token: self.verify_token.to_vec().into(),
            should_authenticate: true,
        }
    }

    /// Decrypt and check the client's response.
    ///
    /// Fails on any token mismatch before the shared secret is even looked at.
    pub fn complete(&self, keys: &ServerKeys, response: &EncryptionResponse) -> AuthResult<KeyExchange> {
        let token = keys.decrypt(&response.verify_token)?;
        if token != self.verify_token {
            return Err(AuthError::VerifyTokenMismatch);
        }
        let secret = keys.decrypt(&response.shared_secret)?;
        let shared_secret: [u8; KEY_LEN] = secret
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::InvalidSharedSecret(secret.len()))?;
        let server_hash = server_hash(SERVER_ID, &shared_secret, keys.public_der());
        Ok(KeyExchange { shared_secret, server_hash })
    }
}
