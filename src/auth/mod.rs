//! Online-mode login: key exchange and session verification.
//!
//! # Data Flow
//! ```text
//! Hello (online mode)
//!     → handshake.rs: HandshakeState with a fresh verify token
//!     → EncryptionRequest (DER public key from keys.rs, token, empty server id)
//! EncryptionResponse
//!     → keys.rs: RSA-decrypt secret and token
//!     → handshake.rs: token must match byte for byte
//!     → cipher installed on both flows of the client link
//!     → hash.rs: signed-hex SHA-1 server hash
//!     → session.rs: hasJoined lookup (async, off the link task)
//!     → verified GameProfile, or disconnect
//! ```
//!
//! # Design Decisions
//! - One RSA keypair per process, created at startup and shared read-only
//! - The session service sits behind the `SessionVerifier` trait so it can
//!   be replaced without touching the login flow

use thiserror::Error;

pub mod handshake;
pub mod hash;
pub mod keys;
pub mod session;

pub use handshake::{HandshakeState, KeyExchange};
pub use hash::server_hash;
pub use keys::ServerKeys;
pub use session::{GameProfile, SessionService, SessionVerifier};

/// Errors raised during online-mode login.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("failed to encode public key: {0}")]
    KeyEncoding(String),

    /// The decrypted verify token differs from the one sent.
    #[error("Verify token mismatch")]
    VerifyTokenMismatch,

    #[error("shared secret must be 16 bytes, got {0}")]
    InvalidSharedSecret(usize),

    /// The session service does not know this login (HTTP 204).
    #[error("Failed to verify username {0}")]
    NotVerified(String),

    #[error("session service answered with HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("session service request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Encryption response arrived with no login in progress.
    #[error("no key exchange in progress")]
    NoHandshake,
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(AuthError::VerifyTokenMismatch.to_string(), "Verify token mismatch");
        assert_eq!(
            AuthError::NotVerified("Steve".into()).to_string(),
            "Failed to verify username Steve"
        );
        assert!(AuthError::UnexpectedStatus(503).to_string().contains("503"));
    }
}
