//! Session service client (`hasJoined`).
//!
//! # Responsibilities
//! - Ask the session service whether a player joined with a server hash
//! - Map 200 to a verified profile, 204 to a rejection, anything else to an error
//! - Bound every call with the configured timeout

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthError, AuthResult};
use crate::config::AuthConfig;
use crate::protocol::packets::ProfileProperty;

/// Verified (or, in offline mode, claimed) player identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameProfile {
    /// The service sends this without dashes.
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<ProfileProperty>,
}

impl GameProfile {
    /// Identity taken at face value from the client's Hello.
    pub fn offline(name: String, id: Uuid) -> Self {
        Self { id, name, properties: Vec::new() }
    }
}

/// Checks that a client really authenticated with the session service.
#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn has_joined(&self, username: &str, server_hash: &str) -> AuthResult<GameProfile>;
}

/// HTTP implementation backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct SessionService {
    client: reqwest::Client,
    url: String,
}

impl SessionService {
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url: config.session_url.clone() })
    }
}

#[async_trait]
impl SessionVerifier for SessionService {
    async fn has_joined(&self, username: &str, server_hash: &str) -> AuthResult<GameProfile> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("username", username), ("serverId", server_hash)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let profile: GameProfile = response.json().await?;
                tracing::debug!(username, uuid = %profile.id, "Session service verified player");
                Ok(profile)
            }
            StatusCode::NO_CONTENT => Err(AuthError::NotVerified(username.to_string())),
            other => Err(AuthError::UnexpectedStatus(other.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parses_dashless_id() {
        let body = r#"{
            "id": "069a79f444e94726a5befca90e38aaf5",
            "name": "Notch",
            "properties": [
                {"name": "textures", "value": "e30=", "signature": "c2ln"},
                {"name": "unsigned", "value": "x"}
            ]
        }"#;
        let profile: GameProfile = serde_json::from_str(body).unwrap();
        assert_eq!(profile.id.to_string(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");
        assert_eq!(profile.name, "Notch");
        assert_eq!(profile.properties.len(), 2);
        assert_eq!(profile.properties[0].signature.as_deref(), Some("c2ln"));
        assert_eq!(profile.properties[1].signature, None);
    }

    #[test]
    fn profile_without_properties() {
        let profile: GameProfile =
            serde_json::from_str(r#"{"id":"069a79f4-44e9-4726-a5be-fca90e38aaf5","name":"Notch"}"#).unwrap();
        assert!(profile.properties.is_empty());
    }

    #[tokio::test]
    async fn unreachable_service_is_an_http_error() {
        let config = AuthConfig {
            session_url: "http://127.0.0.1:9/session/minecraft/hasJoined".into(),
            timeout_secs: 1,
        };
        let service = SessionService::new(&config).unwrap();
        let err = service.has_joined("Steve", "abc").await.unwrap_err();
        assert!(matches!(err, AuthError::Http(_)));
    }
}
