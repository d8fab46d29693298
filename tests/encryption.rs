//! Online-mode login: key exchange, cipher activation and session verification.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
use uuid::Uuid;

use switchyard::auth::{server_hash, AuthError, AuthResult, GameProfile, ServerKeys, SessionVerifier};
use switchyard::protocol::packets::{EncryptionRequest, EncryptionResponse, ProfileProperty};
use switchyard::protocol::{Packet, PacketKind};
use switchyard::proxy::ProxyContext;

mod common;
use common::*;

const SECRET: [u8; 16] = *b"0123456789abcdef";

/// Verifier that records its calls and answers from a script.
struct ScriptedVerifier {
    profile: Option<GameProfile>,
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SessionVerifier for ScriptedVerifier {
    async fn has_joined(&self, username: &str, server_hash: &str) -> AuthResult<GameProfile> {
        self.calls
            .lock()
            .unwrap()
            .push((username.to_string(), server_hash.to_string()));
        self.profile
            .clone()
            .ok_or_else(|| AuthError::NotVerified(username.to_string()))
    }
}

fn verified_profile() -> GameProfile {
    GameProfile {
        id: Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap(),
        name: "Notch".into(),
        properties: vec![ProfileProperty {
            name: "textures".into(),
            value: "e30=".into(),
            signature: Some("c2ln".into()),
        }],
    }
}

async fn online_proxy(backend: &MockBackend, profile: Option<GameProfile>) -> (TestProxy, Arc<ScriptedVerifier>) {
    let mut config = test_config(&[("lobby", backend.addr)]);
    config.proxy.online_mode = true;
    let verifier = Arc::new(ScriptedVerifier {
        profile,
        calls: Mutex::new(Vec::new()),
    });
    let builder = ProxyContext::builder(config)
        .keys(Arc::new(ServerKeys::generate().unwrap()))
        .verifier(verifier.clone());
    (start_proxy_with(builder).await, verifier)
}

async fn encryption_request(client: &mut Peer) -> EncryptionRequest {
    match client.recv_packet().await {
        Packet::EncryptionRequest(request) => request,
        other => panic!("expected encryption request, got {other:?}"),
    }
}

fn encrypt(request: &EncryptionRequest, data: &[u8]) -> Vec<u8> {
    let key = RsaPublicKey::from_public_key_der(&request.public_key).unwrap();
    key.encrypt(&mut rand::thread_rng(), Pkcs1v15Encrypt, data).unwrap()
}

#[tokio::test]
async fn test_verified_login_uses_session_profile() {
    let mut backend = MockBackend::start().await;
    let (proxy, verifier) = online_proxy(&backend, Some(verified_profile())).await;

    let mut client = client_hello(proxy.addr, "Notch").await;
    let request = encryption_request(&mut client).await;
    assert!(request.server_id.is_empty());
    assert_eq!(request.verify_token.len(), 4);

    client
        .send(EncryptionResponse {
            shared_secret: encrypt(&request, &SECRET).into(),
            verify_token: encrypt(&request, &request.verify_token).into(),
        })
        .await;
    client.enable_encryption(&SECRET);

    let mut server = backend.accept().await;
    let (_, hello) = backend_login(&mut server).await;
    assert_eq!(hello.username, "Notch");
    assert_eq!(hello.uuid, verified_profile().id);

    let success = client_finish_login(&mut client).await;
    assert_eq!(success.uuid, verified_profile().id);
    assert_eq!(success.properties, verified_profile().properties);
    enter_play(&mut client, &mut server).await;

    let calls = verifier.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Notch");
    assert_eq!(calls[0].1, server_hash("", &SECRET, &request.public_key));
}

#[tokio::test]
async fn test_verify_token_mismatch_rejected_in_clear() {
    let backend = MockBackend::start().await;
    let (proxy, verifier) = online_proxy(&backend, Some(verified_profile())).await;

    let mut client = client_hello(proxy.addr, "Notch").await;
    let request = encryption_request(&mut client).await;
    let mut wrong_token = request.verify_token.to_vec();
    wrong_token[0] ^= 0xFF;
    client
        .send(EncryptionResponse {
            shared_secret: encrypt(&request, &SECRET).into(),
            verify_token: encrypt(&request, &wrong_token).into(),
        })
        .await;

    // still readable without the cipher
    match client.recv_packet().await {
        Packet::LoginDisconnect(disconnect) => assert_eq!(disconnect.text(), "Verify token mismatch"),
        other => panic!("unexpected {other:?}"),
    }
    client.expect_closed().await;
    assert!(verifier.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_verification_disconnects_after_cipher() {
    let backend = MockBackend::start().await;
    let (proxy, verifier) = online_proxy(&backend, None).await;

    let mut client = client_hello(proxy.addr, "Mallory").await;
    let request = encryption_request(&mut client).await;
    client
        .send(EncryptionResponse {
            shared_secret: encrypt(&request, &SECRET).into(),
            verify_token: encrypt(&request, &request.verify_token).into(),
        })
        .await;
    client.enable_encryption(&SECRET);

    match client.recv_kind(PacketKind::LoginDisconnect).await {
        Packet::LoginDisconnect(disconnect) => {
            assert_eq!(disconnect.text(), "Failed to verify username Mallory")
        }
        other => panic!("unexpected {other:?}"),
    }
    client.expect_closed().await;
    assert_eq!(verifier.calls.lock().unwrap().len(), 1);
    assert_eq!(proxy.ctx.directory().player_count(), 0);
}
