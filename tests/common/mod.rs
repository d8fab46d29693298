//! Shared utilities for integration tests: scripted peers on loopback TCP.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use uuid::Uuid;

use switchyard::config::{ProxyConfig, ServerConfig};
use switchyard::lifecycle::{self, Shutdown};
use switchyard::pipeline::Pipeline;
use switchyard::protocol::codec::{decode_frame, encode_packet};
use switchyard::protocol::packets::{
    ClientInformation, FinishConfiguration, FinishConfigurationAck, Handshake, Hello, LoginAcknowledged,
    LoginSuccess,
};
use switchyard::protocol::varint::write_varint;
use switchyard::protocol::{Direction, Inbound, Packet, PacketKind, PacketRegistry, ProtocolState, PROTOCOL_VERSION};
use switchyard::proxy::{ProxyContext, ProxyContextBuilder};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One end of a Minecraft connection, driven by a test.
pub struct Peer {
    stream: TcpStream,
    pipeline: Pipeline,
    registry: PacketRegistry,
    send_direction: Direction,
    recv_direction: Direction,
    pub send_state: ProtocolState,
    pub recv_state: ProtocolState,
}

impl Peer {
    /// A game client talking to the proxy.
    pub async fn client(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self::new(stream, Direction::Serverbound, Direction::Clientbound)
    }

    /// A backend server's side of an accepted proxy connection.
    pub fn backend(stream: TcpStream) -> Self {
        Self::new(stream, Direction::Clientbound, Direction::Serverbound)
    }

    fn new(stream: TcpStream, send_direction: Direction, recv_direction: Direction) -> Self {
        stream.set_nodelay(true).unwrap();
        Self {
            stream,
            pipeline: Pipeline::new(),
            registry: PacketRegistry::standard(),
            send_direction,
            recv_direction,
            send_state: ProtocolState::Handshake,
            recv_state: ProtocolState::Handshake,
        }
    }

    pub fn set_state(&mut self, state: ProtocolState) {
        self.send_state = state;
        self.recv_state = state;
    }

    pub fn enable_compression(&mut self, threshold: usize) {
        self.pipeline.enable_compression(threshold).unwrap();
    }

    pub fn enable_encryption(&mut self, key: &[u8]) {
        self.pipeline.enable_encryption(key).unwrap();
    }

    pub async fn send(&mut self, packet: impl Into<Packet>) {
        let payload = encode_packet(&self.registry, self.send_direction, self.send_state, &packet.into()).unwrap();
        self.write_payload(&payload).await;
    }

    /// Like [`Peer::send`], but reports a closed socket instead of panicking.
    pub async fn try_send(&mut self, packet: impl Into<Packet>) -> bool {
        let payload = encode_packet(&self.registry, self.send_direction, self.send_state, &packet.into()).unwrap();
        let mut out = BytesMut::new();
        self.pipeline.encode_frame(&payload, &mut out).unwrap();
        self.stream.write_all(&out).await.is_ok()
    }

    /// Send `varint(id) ++ body` as one frame.
    pub async fn send_raw(&mut self, id: i32, body: &[u8]) {
        let mut payload = BytesMut::new();
        write_varint(&mut payload, id);
        payload.extend_from_slice(body);
        self.write_payload(&payload).await;
    }

    async fn write_payload(&mut self, payload: &[u8]) {
        let mut out = BytesMut::new();
        self.pipeline.encode_frame(payload, &mut out).unwrap();
        self.stream.write_all(&out).await.unwrap();
    }

    /// Next inbound frame, or `None` once the other side closed.
    pub async fn try_recv(&mut self) -> Option<Inbound> {
        tokio::time::timeout(TIMEOUT, self.read_inbound())
            .await
            .expect("timed out waiting for a frame")
    }

    async fn read_inbound(&mut self) -> Option<Inbound> {
        let mut buf = [0u8; 8192];
        loop {
            if let Some(frame) = self.pipeline.next_frame().unwrap() {
                return Some(decode_frame(&self.registry, self.recv_direction, self.recv_state, frame).unwrap());
            }
            match self.stream.read(&mut buf).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => self.pipeline.feed(&buf[..n]),
            }
        }
    }

    pub async fn recv(&mut self) -> Inbound {
        self.try_recv().await.expect("connection closed")
    }

    pub async fn recv_packet(&mut self) -> Packet {
        match self.recv().await {
            Inbound::Packet(packet) => packet,
            Inbound::Passthrough(frame) => panic!("expected a packet, got passthrough id {:#x}", frame.id),
        }
    }

    /// Skip frames until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: PacketKind) -> Packet {
        loop {
            if let Inbound::Packet(packet) = self.recv().await {
                if packet.kind() == kind {
                    return packet;
                }
            }
        }
    }

    /// Skip frames until a passthrough frame with `id` arrives.
    pub async fn recv_passthrough(&mut self, id: i32) -> Bytes {
        loop {
            if let Inbound::Passthrough(frame) = self.recv().await {
                if frame.id == id {
                    return frame.body;
                }
            }
        }
    }

    /// Drain until the other side closes.
    pub async fn expect_closed(&mut self) {
        tokio::time::timeout(TIMEOUT, async {
            let mut buf = [0u8; 8192];
            loop {
                match self.stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
            }
        })
        .await
        .expect("connection stayed open");
    }
}

/// A backend that hands every accepted proxy connection to the test.
pub struct MockBackend {
    pub addr: SocketAddr,
    accepted: mpsc::UnboundedReceiver<Peer>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, accepted) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if tx.send(Peer::backend(stream)).is_err() {
                    break;
                }
            }
        });
        Self { addr, accepted }
    }

    /// The next proxy connection, if one arrives within `wait`.
    pub async fn try_accept(&mut self, wait: Duration) -> Option<Peer> {
        tokio::time::timeout(wait, self.accepted.recv()).await.ok().flatten()
    }

    pub async fn accept(&mut self) -> Peer {
        tokio::time::timeout(TIMEOUT, self.accepted.recv())
            .await
            .expect("proxy never connected")
            .expect("backend listener stopped")
    }
}

/// Poll `check` until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// An address nothing listens on.
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Offline-mode config on an ephemeral port; the first server is the default.
pub fn test_config(servers: &[(&str, SocketAddr)]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.proxy.online_mode = false;
    config.proxy.compression_threshold = -1;
    config.proxy.default_server = servers[0].0.to_string();
    config.servers = servers
        .iter()
        .map(|(name, addr)| ServerConfig {
            name: name.to_string(),
            address: addr.to_string(),
        })
        .collect();
    config.timeouts.connect_secs = 2;
    config.timeouts.login_secs = 2;
    config.timeouts.switch_ack_secs = 2;
    config.timeouts.shutdown_secs = 2;
    config
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub ctx: Arc<ProxyContext>,
    pub shutdown: Shutdown,
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    start_proxy_with(ProxyContext::builder(config)).await
}

pub async fn start_proxy_with(builder: ProxyContextBuilder) -> TestProxy {
    let running = lifecycle::start_with(builder, None).await.unwrap();
    let addr = running.local_addr().unwrap();
    let ctx = Arc::clone(running.context());
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(running.run(rx));
    TestProxy { addr, ctx, shutdown }
}

/// Stable per-name uuid for offline logins.
pub fn offline_uuid(name: &str) -> Uuid {
    let seed = name
        .bytes()
        .fold(0x5eed_u128, |acc, byte| acc.wrapping_mul(31).wrapping_add(u128::from(byte)));
    Uuid::from_u128(seed)
}

/// Handshake + Hello from a client.
pub async fn client_hello(addr: SocketAddr, name: &str) -> Peer {
    let mut client = Peer::client(addr).await;
    client
        .send(Handshake {
            protocol_version: PROTOCOL_VERSION,
            server_address: "localhost".into(),
            server_port: 25565,
            intent: Handshake::INTENT_LOGIN,
        })
        .await;
    client.set_state(ProtocolState::Login);
    client
        .send(Hello {
            username: name.into(),
            uuid: offline_uuid(name),
        })
        .await;
    client
}

/// Client side: wait for LoginSuccess, acknowledge, send settings.
pub async fn client_finish_login(client: &mut Peer) -> LoginSuccess {
    let success = match client.recv_kind(PacketKind::LoginSuccess).await {
        Packet::LoginSuccess(success) => success,
        other => panic!("unexpected {other:?}"),
    };
    client.send(LoginAcknowledged).await;
    client.set_state(ProtocolState::Configuration);
    client.send(client_information()).await;
    success
}

/// Client side: wait for FinishConfiguration and acknowledge it.
pub async fn client_enter_play(client: &mut Peer) {
    client.recv_kind(PacketKind::FinishConfiguration).await;
    client.send(FinishConfigurationAck).await;
    client.set_state(ProtocolState::Play);
}

/// Backend side: Handshake, Hello, LoginSuccess, LoginAcknowledged.
pub async fn backend_login(backend: &mut Peer) -> (Handshake, Hello) {
    let handshake = match backend.recv_packet().await {
        Packet::Handshake(handshake) => handshake,
        other => panic!("expected handshake, got {other:?}"),
    };
    backend.set_state(ProtocolState::Login);
    let hello = match backend.recv_packet().await {
        Packet::Hello(hello) => hello,
        other => panic!("expected hello, got {other:?}"),
    };
    backend
        .send(LoginSuccess {
            uuid: hello.uuid,
            username: hello.username.clone(),
            properties: Vec::new(),
        })
        .await;
    backend.recv_kind(PacketKind::LoginAcknowledged).await;
    backend.set_state(ProtocolState::Configuration);
    (handshake, hello)
}

/// Finish configuration on both ends: backend sends, client acks.
pub async fn enter_play(client: &mut Peer, server: &mut Peer) {
    server.send(FinishConfiguration).await;
    client_enter_play(client).await;
    server.recv_kind(PacketKind::FinishConfigurationAck).await;
    server.set_state(ProtocolState::Play);
}

/// Log `name` in through the proxy and walk both ends into PLAY.
pub async fn join(proxy: &TestProxy, backend: &mut MockBackend, name: &str) -> (Peer, Peer) {
    let mut client = client_hello(proxy.addr, name).await;
    let mut server = backend.accept().await;
    backend_login(&mut server).await;
    client_finish_login(&mut client).await;
    enter_play(&mut client, &mut server).await;
    (client, server)
}

pub fn client_information() -> ClientInformation {
    ClientInformation {
        locale: "en_us".into(),
        view_distance: 10,
        chat_mode: 0,
        chat_colors: true,
        displayed_skin_parts: 0x7F,
        main_hand: 1,
        text_filtering: false,
        allow_server_listings: true,
        particle_status: 0,
    }
}
