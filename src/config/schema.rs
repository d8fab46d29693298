//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Login and routing behaviour.
    pub proxy: ProxySettings,

    /// Session service used in online mode.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Backend server definitions.
    pub servers: Vec<ServerConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            proxy: ProxySettings::default(),
            auth: AuthConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
            servers: vec![ServerConfig {
                name: "lobby".to_string(),
                address: "127.0.0.1:25566".to_string(),
            }],
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:25565").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:25565".to_string(),
            max_connections: 10_000,
        }
    }
}

/// How the player's identity reaches the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ForwardingMode {
    /// Backend sees the proxy's address and the name from Hello.
    #[default]
    None,
    /// BungeeCord-style: ip, uuid and properties packed into the handshake address.
    Legacy,
}

/// Login and routing behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Verify players against the session service.
    pub online_mode: bool,

    /// Server every player is sent to after login.
    pub default_server: String,

    /// Compression threshold towards clients; -1 disables compression.
    pub compression_threshold: i32,

    /// Description shown in the server list.
    pub motd: String,

    /// Player cap advertised in the server list.
    pub max_players: u32,

    /// Player information forwarding towards backends.
    pub forwarding: ForwardingMode,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            online_mode: true,
            default_server: "lobby".to_string(),
            compression_threshold: 256,
            motd: "A switchyard proxy".to_string(),
            max_players: 500,
            forwarding: ForwardingMode::None,
        }
    }
}

/// Session service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// `hasJoined` endpoint.
    pub session_url: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_url: "https://sessionserver.mojang.com/session/minecraft/hasJoined".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Timeout configuration for the connect and switch steps.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect to a backend, in seconds.
    pub connect_secs: u64,

    /// Backend handshake and login, in seconds.
    pub login_secs: u64,

    /// Wait for the client's configuration acknowledgement during a switch, in seconds.
    pub switch_ack_secs: u64,

    /// Drain period on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            login_secs: 10,
            switch_ack_secs: 10,
            shutdown_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}

/// Backend server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Unique server name players are sent to.
    pub name: String,

    /// Backend address (e.g., "127.0.0.1:25566").
    pub address: String,
}
