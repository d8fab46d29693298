//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (default server exists)
//! - Validate value ranges (timeouts > 0, threshold >= -1, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("no servers configured")]
    NoServers,

    #[error("server name must not be empty")]
    EmptyServerName,

    #[error("duplicate server name '{0}'")]
    DuplicateServer(String),

    #[error("server '{name}' has malformed address '{address}'")]
    InvalidServerAddress { name: String, address: String },

    #[error("default server '{0}' is not defined")]
    UnknownDefaultServer(String),

    #[error("proxy.compression_threshold must be -1 or greater, got {0}")]
    InvalidCompressionThreshold(i32),

    #[error("auth.session_url '{0}' is not a valid http(s) URL")]
    InvalidSessionUrl(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }
    let mut seen = HashSet::new();
    for server in &config.servers {
        if server.name.is_empty() {
            errors.push(ValidationError::EmptyServerName);
        } else if !seen.insert(server.name.to_lowercase()) {
            errors.push(ValidationError::DuplicateServer(server.name.clone()));
        }
        if !is_host_port(&server.address) {
            errors.push(ValidationError::InvalidServerAddress {
                name: server.name.clone(),
                address: server.address.clone(),
            });
        }
    }
    if !config.servers.is_empty() && !seen.contains(&config.proxy.default_server.to_lowercase()) {
        errors.push(ValidationError::UnknownDefaultServer(config.proxy.default_server.clone()));
    }

    if config.proxy.compression_threshold < -1 {
        errors.push(ValidationError::InvalidCompressionThreshold(config.proxy.compression_threshold));
    }

    match url::Url::parse(&config.auth.session_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => errors.push(ValidationError::InvalidSessionUrl(config.auth.session_url.clone())),
    }

    for (name, value) in [
        ("auth.timeout_secs", config.auth.timeout_secs),
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.login_secs", config.timeouts.login_secs),
        ("timeouts.switch_ack_secs", config.timeouts.switch_ack_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a numeric port. Hostnames are not resolved here.
fn is_host_port(address: &str) -> bool {
    if address.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Resolve a configured backend address to a socket address.
pub fn resolve_address(address: &str) -> std::io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, format!("no address for {address}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServerConfig;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.proxy.default_server = "hub".into();
        config.proxy.compression_threshold = -5;
        config.timeouts.login_secs = 0;
        config.auth.session_url = "not a url".into();
        config.servers.push(ServerConfig { name: "Lobby".into(), address: "nowhere".into() });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::UnknownDefaultServer("hub".into())));
        assert!(errors.contains(&ValidationError::InvalidCompressionThreshold(-5)));
        assert!(errors.contains(&ValidationError::ZeroTimeout("timeouts.login_secs")));
        assert!(errors.contains(&ValidationError::InvalidSessionUrl("not a url".into())));
        assert!(errors.contains(&ValidationError::DuplicateServer("Lobby".into())));
        assert!(errors.contains(&ValidationError::InvalidServerAddress {
            name: "Lobby".into(),
            address: "nowhere".into(),
        }));
    }

    #[test]
    fn hostnames_are_accepted() {
        assert!(is_host_port("mc.example.net:25565"));
        assert!(is_host_port("[::1]:25565"));
        assert!(!is_host_port("mc.example.net"));
        assert!(!is_host_port(":25565"));
    }

    #[test]
    fn disabled_compression_is_valid() {
        let mut config = ProxyConfig::default();
        config.proxy.compression_threshold = -1;
        assert!(validate_config(&config).is_ok());
    }
}
