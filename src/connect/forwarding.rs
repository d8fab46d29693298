//! Player info forwarding to backends.
//!
//! Legacy forwarding smuggles the real client address and the verified
//! profile through the handshake's server address field:
//! `host \0 client-ip \0 uuid-without-dashes \0 properties-json`.
//! The backend must be configured to expect it.

use std::net::IpAddr;

use crate::auth::GameProfile;
use crate::config::ForwardingMode;

/// The server address to put in the backend handshake.
pub fn handshake_address(
    mode: ForwardingMode,
    host: &str,
    client_ip: IpAddr,
    profile: &GameProfile,
) -> Result<String, serde_json::Error> {
    match mode {
        ForwardingMode::None => Ok(host.to_string()),
        ForwardingMode::Legacy => legacy_address(host, client_ip, profile),
    }
}

pub fn legacy_address(host: &str, client_ip: IpAddr, profile: &GameProfile) -> Result<String, serde_json::Error> {
    let properties = serde_json::to_string(&profile.properties)?;
    Ok(format!(
        "{host}\0{client_ip}\0{}\0{properties}",
        profile.id.simple()
    ))
}
