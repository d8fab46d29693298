//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define the proxy's metrics
//! - Expose them on a Prometheus endpoint when enabled
//!
//! # Metrics
//! - `switchyard_connections_total` (counter): accepted client connections
//! - `switchyard_connections_active` (gauge): client connections alive now
//! - `switchyard_players_online` (gauge): connections past login
//! - `switchyard_packets_forwarded_total` (counter): relayed typed packets, by direction
//! - `switchyard_passthrough_frames_total` (counter): relayed unmodelled frames, by direction
//! - `switchyard_logins_total` (counter): login outcomes, by mode and result
//! - `switchyard_connects_total` (counter): backend connect outcomes, by kind and result
//!
//! # Design Decisions
//! - Call sites go through the small helpers below so names and labels
//!   stay in one place
//! - Without an installed recorder every update is a no-op

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::proxy::Role;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe();
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

fn describe() {
    describe_counter!("switchyard_connections_total", "Accepted client connections");
    describe_gauge!("switchyard_connections_active", "Client connections currently open");
    describe_gauge!("switchyard_players_online", "Connections that completed login");
    describe_counter!("switchyard_packets_forwarded_total", "Typed packets relayed between client and backend");
    describe_counter!("switchyard_passthrough_frames_total", "Unmodelled frames relayed verbatim");
    describe_counter!("switchyard_logins_total", "Login attempts by outcome");
    describe_counter!("switchyard_connects_total", "Backend connect attempts by outcome");
}

fn direction(role: Role) -> &'static str {
    // the link that writes decides the direction
    match role {
        Role::Upstream => "clientbound",
        Role::Downstream => "serverbound",
    }
}

pub fn record_connection_opened() {
    counter!("switchyard_connections_total").increment(1);
}

pub fn record_forwarded(writer: Role) {
    counter!("switchyard_packets_forwarded_total", "direction" => direction(writer)).increment(1);
}

pub fn record_passthrough(writer: Role) {
    counter!("switchyard_passthrough_frames_total", "direction" => direction(writer)).increment(1);
}

pub fn record_login(mode: &'static str, outcome: &'static str) {
    counter!("switchyard_logins_total", "mode" => mode, "outcome" => outcome).increment(1);
}

pub fn record_connect(kind: &'static str, outcome: &'static str) {
    counter!("switchyard_connects_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn player_joined() {
    gauge!("switchyard_players_online").increment(1.0);
}

pub fn player_left() {
    gauge!("switchyard_players_online").decrement(1.0);
}
