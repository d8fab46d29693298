//! Protocol states, directions and the four-way per-connection state record.
//!
//! # Responsibilities
//! - Define the five protocol states and their legal transitions
//! - Track the four independent state values of one connection
//!
//! # Design Decisions
//! - Each value lives in its own atomic; no lock spans two of them
//! - A value is only written by the link task that owns its direction,
//!   so the load/store pair in `transition` never races with another writer
//! - Resetting the backend-facing pair is a separate, explicit operation
//!   since it is the only move that goes "backwards"

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Which way a message travels, from the proxy's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards the client.
    Clientbound,
    /// Towards the server (backend).
    Serverbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Clientbound => "clientbound",
            Direction::Serverbound => "serverbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five protocol phases.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolState {
    Handshake = 0,
    Status = 1,
    Login = 2,
    Configuration = 3,
    Play = 4,
}

impl ProtocolState {
    /// State selected by the intent field of a handshake.
    pub fn from_intent(intent: i32) -> Option<Self> {
        match intent {
            1 => Some(ProtocolState::Status),
            // 3 is a transfer, which logs in like a fresh connection
            2 | 3 => Some(ProtocolState::Login),
            _ => None,
        }
    }

    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: ProtocolState) -> bool {
        use ProtocolState::*;
        matches!(
            (self, next),
            (Handshake, Status)
                | (Handshake, Login)
                | (Login, Configuration)
                | (Configuration, Play)
                | (Play, Configuration)
        )
    }

    /// Unknown ids in these states are relayed verbatim instead of closing the link.
    pub fn allows_passthrough(self) -> bool {
        matches!(self, ProtocolState::Configuration | ProtocolState::Play)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolState::Handshake => "HANDSHAKE",
            ProtocolState::Status => "STATUS",
            ProtocolState::Login => "LOGIN",
            ProtocolState::Configuration => "CONFIGURATION",
            ProtocolState::Play => "PLAY",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ProtocolState::Status,
            2 => ProtocolState::Login,
            3 => ProtocolState::Configuration,
            4 => ProtocolState::Play,
            _ => ProtocolState::Handshake,
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the four half-duplex directions of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateSlot {
    /// Bytes the client sends that the proxy must interpret.
    ClientInbound = 0,
    /// Bytes the proxy sends to the client.
    ClientOutbound = 1,
    /// Bytes the proxy sends to the backend.
    BackendOutbound = 2,
    /// Bytes the backend sends that the proxy must interpret.
    BackendInbound = 3,
}

impl fmt::Display for StateSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateSlot::ClientInbound => "client-inbound",
            StateSlot::ClientOutbound => "client-outbound",
            StateSlot::BackendOutbound => "backend-outbound",
            StateSlot::BackendInbound => "backend-inbound",
        };
        f.write_str(name)
    }
}

/// Rejected state change.
#[derive(Debug, Error)]
#[error("illegal {slot} transition from {from} to {to}")]
pub struct StateError {
    pub slot: StateSlot,
    pub from: ProtocolState,
    pub to: ProtocolState,
}

/// The four protocol-state values of one connection.
#[derive(Debug)]
pub struct ProtocolStates {
    slots: [AtomicU8; 4],
}

impl ProtocolStates {
    /// All four values start in HANDSHAKE.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU8::new(ProtocolState::Handshake as u8)),
        }
    }

    pub fn get(&self, slot: StateSlot) -> ProtocolState {
        ProtocolState::from_u8(self.slots[slot as usize].load(Ordering::Acquire))
    }

    /// Move `slot` to `next`, returning the previous state.
    ///
    /// Moving to the current state is a no-op.
    pub fn transition(&self, slot: StateSlot, next: ProtocolState) -> Result<ProtocolState, StateError> {
        let current = self.get(slot);
        if current == next {
            return Ok(current);
        }
        if !current.can_transition_to(next) {
            return Err(StateError { slot, from: current, to: next });
        }
        self.slots[slot as usize].store(next as u8, Ordering::Release);
        tracing::debug!(%slot, from = %current, to = %next, "Protocol state changed");
        Ok(current)
    }

    /// Put both backend-facing values back to HANDSHAKE ahead of a new backend login.
    pub fn reset_backend(&self) {
        for slot in [StateSlot::BackendOutbound, StateSlot::BackendInbound] {
            self.slots[slot as usize].store(ProtocolState::Handshake as u8, Ordering::Release);
        }
    }
}

impl Default for ProtocolStates {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        use ProtocolState::*;
        assert!(Handshake.can_transition_to(Status));
        assert!(Handshake.can_transition_to(Login));
        assert!(Login.can_transition_to(Configuration));
        assert!(Configuration.can_transition_to(Play));
        assert!(Play.can_transition_to(Configuration));

        assert!(!Status.can_transition_to(Login));
        assert!(!Login.can_transition_to(Handshake));
        assert!(!Login.can_transition_to(Play));
        assert!(!Play.can_transition_to(Login));
        assert!(!Configuration.can_transition_to(Login));
    }

    #[test]
    fn intent_mapping() {
        assert_eq!(ProtocolState::from_intent(1), Some(ProtocolState::Status));
        assert_eq!(ProtocolState::from_intent(2), Some(ProtocolState::Login));
        assert_eq!(ProtocolState::from_intent(3), Some(ProtocolState::Login));
        assert_eq!(ProtocolState::from_intent(0), None);
        assert_eq!(ProtocolState::from_intent(4), None);
    }

    #[test]
    fn illegal_transition_is_rejected_and_leaves_state() {
        let states = ProtocolStates::new();
        let err = states
            .transition(StateSlot::ClientInbound, ProtocolState::Play)
            .unwrap_err();
        assert_eq!(err.from, ProtocolState::Handshake);
        assert_eq!(states.get(StateSlot::ClientInbound), ProtocolState::Handshake);
    }

    #[test]
    fn slots_are_isolated() {
        let states = ProtocolStates::new();
        states.transition(StateSlot::ClientInbound, ProtocolState::Login).unwrap();
        states.transition(StateSlot::ClientInbound, ProtocolState::Configuration).unwrap();

        assert_eq!(states.get(StateSlot::ClientInbound), ProtocolState::Configuration);
        assert_eq!(states.get(StateSlot::ClientOutbound), ProtocolState::Handshake);
        assert_eq!(states.get(StateSlot::BackendOutbound), ProtocolState::Handshake);
        assert_eq!(states.get(StateSlot::BackendInbound), ProtocolState::Handshake);

        states.transition(StateSlot::BackendOutbound, ProtocolState::Login).unwrap();
        assert_eq!(states.get(StateSlot::ClientInbound), ProtocolState::Configuration);
    }

    #[test]
    fn reset_backend_only_touches_backend_pair() {
        let states = ProtocolStates::new();
        for slot in [
            StateSlot::ClientInbound,
            StateSlot::ClientOutbound,
            StateSlot::BackendOutbound,
            StateSlot::BackendInbound,
        ] {
            states.transition(slot, ProtocolState::Login).unwrap();
            states.transition(slot, ProtocolState::Configuration).unwrap();
        }

        states.reset_backend();

        assert_eq!(states.get(StateSlot::ClientInbound), ProtocolState::Configuration);
        assert_eq!(states.get(StateSlot::ClientOutbound), ProtocolState::Configuration);
        assert_eq!(states.get(StateSlot::BackendOutbound), ProtocolState::Handshake);
        assert_eq!(states.get(StateSlot::BackendInbound), ProtocolState::Handshake);
    }

    #[test]
    fn same_state_is_noop() {
        let states = ProtocolStates::new();
        assert_eq!(
            states.transition(StateSlot::ClientOutbound, ProtocolState::Handshake).unwrap(),
            ProtocolState::Handshake
        );
    }
}
