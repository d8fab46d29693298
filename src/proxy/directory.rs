//! Global lookup of live connections.
//!
//! # Responsibilities
//! - Find a connection by id, by player uuid, by player name
//!   (case-insensitive) or by the id of any of its physical links
//! - Refuse a second login with a name or uuid already online
//!
//! # Design Decisions
//! - `DashMap` shards, so link tasks on different worker threads can
//!   register and look up without a global lock
//! - Name and uuid are claimed with the entry API; a failed uuid claim
//!   releases the name it just took

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::GameProfile;
use crate::net::{ConnectionId, LinkId};
use crate::proxy::Connection;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("A player named {0} is already connected to this proxy")]
    DuplicateName(String),

    #[error("You are already connected to this proxy")]
    DuplicateUuid(Uuid),
}

#[derive(Debug, Default)]
pub struct Directory {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    by_uuid: DashMap<Uuid, ConnectionId>,
    by_name: DashMap<String, ConnectionId>,
    by_link: DashMap<LinkId, ConnectionId>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted connection under its id and upstream link.
    pub fn insert(&self, conn: &Arc<Connection>) {
        self.connections.insert(conn.id(), Arc::clone(conn));
        self.by_link.insert(conn.upstream().id(), conn.id());
    }

    /// Claim the player's name and uuid for `conn`.
    pub fn register_player(&self, conn: &Connection, profile: &GameProfile) -> Result<(), DirectoryError> {
        let name_key = profile.name.to_lowercase();
        match self.by_name.entry(name_key.clone()) {
            Entry::Occupied(_) => return Err(DirectoryError::DuplicateName(profile.name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(conn.id());
            }
        }
        match self.by_uuid.entry(profile.id) {
            Entry::Occupied(_) => {
                self.by_name.remove(&name_key);
                Err(DirectoryError::DuplicateUuid(profile.id))
            }
            Entry::Vacant(slot) => {
                slot.insert(conn.id());
                Ok(())
            }
        }
    }

    /// Associate a downstream link with its connection.
    pub fn link(&self, link: LinkId, conn: ConnectionId) {
        self.by_link.insert(link, conn);
    }

    pub fn unlink(&self, link: LinkId) {
        self.by_link.remove(&link);
    }

    /// Drop every entry that points at `conn`.
    pub fn remove(&self, conn: &Connection) {
        let id = conn.id();
        self.connections.remove(&id);
        self.by_link.retain(|_, owner| *owner != id);
        if let Some(profile) = conn.profile() {
            self.by_name.remove_if(&profile.name.to_lowercase(), |_, owner| *owner == id);
            self.by_uuid.remove_if(&profile.id, |_, owner| *owner == id);
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn by_uuid(&self, uuid: &Uuid) -> Option<Arc<Connection>> {
        let id = *self.by_uuid.get(uuid)?;
        self.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Connection>> {
        let id = *self.by_name.get(&name.to_lowercase())?;
        self.get(id)
    }

    pub fn by_link(&self, link: LinkId) -> Option<Arc<Connection>> {
        let id = *self.by_link.get(&link)?;
        self.get(id)
    }

    /// Every tracked connection, logged in or not.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Connections that completed login.
    pub fn players(&self) -> Vec<Arc<Connection>> {
        self.by_uuid
            .iter()
            .filter_map(|entry| self.get(*entry.value()))
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
