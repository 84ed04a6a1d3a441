//! Registry of joined players and the numeric id pool.

use crate::broadcast::SessionHandle;
use crate::config::MAX_PLAYER_IDS;
use log::info;
use protocol::{Position, ServerPacket};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Wire id of a joined player. `-1` is reserved for "yourself".
pub type PlayerId = i8;

/// Reasons a player cannot be admitted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server is full")]
    Full,
    #[error("{0} is already logged in")]
    AlreadyJoined(String),
}

/// Game-visible state of one joined session.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    /// Id in `1..=126`, unique among joined players
    pub id: PlayerId,
    /// Username as sent in the identification packet
    pub name: String,
    /// Last reported position in block units
    pub position: Position,
    /// Heading, 256 steps per full turn
    pub yaw: u8,
    pub pitch: u8,
    /// Outbound queue of the owning session
    pub session: SessionHandle,
}

impl PlayerRecord {
    /// The packet that makes this player visible to others.
    pub fn spawn_packet(&self) -> ServerPacket {
        ServerPacket::SpawnPlayer {
            player_id: self.id,
            name: self.name.clone(),
            position: self.position,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }

    /// The packet that relays this player's current pose.
    pub fn teleport_packet(&self) -> ServerPacket {
        ServerPacket::Teleport {
            player_id: self.id,
            position: self.position,
            yaw: self.yaw,
            pitch: self.pitch,
        }
    }
}

/// Joined players keyed by id, plus the pool of ids still free.
#[derive(Debug)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, PlayerRecord>,
    free_ids: BTreeSet<PlayerId>,
    max_users: usize,
}

impl PlayerRegistry {
    /// Creates an empty registry. `max_users` is capped at the id pool size.
    pub fn new(max_users: usize) -> Self {
        Self {
            players: BTreeMap::new(),
            free_ids: (1..=MAX_PLAYER_IDS as PlayerId).collect(),
            max_users: max_users.min(MAX_PLAYER_IDS),
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn max_users(&self) -> usize {
        self.max_users
    }

    /// Admits a player under the lowest free id.
    pub fn admit(
        &mut self,
        name: &str,
        position: Position,
        session: SessionHandle,
    ) -> Result<&PlayerRecord, RegistryError> {
        if self.find_by_name(name).is_some() {
            return Err(RegistryError::AlreadyJoined(name.to_string()));
        }
        if self.players.len() >= self.max_users {
            return Err(RegistryError::Full);
        }
        let id = self.free_ids.pop_first().ok_or(RegistryError::Full)?;

        let record = PlayerRecord {
            id,
            name: name.to_string(),
            position,
            yaw: 0,
            pitch: 0,
            session,
        };
        info!("Player {} admitted as id {}", name, id);
        Ok(self.players.entry(id).or_insert(record))
    }

    /// Removes a player and returns its id to the pool.
    pub fn remove(&mut self, id: PlayerId) -> Option<PlayerRecord> {
        let record = self.players.remove(&id)?;
        self.free_ids.insert(id);
        Some(record)
    }

    /// Looks up a joined player by id.
    pub fn get(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.get(&id)
    }

    /// Looks up a joined player by name, ignoring ASCII case.
    pub fn find_by_name(&self, name: &str) -> Option<&PlayerRecord> {
        self.players
            .values()
            .find(|record| record.name.eq_ignore_ascii_case(name))
    }

    /// Stores a new pose. Returns the updated record only when something
    /// actually changed.
    pub fn update_pose(
        &mut self,
        id: PlayerId,
        position: Position,
        yaw: u8,
        pitch: u8,
    ) -> Option<&PlayerRecord> {
        let record = self.players.get_mut(&id)?;
        if record.position == position && record.yaw == yaw && record.pitch == pitch {
            return None;
        }
        record.position = position;
        record.yaw = yaw;
        record.pitch = pitch;
        Some(record)
    }

    /// Joined players in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    /// Names of all joined players in id order.
    pub fn names(&self) -> Vec<String> {
        self.players.values().map(|record| record.name.clone()).collect()
    }

    /// Snapshot of recipient handles, optionally leaving one player out.
    pub fn recipients(&self, exclude: Option<PlayerId>) -> Vec<SessionHandle> {
        self.players
            .values()
            .filter(|record| Some(record.id) != exclude)
            .map(|record| record.session.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn handle() -> SessionHandle {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000);
        SessionHandle::new(addr, 8).0
    }

    #[test]
    fn test_ids_start_at_one_and_are_unique() {
        let mut registry = PlayerRegistry::new(126);
        let mut seen = HashSet::new();

        for i in 0..126 {
            let id = registry
                .admit(&format!("p{}", i), Position::default(), handle())
                .unwrap()
                .id;
            assert!((1..=126).contains(&id));
            assert!(seen.insert(id));
        }

        assert_eq!(
            registry.admit("extra", Position::default(), handle()).unwrap_err(),
            RegistryError::Full
        );
    }

    #[test]
    fn test_released_id_is_reused() {
        let mut registry = PlayerRegistry::new(10);
        let a = registry.admit("a", Position::default(), handle()).unwrap().id;
        let b = registry.admit("b", Position::default(), handle()).unwrap().id;
        assert_eq!((a, b), (1, 2));

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());

        let c = registry.admit("c", Position::default(), handle()).unwrap().id;
        assert_eq!(c, a);
    }

    #[test]
    fn test_max_users_enforced() {
        let mut registry = PlayerRegistry::new(1);
        registry.admit("a", Position::default(), handle()).unwrap();
        assert_eq!(
            registry.admit("b", Position::default(), handle()).unwrap_err(),
            RegistryError::Full
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PlayerRegistry::new(10);
        registry.admit("Alice", Position::default(), handle()).unwrap();
        assert!(matches!(
            registry.admit("alice", Position::default(), handle()),
            Err(RegistryError::AlreadyJoined(_))
        ));
    }

    #[test]
    fn test_update_pose_only_on_change() {
        let mut registry = PlayerRegistry::new(10);
        let id = registry.admit("a", Position::default(), handle()).unwrap().id;

        assert!(registry.update_pose(id, Position::default(), 0, 0).is_none());
        assert!(registry
            .update_pose(id, Position::new(1.0, 2.0, 3.0), 0, 0)
            .is_some());
        assert!(registry
            .update_pose(id, Position::new(1.0, 2.0, 3.0), 0, 0)
            .is_none());
        assert!(registry
            .update_pose(id, Position::new(1.0, 2.0, 3.0), 128, 0)
            .is_some());
        assert_eq!(registry.get(id).unwrap().yaw, 128);
        assert!(registry.update_pose(99, Position::default(), 1, 1).is_none());
    }

    #[test]
    fn test_recipients_exclude() {
        let mut registry = PlayerRegistry::new(10);
        let a = registry.admit("a", Position::default(), handle()).unwrap().id;
        registry.admit("b", Position::default(), handle()).unwrap();

        assert_eq!(registry.recipients(None).len(), 2);
        assert_eq!(registry.recipients(Some(a)).len(), 1);
    }
}
