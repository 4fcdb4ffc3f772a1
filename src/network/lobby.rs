//! Room Registry
//!
//! Creates rooms on first use, hands out their handles and tears them down.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::rng::DeterministicRng;
use crate::game::problem::{ProblemSource, RandomProblems};
use crate::network::room::{Room, RoomConfig, RoomError, RoomHandle, DEFAULT_ROOM};

/// Manages all active rooms.
pub struct RoomManager {
    rooms: RwLock<BTreeMap<String, RoomHandle>>,
    config: RoomConfig,
    /// Fixed seed for reproducible games. `None` seeds from the clock.
    seed: Option<u64>,
}

impl RoomManager {
    /// Create an empty registry.
    pub fn new(config: RoomConfig, seed: Option<u64>) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            config,
            seed,
        }
    }

    /// Handle for `room_id`, spawning the room if it is missing or stopped.
    pub async fn get_or_create(&self, room_id: &str) -> RoomHandle {
        {
            let rooms = self.rooms.read().await;
            if let Some(handle) = rooms.get(room_id) {
                if !handle.is_closed() {
                    return handle.clone();
                }
            }
        }

        let mut rooms = self.rooms.write().await;
        // Another connection may have created it meanwhile
        if let Some(handle) = rooms.get(room_id) {
            if !handle.is_closed() {
                return handle.clone();
            }
        }

        let handle = Room::spawn(room_id, self.config.clone(), self.problems_for(room_id));
        rooms.insert(room_id.to_string(), handle.clone());
        info!(room = %room_id, rooms = rooms.len(), "Created room");
        handle
    }

    /// Handle for an existing room.
    pub async fn get(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.rooms.read().await;
        rooms.get(room_id).filter(|h| !h.is_closed()).cloned()
    }

    /// Start a new game in a room.
    pub async fn reset_room(&self, room_id: &str) -> Result<(), RoomError> {
        match self.get(room_id).await {
            Some(handle) => handle.reset().await,
            None => Err(RoomError::NotFound(room_id.to_string())),
        }
    }

    /// Stop a room and forget it. Returns false if it did not exist.
    pub async fn remove_room(&self, room_id: &str) -> bool {
        let removed = self.rooms.write().await.remove(room_id);
        match removed {
            Some(handle) => {
                let _ = handle.shutdown().await;
                info!(room = %room_id, "Removed room");
                true
            }
            None => false,
        }
    }

    /// Number of registered rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Drop stopped rooms and stop idle ones other than the default room.
    ///
    /// Idleness is decided by the room itself. A client that races the
    /// cleanup either keeps the room alive or finds it closed and gets a
    /// fresh one from `get_or_create`.
    pub async fn cleanup(&self) {
        let handles: Vec<RoomHandle> = self
            .rooms
            .read()
            .await
            .values()
            .filter(|h| h.id() != DEFAULT_ROOM || h.is_closed())
            .cloned()
            .collect();

        for handle in handles {
            let stopped = handle.shutdown_if_idle().await.unwrap_or(true);
            if !stopped {
                continue;
            }

            let mut rooms = self.rooms.write().await;
            // Leave a replacement spawned in the meantime alone
            if rooms.get(handle.id()).is_some_and(|h| h.same_room(&handle)) {
                rooms.remove(handle.id());
                debug!(room = %handle.id(), "Cleaned up room");
            }
        }
    }

    /// Stop every room.
    pub async fn shutdown_all(&self) {
        let rooms = std::mem::take(&mut *self.rooms.write().await);
        for (_, handle) in rooms {
            let _ = handle.shutdown().await;
        }
    }

    fn problems_for(&self, room_id: &str) -> Box<dyn ProblemSource> {
        let entropy = self.seed.unwrap_or_else(clock_entropy);
        Box::new(RandomProblems::from_rng(DeterministicRng::for_room(room_id, entropy)))
    }
}

fn clock_entropy() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{ConnectionId, RoundPhase};
    use crate::network::protocol::ServerMessage;
    use tokio::sync::mpsc;

    fn manager(seed: Option<u64>) -> RoomManager {
        RoomManager::new(RoomConfig::default(), seed)
    }

    async fn first_problem(handle: &RoomHandle) -> ServerMessage {
        let (tx, mut rx) = mpsc::channel(8);
        handle.connect(ConnectionId::from_u128(1), tx).await.unwrap();
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_room() {
        let rooms = manager(None);
        let a = rooms.get_or_create("lobby").await;
        let b = rooms.get_or_create("lobby").await;
        assert_eq!(a.id(), b.id());
        assert_eq!(rooms.room_count().await, 1);

        rooms.get_or_create("finals").await;
        assert_eq!(rooms.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_fixed_seed_gives_reproducible_rooms() {
        let first = manager(Some(77));
        let second = manager(Some(77));

        let a = first_problem(&first.get_or_create("lobby").await).await;
        let b = first_problem(&second.get_or_create("lobby").await).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_remove_room() {
        let rooms = manager(None);
        let handle = rooms.get_or_create("finals").await;

        assert!(rooms.remove_room("finals").await);
        assert!(!rooms.remove_room("finals").await);
        assert!(rooms.get("finals").await.is_none());
        assert!(handle.status().await.is_err());
    }

    #[tokio::test]
    async fn test_reset_missing_room() {
        let rooms = manager(None);
        assert!(matches!(rooms.reset_room("nowhere").await, Err(RoomError::NotFound(_))));

        rooms.get_or_create("lobby").await;
        rooms.reset_room("lobby").await.unwrap();
        let status = rooms.get("lobby").await.unwrap().status().await.unwrap();
        assert_eq!(status.phase, RoundPhase::Open);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_default_and_busy_rooms() {
        let rooms = manager(None);
        rooms.get_or_create(DEFAULT_ROOM).await;
        rooms.get_or_create("empty").await;
        let busy = rooms.get_or_create("busy").await;
        let (tx, _rx) = mpsc::channel(8);
        busy.connect(ConnectionId::from_u128(9), tx).await.unwrap();

        rooms.cleanup().await;

        assert!(rooms.get(DEFAULT_ROOM).await.is_some());
        assert!(rooms.get("busy").await.is_some());
        assert!(rooms.get("empty").await.is_none());
        assert_eq!(rooms.room_count().await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_then_reconnect_gets_fresh_room() {
        let rooms = manager(None);
        let stale = rooms.get_or_create("finals").await;

        rooms.cleanup().await;
        assert!(rooms.get("finals").await.is_none());

        // A handle fetched before cleanup now refuses the client
        let (tx, _rx) = mpsc::channel(8);
        assert!(stale.connect(ConnectionId::from_u128(3), tx.clone()).await.is_err());

        let fresh = rooms.get_or_create("finals").await;
        assert!(!fresh.same_room(&stale));
        fresh.connect(ConnectionId::from_u128(3), tx).await.unwrap();
        assert_eq!(fresh.status().await.unwrap().clients, 1);
    }

    #[tokio::test]
    async fn test_cleanup_does_not_remove_replacement() {
        let rooms = manager(None);
        let old = rooms.get_or_create("finals").await;
        old.shutdown().await.unwrap();

        // Wait for the old task to stop, then let a client respawn the room
        while !old.is_closed() {
            tokio::task::yield_now().await;
        }
        let replacement = rooms.get_or_create("finals").await;
        let (tx, _rx) = mpsc::channel(8);
        replacement.connect(ConnectionId::from_u128(4), tx).await.unwrap();

        rooms.cleanup().await;
        let kept = rooms.get("finals").await.unwrap();
        assert!(kept.same_room(&replacement));
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let rooms = manager(None);
        let handle = rooms.get_or_create("lobby").await;
        rooms.shutdown_all().await;

        assert_eq!(rooms.room_count().await, 0);
        assert!(handle.status().await.is_err());
    }
}
