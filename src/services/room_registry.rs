use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::models::room::GameSettings;
use crate::repositories::match_repository::MatchRepository;
use crate::repositories::transport_repository::TransportRepository;
use crate::services::errors::room_service_errors::RoomServiceError;
use crate::services::room_service::GameRoom;
use crate::services::sudoku_service::PuzzleService;

/// Terminal rooms stay addressable this long so clients can fetch results.
const TERMINAL_RETENTION_SECS: u64 = 300;
/// Rooms with no activity for this long are cancelled and evicted.
const IDLE_TIMEOUT_SECS: u64 = 1800;

/// Process-wide directory of live rooms, keyed by a deterministic id derived
/// from the match id. Pure bookkeeping: rooms own their state; the registry
/// owns their lifetime.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<GameRoom>>>,
    matches: Arc<dyn MatchRepository>,
    transport: Arc<dyn TransportRepository>,
    puzzles: Arc<dyn PuzzleService>,
}

impl RoomRegistry {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        transport: Arc<dyn TransportRepository>,
        puzzles: Arc<dyn PuzzleService>,
    ) -> Self {
        RoomRegistry {
            rooms: Mutex::new(HashMap::new()),
            matches,
            transport,
            puzzles,
        }
    }

    /// The room id for a match id. Deterministic, so repeated lookups by
    /// match id are idempotent.
    pub fn room_id_for(match_id: &str) -> String {
        format!("room-{}", match_id)
    }

    /// Get or create the room for a match. Fails when the match record does
    /// not exist; an already-registered room is returned as-is.
    pub async fn create(
        &self,
        match_id: &str,
        settings: Option<GameSettings>,
    ) -> Result<Arc<GameRoom>, RoomServiceError> {
        let room_id = Self::room_id_for(match_id);
        if let Some(room) = self.rooms.lock().await.get(&room_id) {
            return Ok(room.clone());
        }

        let record = self
            .matches
            .get_match(match_id)
            .await?
            .ok_or(RoomServiceError::MatchNotFound)?;

        let room = GameRoom::from_match(
            room_id.clone(),
            &record,
            settings.unwrap_or_default(),
            self.matches.clone(),
            self.transport.clone(),
            self.puzzles.clone(),
        );

        // A concurrent create for the same match may have won while the
        // record was loading; keep whichever room registered first.
        let mut rooms = self.rooms.lock().await;
        let registered = rooms.entry(room_id.clone()).or_insert(room).clone();
        info!(room_id = %room_id, match_id, "Room registered");
        Ok(registered)
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<GameRoom>> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    pub async fn get_by_match(&self, match_id: &str) -> Option<Arc<GameRoom>> {
        self.get(&Self::room_id_for(match_id)).await
    }

    /// Drop a room, stopping its timers. Returns false if it was not there.
    pub async fn remove(&self, room_id: &str) -> bool {
        let removed = self.rooms.lock().await.remove(room_id);
        match removed {
            Some(room) => {
                room.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.rooms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.lock().await.is_empty()
    }

    /// One maintenance pass: retry deferred settlements, evict terminal
    /// rooms past their retention window, cancel and evict idle rooms.
    /// Returns how many rooms were evicted.
    pub async fn sweep(&self) -> usize {
        // Work on a snapshot of the map so one room's lock is never awaited
        // while the registry lock is held.
        let entries: Vec<(String, Arc<GameRoom>)> = self
            .rooms
            .lock()
            .await
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect();

        let mut evict = Vec::new();
        for (room_id, room) in entries {
            room.retry_settlement().await;

            if let Some(terminal_for) = room.terminal_for().await {
                if terminal_for >= Duration::from_secs(TERMINAL_RETENTION_SECS) {
                    evict.push(room_id);
                }
            } else if room.idle_for().await >= Duration::from_secs(IDLE_TIMEOUT_SECS) {
                room.cancel_abandoned().await;
                evict.push(room_id);
            }
        }

        let mut rooms = self.rooms.lock().await;
        let mut evicted = 0;
        for room_id in evict {
            if let Some(room) = rooms.remove(&room_id) {
                room.shutdown().await;
                evicted += 1;
                info!(room_id = %room_id, "Room evicted");
            }
        }
        evicted
    }

    /// Periodic sweep; stops once the registry is dropped.
    pub fn start_sweep_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::grid::Grid;
    use crate::models::match_record::{Difficulty, MatchRecord, MatchStatus, MatchType};
    use crate::repositories::match_repository::InMemoryMatchRepository;
    use crate::repositories::transport_repository::BroadcastTransport;
    use crate::services::sudoku_service::SudokuService;

    async fn registry_with_match() -> (Arc<RoomRegistry>, Arc<InMemoryMatchRepository>, String) {
        let matches = Arc::new(InMemoryMatchRepository::new());
        let record = MatchRecord::new(
            "p1",
            Some("p2"),
            Grid::empty(),
            Grid::empty(),
            MatchType::Ranked,
            Difficulty::Medium,
        );
        matches.create_match(&record).await.unwrap();

        let registry = Arc::new(RoomRegistry::new(
            matches.clone(),
            Arc::new(BroadcastTransport::default()),
            Arc::new(SudokuService::new()),
        ));
        (registry, matches, record.match_id)
    }

    #[tokio::test]
    async fn create_requires_an_existing_match() {
        let (registry, _, _) = registry_with_match().await;
        let err = registry.create("no-such-match", None).await.unwrap_err();
        assert!(matches!(err, RoomServiceError::MatchNotFound));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn create_is_idempotent_per_match() {
        let (registry, _, match_id) = registry_with_match().await;

        let first = registry.create(&match_id, None).await.unwrap();
        let second = registry.create(&match_id, None).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn lookup_by_match_id_is_deterministic() {
        let (registry, _, match_id) = registry_with_match().await;
        let room = registry.create(&match_id, None).await.unwrap();

        assert_eq!(room.room_id, RoomRegistry::room_id_for(&match_id));
        let found = registry.get_by_match(&match_id).await.unwrap();
        assert!(Arc::ptr_eq(&room, &found));
        assert!(registry.get("room-bogus").await.is_none());
    }

    #[tokio::test]
    async fn remove_drops_the_room() {
        let (registry, _, match_id) = registry_with_match().await;
        let room = registry.create(&match_id, None).await.unwrap();

        assert!(registry.remove(&room.room_id).await);
        assert!(!registry.remove(&room.room_id).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_fresh_terminal_rooms_then_evicts() {
        let (registry, matches, match_id) = registry_with_match().await;
        let room = registry.create(&match_id, None).await.unwrap();
        room.cancel_abandoned().await;

        // Inside the retention window: still addressable.
        assert_eq!(registry.sweep().await, 0);
        assert_eq!(registry.len().await, 1);

        tokio::time::sleep(Duration::from_secs(TERMINAL_RETENTION_SECS + 1)).await;
        assert_eq!(registry.sweep().await, 1);
        assert!(registry.is_empty().await);

        let stored = matches.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_cancels_rooms_idle_past_the_threshold() {
        let (registry, matches, match_id) = registry_with_match().await;
        registry.create(&match_id, None).await.unwrap();

        tokio::time::sleep(Duration::from_secs(IDLE_TIMEOUT_SECS + 1)).await;
        assert_eq!(registry.sweep().await, 1);
        assert!(registry.is_empty().await);

        // The abandoned match is settled as cancelled.
        let stored = matches.get_match(&match_id).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_leaves_active_rooms_alone() {
        let (registry, _, match_id) = registry_with_match().await;
        let room = registry.create(&match_id, None).await.unwrap();
        room.join("p1", "conn-1").await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.sweep().await, 0);
        assert_eq!(registry.len().await, 1);
    }
}
