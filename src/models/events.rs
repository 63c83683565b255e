use serde::{Deserialize, Serialize};

use crate::models::grid::Grid;
use crate::models::room::{MoveRecord, PlayerState, RoomSnapshot};

/// Everything a room broadcasts to its subscribers. Delivery order within one
/// room matches the order the state machine applied the changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RoomEvent {
    PlayerJoined {
        player_id: String,
        players_count: usize,
    },
    PlayerReadyChanged {
        player_id: String,
        is_ready: bool,
        all_ready: bool,
    },
    GameStarted {
        room: RoomSnapshot,
        countdown_seconds: u32,
    },
    MoveMade {
        mv: MoveRecord,
        progress: Grid,
        player: PlayerState,
    },
    HintUsed {
        player_id: String,
        hints_remaining: u32,
        row: usize,
        col: usize,
        value: u8,
    },
    TimeUpdate {
        time_remaining: u32,
    },
    GameCompleted {
        winner_id: Option<String>,
        room: RoomSnapshot,
    },
    PlayerLeft {
        player_id: String,
        room: RoomSnapshot,
    },
    TimeUp {
        winner_id: Option<String>,
        room: RoomSnapshot,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kebab_case_tags() {
        let event = RoomEvent::PlayerJoined {
            player_id: "p1".to_string(),
            players_count: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"player-joined\""));

        let event = RoomEvent::TimeUpdate { time_remaining: 45 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"time-update\""));
        assert!(json.contains("\"time_remaining\":45"));
    }
}
