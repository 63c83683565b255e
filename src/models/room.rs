use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Waiting,
    Starting,
    InProgress,
    Completed,
    Cancelled,
}

impl RoomStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomStatus::Completed | RoomStatus::Cancelled)
    }
}

/// Immutable once the room is created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GameSettings {
    pub time_limit_seconds: u32,
    pub hints_allowed: u32,
    pub spectators_allowed: bool,
    pub max_spectators: u32,
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            time_limit_seconds: 1800,
            hints_allowed: 3,
            spectators_allowed: false,
            max_spectators: 0,
        }
    }
}

/// Live state of one player inside a room. The progress grid starts as a copy
/// of the room's puzzle and is mutated only by this player's valid moves.
#[derive(Debug, Clone)]
pub struct RoomPlayer {
    pub player_id: String,
    pub connection_id: String,
    pub is_ready: bool,
    pub is_connected: bool,
    pub progress: Grid,
    pub score: i64,
    pub move_count: u32,
    pub hints_used: u32,
    pub last_move_at: Option<DateTime<Utc>>,
}

impl RoomPlayer {
    pub fn new(player_id: &str, connection_id: &str, puzzle: Grid) -> Self {
        RoomPlayer {
            player_id: player_id.to_string(),
            connection_id: connection_id.to_string(),
            is_ready: false,
            is_connected: true,
            progress: puzzle,
            score: 0,
            move_count: 0,
            hints_used: 0,
            last_move_at: None,
        }
    }
}

/// One submitted move, valid or not. Appended to the room's audit log; only
/// valid moves touch the progress grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRecord {
    pub player_id: String,
    pub row: usize,
    pub col: usize,
    pub value: u8,
    pub timestamp: DateTime<Utc>,
    pub is_valid: bool,
}

/// Public per-player view carried in events and snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    pub player_id: String,
    pub is_ready: bool,
    pub is_connected: bool,
    pub score: i64,
    pub move_count: u32,
    pub hints_used: u32,
    pub filled_cells: usize,
}

impl From<&RoomPlayer> for PlayerState {
    fn from(player: &RoomPlayer) -> Self {
        PlayerState {
            player_id: player.player_id.clone(),
            is_ready: player.is_ready,
            is_connected: player.is_connected,
            score: player.score,
            move_count: player.move_count,
            hints_used: player.hints_used,
            filled_cells: player.progress.filled_count(),
        }
    }
}

/// Serializable view of a whole room, broadcast on lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub match_id: String,
    pub status: RoomStatus,
    pub time_remaining: u32,
    pub players: Vec<PlayerState>,
    pub winner_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(RoomStatus::Completed.is_terminal());
        assert!(RoomStatus::Cancelled.is_terminal());
        assert!(!RoomStatus::Waiting.is_terminal());
        assert!(!RoomStatus::InProgress.is_terminal());
    }

    #[test]
    fn new_player_starts_from_the_puzzle() {
        let mut puzzle = Grid::empty();
        puzzle.set(0, 0, 7);

        let player = RoomPlayer::new("p1", "conn-1", puzzle);
        assert_eq!(player.progress.get(0, 0), 7);
        assert!(player.is_connected);
        assert!(!player.is_ready);
        assert_eq!(player.score, 0);
    }

    #[test]
    fn player_state_reflects_progress() {
        let mut puzzle = Grid::empty();
        puzzle.set(0, 0, 7);
        let player = RoomPlayer::new("p1", "conn-1", puzzle);

        let state = PlayerState::from(&player);
        assert_eq!(state.filled_cells, 1);
        assert_eq!(state.player_id, "p1");
    }
}
