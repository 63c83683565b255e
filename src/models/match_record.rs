use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    Waiting,
    InProgress,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Ranked,
    Casual,
    /// Single-player race against the clock. Created without pairing.
    Solo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// The persisted record of one match, created by the matchmaking engine in
/// `Waiting` state and driven to a terminal status by its room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub player1_id: String,
    pub player2_id: Option<String>,
    pub puzzle: Grid,
    pub solution: Grid,
    pub match_type: MatchType,
    pub difficulty: Difficulty,
    pub status: MatchStatus,
    pub winner_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    pub fn new(
        player1_id: &str,
        player2_id: Option<&str>,
        puzzle: Grid,
        solution: Grid,
        match_type: MatchType,
        difficulty: Difficulty,
    ) -> Self {
        MatchRecord {
            match_id: Uuid::new_v4().to_string(),
            player1_id: player1_id.to_string(),
            player2_id: player2_id.map(str::to_string),
            puzzle,
            solution,
            match_type,
            difficulty,
            status: MatchStatus::Waiting,
            winner_id: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    pub fn involves(&self, player_id: &str) -> bool {
        self.player1_id == player_id || self.player2_id.as_deref() == Some(player_id)
    }

    /// How many players this match needs before its room can start.
    pub fn required_players(&self) -> usize {
        if self.player2_id.is_some() {
            2
        } else {
            1
        }
    }

    /// Wall-clock duration of the finished match, when both timestamps exist.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}
