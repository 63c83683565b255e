use serde::{Deserialize, Serialize};

/// A player's skill estimate, recomputed from finished-match history on every
/// read. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRating {
    pub rating: f64,
    pub games_played: usize,
    pub win_rate: f64,
    pub average_completion_seconds: Option<f64>,
}

/// Baseline rating for a player with no finished matches.
pub const DEFAULT_RATING: f64 = 1000.0;

impl Default for PlayerRating {
    fn default() -> Self {
        PlayerRating {
            rating: DEFAULT_RATING,
            games_played: 0,
            win_rate: 0.0,
            average_completion_seconds: None,
        }
    }
}
