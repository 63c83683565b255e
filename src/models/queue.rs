use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::match_record::{Difficulty, MatchType};

/// The requester's stance on opponent skill. Biases candidate scoring during
/// skill-based pairing; never eliminates a candidate outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentPreference {
    #[default]
    Similar,
    Higher,
    Lower,
    Any,
}

/// One waiting player. At most one entry per player exists across the queue;
/// re-enqueueing replaces the previous entry.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub player_id: String,
    pub difficulty: Difficulty,
    pub match_type: MatchType,
    pub rating: f64,
    pub preference: OpponentPreference,
    /// Monotonic clock for wait-time math.
    pub enqueued: Instant,
    /// Wall clock, for reporting only.
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        player_id: &str,
        difficulty: Difficulty,
        match_type: MatchType,
        rating: f64,
        preference: OpponentPreference,
    ) -> Self {
        QueueEntry {
            player_id: player_id.to_string(),
            difficulty,
            match_type,
            rating,
            preference,
            enqueued: Instant::now(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn waited_secs(&self) -> u64 {
        self.enqueued.elapsed().as_secs()
    }

    pub fn compatible_with(&self, other: &QueueEntry) -> bool {
        self.difficulty == other.difficulty && self.match_type == other.match_type
    }
}

/// Queue position report for UI polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub position: usize,
    pub wait_time_ms: u64,
    pub current_skill_window: f64,
    pub estimated_wait_ms: u64,
}

/// Outcome of an enqueue call: either an opponent was found and a match
/// created, or the player is now waiting.
#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched { match_id: String },
    Queued { status: QueueStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_requires_same_difficulty_and_type() {
        let a = QueueEntry::new(
            "a",
            Difficulty::Medium,
            MatchType::Ranked,
            1000.0,
            OpponentPreference::Similar,
        );
        let b = QueueEntry::new(
            "b",
            Difficulty::Medium,
            MatchType::Ranked,
            1400.0,
            OpponentPreference::Any,
        );
        let c = QueueEntry::new(
            "c",
            Difficulty::Hard,
            MatchType::Ranked,
            1000.0,
            OpponentPreference::Similar,
        );
        let d = QueueEntry::new(
            "d",
            Difficulty::Medium,
            MatchType::Casual,
            1000.0,
            OpponentPreference::Similar,
        );

        assert!(a.compatible_with(&b));
        assert!(!a.compatible_with(&c));
        assert!(!a.compatible_with(&d));
    }

    #[test]
    fn preference_defaults_to_similar() {
        assert_eq!(OpponentPreference::default(), OpponentPreference::Similar);
    }
}
