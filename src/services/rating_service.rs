use std::sync::Arc;

use tracing::warn;

use crate::models::rating::{PlayerRating, DEFAULT_RATING};
use crate::repositories::match_repository::MatchRepository;

/// ELO K-factor applied per finished match.
const K_FACTOR: f64 = 32.0;
/// Baseline opponent rating used when true opponent history is unavailable.
const BASELINE_OPPONENT: f64 = 1000.0;
/// Completion-time reference: finishing faster than this raises the rating,
/// slower lowers it, bounded either way.
const REFERENCE_COMPLETION_SECS: f64 = 300.0;
/// Only the most recent matches feed the walk.
const HISTORY_LIMIT: usize = 50;

/// Derives a player's current rating from their finished-match history. Pure
/// read; holds no state of its own.
#[derive(Clone)]
pub struct RatingService {
    matches: Arc<dyn MatchRepository>,
}

impl RatingService {
    pub fn new(matches: Arc<dyn MatchRepository>) -> Self {
        RatingService { matches }
    }

    /// Never fails: repository trouble or an empty history both degrade to
    /// the default rating.
    pub async fn estimate(&self, player_id: &str) -> PlayerRating {
        let mut history = match self
            .matches
            .find_finished_matches(player_id, HISTORY_LIMIT)
            .await
        {
            Ok(history) => history,
            Err(err) => {
                warn!(player_id, error = %err, "Rating history unavailable, using default");
                return PlayerRating::default();
            }
        };

        if history.is_empty() {
            return PlayerRating::default();
        }

        // The repository returns newest first; the walk is chronological.
        history.reverse();

        let mut rating = DEFAULT_RATING;
        let mut wins = 0usize;
        let mut durations: Vec<f64> = Vec::new();

        for record in &history {
            let won = record.winner_id.as_deref() == Some(player_id);
            if won {
                wins += 1;
            }

            let expected = 1.0 / (1.0 + 10f64.powf((BASELINE_OPPONENT - rating) / 400.0));
            let actual = if won { 1.0 } else { 0.0 };
            rating += K_FACTOR * (actual - expected);

            if let Some(secs) = record.duration_seconds() {
                if secs > 0 {
                    durations.push(secs as f64);
                }
            }
        }

        let average_completion = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        // Speed is part of skill here: reward finishing under the reference
        // time, within fixed bounds.
        if let Some(avg) = average_completion {
            let multiplier = (REFERENCE_COMPLETION_SECS / avg).clamp(0.8, 1.2);
            rating *= multiplier;
        }

        PlayerRating {
            rating,
            games_played: history.len(),
            win_rate: wins as f64 / history.len() as f64,
            average_completion_seconds: average_completion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use crate::models::grid::Grid;
    use crate::models::match_record::{Difficulty, MatchRecord, MatchStatus, MatchType};
    use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

    struct FixedHistoryRepository {
        history: Vec<MatchRecord>,
        fail: bool,
    }

    #[async_trait]
    impl MatchRepository for FixedHistoryRepository {
        async fn create_match(&self, _record: &MatchRecord) -> Result<(), MatchRepositoryError> {
            Ok(())
        }

        async fn get_match(
            &self,
            _match_id: &str,
        ) -> Result<Option<MatchRecord>, MatchRepositoryError> {
            Ok(None)
        }

        async fn update_match_status(
            &self,
            _match_id: &str,
            _status: MatchStatus,
            _winner_id: Option<String>,
            _started_at: Option<DateTime<Utc>>,
            _ended_at: Option<DateTime<Utc>>,
        ) -> Result<(), MatchRepositoryError> {
            Ok(())
        }

        async fn find_finished_matches(
            &self,
            _player_id: &str,
            limit: usize,
        ) -> Result<Vec<MatchRecord>, MatchRepositoryError> {
            if self.fail {
                return Err(MatchRepositoryError::Storage("unreachable".to_string()));
            }
            Ok(self.history.iter().take(limit).cloned().collect())
        }

        async fn count_matches_since(
            &self,
            _since: DateTime<Utc>,
        ) -> Result<usize, MatchRepositoryError> {
            Ok(0)
        }
    }

    fn finished(winner: &str, duration_secs: i64) -> MatchRecord {
        let mut record = MatchRecord::new(
            "p1",
            Some("p2"),
            Grid::empty(),
            Grid::empty(),
            MatchType::Ranked,
            Difficulty::Medium,
        );
        record.status = MatchStatus::Finished;
        record.winner_id = Some(winner.to_string());
        record.started_at = Some(Utc::now() - Duration::seconds(duration_secs));
        record.ended_at = Some(Utc::now());
        record
    }

    fn service(history: Vec<MatchRecord>) -> RatingService {
        RatingService::new(Arc::new(FixedHistoryRepository {
            history,
            fail: false,
        }))
    }

    #[tokio::test]
    async fn zero_history_yields_the_default_rating() {
        let rating = service(vec![]).estimate("p1").await;
        assert_eq!(rating.rating, DEFAULT_RATING);
        assert_eq!(rating.games_played, 0);
    }

    #[tokio::test]
    async fn repository_failure_degrades_to_the_default_rating() {
        let svc = RatingService::new(Arc::new(FixedHistoryRepository {
            history: vec![],
            fail: true,
        }));
        let rating = svc.estimate("p1").await;
        assert_eq!(rating.rating, DEFAULT_RATING);
    }

    #[tokio::test]
    async fn wins_raise_and_losses_lower_the_rating() {
        // Durations at the 300s reference keep the speed multiplier at 1.
        let winner = service(vec![finished("p1", 300), finished("p1", 300)])
            .estimate("p1")
            .await;
        let loser = service(vec![finished("p2", 300), finished("p2", 300)])
            .estimate("p1")
            .await;

        assert!(winner.rating > DEFAULT_RATING);
        assert!(loser.rating < DEFAULT_RATING);
        assert_eq!(winner.win_rate, 1.0);
        assert_eq!(loser.win_rate, 0.0);
    }

    #[tokio::test]
    async fn first_win_moves_rating_by_half_the_k_factor() {
        // Even rating vs the baseline means expected = 0.5.
        let rating = service(vec![finished("p1", 300)]).estimate("p1").await;
        assert!((rating.rating - (DEFAULT_RATING + K_FACTOR * 0.5)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fast_completions_are_rewarded_within_bounds() {
        let fast = service(vec![finished("p1", 100)]).estimate("p1").await;
        let slow = service(vec![finished("p1", 1200)]).estimate("p1").await;
        let reference = service(vec![finished("p1", 300)]).estimate("p1").await;

        assert!(fast.rating > reference.rating);
        assert!(slow.rating < reference.rating);
        // Bounds: 300/100 clamps to 1.2, 300/1200 clamps to 0.8.
        assert!((fast.rating - reference.rating * 1.2).abs() < 1e-9);
        assert!((slow.rating - reference.rating * 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn average_completion_is_reported() {
        let rating = service(vec![finished("p1", 200), finished("p2", 400)])
            .estimate("p1")
            .await;
        assert_eq!(rating.games_played, 2);
        assert_eq!(rating.average_completion_seconds, Some(300.0));
        assert_eq!(rating.win_rate, 0.5);
    }
}
