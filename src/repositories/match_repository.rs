use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

/// Persistence seam for match records. The engine only ever goes through this
/// trait; storage backends live on the other side of it.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), MatchRepositoryError>;

    async fn get_match(&self, match_id: &str)
        -> Result<Option<MatchRecord>, MatchRepositoryError>;

    async fn update_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        winner_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), MatchRepositoryError>;

    /// Most recent finished matches involving the player, newest first,
    /// capped at `limit`. Feeds the rating walk.
    async fn find_finished_matches(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, MatchRepositoryError>;

    /// Matches created since `since`. Used as the recent-activity signal in
    /// demand estimation.
    async fn count_matches_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<usize, MatchRepositoryError>;
}

/// Map-backed reference implementation, for single-process deployments and
/// the test suite.
#[derive(Default)]
pub struct InMemoryMatchRepository {
    matches: RwLock<HashMap<String, MatchRecord>>,
}

impl InMemoryMatchRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchRepository for InMemoryMatchRepository {
    async fn create_match(&self, record: &MatchRecord) -> Result<(), MatchRepositoryError> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&record.match_id) {
            return Err(MatchRepositoryError::AlreadyExists);
        }
        matches.insert(record.match_id.clone(), record.clone());
        Ok(())
    }

    async fn get_match(
        &self,
        match_id: &str,
    ) -> Result<Option<MatchRecord>, MatchRepositoryError> {
        Ok(self.matches.read().await.get(match_id).cloned())
    }

    async fn update_match_status(
        &self,
        match_id: &str,
        status: MatchStatus,
        winner_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), MatchRepositoryError> {
        let mut matches = self.matches.write().await;
        let record = matches
            .get_mut(match_id)
            .ok_or(MatchRepositoryError::NotFound)?;

        record.status = status;
        if winner_id.is_some() {
            record.winner_id = winner_id;
        }
        if started_at.is_some() {
            record.started_at = started_at;
        }
        if ended_at.is_some() {
            record.ended_at = ended_at;
        }
        Ok(())
    }

    async fn find_finished_matches(
        &self,
        player_id: &str,
        limit: usize,
    ) -> Result<Vec<MatchRecord>, MatchRepositoryError> {
        let matches = self.matches.read().await;
        let mut finished: Vec<MatchRecord> = matches
            .values()
            .filter(|m| m.status == MatchStatus::Finished && m.involves(player_id))
            .cloned()
            .collect();

        finished.sort_by_key(|m| std::cmp::Reverse(m.ended_at.unwrap_or(m.created_at)));
        finished.truncate(limit);
        Ok(finished)
    }

    async fn count_matches_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<usize, MatchRepositoryError> {
        let matches = self.matches.read().await;
        Ok(matches.values().filter(|m| m.created_at >= since).count())
    }
}
