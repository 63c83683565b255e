use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::match_record::{Difficulty, MatchRecord, MatchType};
use crate::models::queue::{MatchResult, OpponentPreference, QueueEntry, QueueStatus};
use crate::repositories::match_repository::MatchRepository;
use crate::services::errors::matchmaking_service_errors::MatchmakingServiceError;
use crate::services::rating_service::RatingService;
use crate::services::sudoku_service::PuzzleService;

/// Below this many concurrently-relevant users the engine pairs first-come
/// first-served; at or above it, skill matching kicks in.
const DEMAND_THRESHOLD: usize = 100;
/// Window over which created matches count as the recent-activity signal.
const RECENT_ACTIVITY_WINDOW_SECS: i64 = 300;
/// Starting allowed rating gap for skill matching.
const BASE_SKILL_WINDOW: f64 = 100.0;
/// The window widens by this much per ten seconds waited.
const WINDOW_GROWTH_PER_10_SECS: f64 = 10.0;
/// A player waiting beyond this matches any compatible opponent.
const HARD_WAIT_CEILING_SECS: u64 = 60;
/// Queue entries older than this are swept out.
const STALE_ENTRY_SECS: u64 = 120;
/// Score handicap for candidates on the wrong side of the requester's
/// preference. Biases, never eliminates.
const PREFERENCE_BIAS: f64 = 150.0;
/// Rough per-position wait estimate reported to polling clients.
const ESTIMATED_WAIT_PER_POSITION_MS: u64 = 5000;

/// The matchmaking queue: pairs an incoming player with a waiting one, or
/// leaves them queued. All pairing decisions happen under one queue lock;
/// puzzle generation and match creation happen after it is released.
pub struct MatchmakingService {
    queue: Mutex<Vec<QueueEntry>>,
    matches: Arc<dyn MatchRepository>,
    puzzles: Arc<dyn PuzzleService>,
    rating: RatingService,
}

impl MatchmakingService {
    pub fn new(matches: Arc<dyn MatchRepository>, puzzles: Arc<dyn PuzzleService>) -> Self {
        let rating = RatingService::new(matches.clone());
        MatchmakingService {
            queue: Mutex::new(Vec::new()),
            matches,
            puzzles,
            rating,
        }
    }

    /// Request a match. Returns either the id of a freshly created match or
    /// the caller's queue status.
    pub async fn enqueue(
        &self,
        player_id: &str,
        difficulty: Difficulty,
        match_type: MatchType,
        preference: OpponentPreference,
    ) -> Result<MatchResult, MatchmakingServiceError> {
        let rating = self.rating.estimate(player_id).await.rating;

        if match_type == MatchType::Solo {
            return self.create_solo_match(player_id, difficulty).await;
        }

        let demand = self.estimate_demand().await;
        let entry = QueueEntry::new(player_id, difficulty, match_type, rating, preference);

        let opponent = {
            let mut queue = self.queue.lock().await;
            // One entry per player: a re-enqueue replaces the old request.
            queue.retain(|e| e.player_id != player_id);

            match Self::find_opponent(&queue, &entry, demand) {
                Some(index) => queue.remove(index),
                None => {
                    let status = Self::queue_status_for(queue.len() + 1, &entry);
                    queue.push(entry);
                    return Ok(MatchResult::Queued { status });
                }
            }
        };

        // Both entries are out of the queue now. If anything below fails the
        // error propagates and neither entry is restored; callers retry.
        let average = (entry.rating + opponent.rating) / 2.0;
        let paired_difficulty = Self::paired_difficulty(average);
        let (puzzle, solution) = self.puzzles.generate(paired_difficulty).await?;

        let record = MatchRecord::new(
            &opponent.player_id,
            Some(player_id),
            puzzle,
            solution,
            match_type,
            paired_difficulty,
        );
        self.matches.create_match(&record).await?;

        info!(
            match_id = %record.match_id,
            player1 = %opponent.player_id,
            player2 = %player_id,
            demand,
            ?paired_difficulty,
            "Paired players into match"
        );

        Ok(MatchResult::Matched {
            match_id: record.match_id,
        })
    }

    /// Queue position report for UI polling; `None` when the player is not
    /// queued.
    pub async fn status(&self, player_id: &str) -> Option<QueueStatus> {
        let queue = self.queue.lock().await;
        queue
            .iter()
            .position(|e| e.player_id == player_id)
            .map(|index| Self::queue_status_for(index + 1, &queue[index]))
    }

    /// Withdraw a queued request. Returns false when the player was not
    /// queued (already paired or never enqueued).
    pub async fn cancel(&self, player_id: &str) -> bool {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|e| e.player_id != player_id);
        before != queue.len()
    }

    /// Drop entries that have waited past the hard timeout. Returns how many
    /// were removed.
    pub async fn expire_stale(&self) -> usize {
        let mut queue = self.queue.lock().await;
        let before = queue.len();
        queue.retain(|e| e.waited_secs() < STALE_ENTRY_SECS);
        let removed = before - queue.len();
        if removed > 0 {
            info!(removed, "Expired stale queue entries");
        }
        removed
    }

    /// Periodic stale-entry sweep. The task stops on its own once the
    /// service is dropped.
    pub fn start_cleanup_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                service.expire_stale().await;
            }
        })
    }

    pub async fn queue_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Concurrent-demand estimate: queue length plus two recently-active
    /// players per recently-created match.
    async fn estimate_demand(&self) -> usize {
        let queued = self.queue.lock().await.len();
        let since = Utc::now() - chrono::Duration::seconds(RECENT_ACTIVITY_WINDOW_SECS);
        let recent = match self.matches.count_matches_since(since).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "Recent-match count unavailable, assuming none");
                0
            }
        };
        queued + recent * 2
    }

    /// Pick an opponent index for `entry`, or None to leave it queued.
    fn find_opponent(queue: &[QueueEntry], entry: &QueueEntry, demand: usize) -> Option<usize> {
        if demand < DEMAND_THRESHOLD {
            Self::select_fcfs(queue, entry)
        } else {
            Self::select_by_skill(queue, entry)
        }
    }

    /// Thin queues: first compatible entry in arrival order, skill ignored,
    /// so nobody starves waiting for a good match that may never arrive.
    fn select_fcfs(queue: &[QueueEntry], entry: &QueueEntry) -> Option<usize> {
        queue.iter().position(|e| e.compatible_with(entry))
    }

    /// Busy queues: closest-rated compatible candidate whose wait-widened
    /// window admits the gap. Ties go to the earliest enqueue; the
    /// requester's preference biases the comparison without eliminating
    /// anyone.
    fn select_by_skill(queue: &[QueueEntry], entry: &QueueEntry) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (index, candidate) in queue.iter().enumerate() {
            if !candidate.compatible_with(entry) {
                continue;
            }

            let gap = (candidate.rating - entry.rating).abs();
            let waited = candidate.waited_secs();
            if waited <= HARD_WAIT_CEILING_SECS && gap > Self::skill_window(waited) {
                continue;
            }

            let score = gap + Self::preference_bias(entry, candidate);
            let better = match best {
                None => true,
                // Strict less-than keeps the earliest-enqueued on a tie:
                // the queue is in arrival order.
                Some((_, best_score)) => score < best_score,
            };
            if better {
                best = Some((index, score));
            }
        }

        best.map(|(index, _)| index)
    }

    fn preference_bias(entry: &QueueEntry, candidate: &QueueEntry) -> f64 {
        let wrong_side = match entry.preference {
            OpponentPreference::Higher => candidate.rating <= entry.rating,
            OpponentPreference::Lower => candidate.rating >= entry.rating,
            OpponentPreference::Similar | OpponentPreference::Any => false,
        };
        if wrong_side {
            PREFERENCE_BIAS
        } else {
            0.0
        }
    }

    /// Allowed rating gap after waiting the given time. Non-decreasing.
    pub fn skill_window(waited_secs: u64) -> f64 {
        BASE_SKILL_WINDOW + (waited_secs / 10) as f64 * WINDOW_GROWTH_PER_10_SECS
    }

    /// Lower average skill gets an easier puzzle, whatever was requested.
    fn paired_difficulty(average_rating: f64) -> Difficulty {
        if average_rating < 900.0 {
            Difficulty::Easy
        } else if average_rating < 1300.0 {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }

    fn queue_status_for(position: usize, entry: &QueueEntry) -> QueueStatus {
        let waited = entry.waited_secs();
        QueueStatus {
            position,
            wait_time_ms: entry.enqueued.elapsed().as_millis() as u64,
            current_skill_window: Self::skill_window(waited),
            estimated_wait_ms: position as u64 * ESTIMATED_WAIT_PER_POSITION_MS,
        }
    }

    /// Single-player race: no pairing, the match is created immediately at
    /// the requested difficulty.
    async fn create_solo_match(
        &self,
        player_id: &str,
        difficulty: Difficulty,
    ) -> Result<MatchResult, MatchmakingServiceError> {
        let (puzzle, solution) = self.puzzles.generate(difficulty).await?;
        let record = MatchRecord::new(
            player_id,
            None,
            puzzle,
            solution,
            MatchType::Solo,
            difficulty,
        );
        self.matches.create_match(&record).await?;

        info!(match_id = %record.match_id, player = %player_id, "Created solo match");
        Ok(MatchResult::Matched {
            match_id: record.match_id,
        })
    }
}
