use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::models::events::RoomEvent;
use crate::models::grid::Grid;
use crate::models::match_record::{MatchRecord, MatchStatus};
use crate::models::room::{
    GameSettings, MoveRecord, PlayerState, RoomPlayer, RoomSnapshot, RoomStatus,
};
use crate::repositories::match_repository::MatchRepository;
use crate::repositories::transport_repository::TransportRepository;
use crate::services::errors::room_service_errors::RoomServiceError;
use crate::services::sudoku_service::PuzzleService;

/// Score for any valid placement.
const BASE_CELL_SCORE: i64 = 10;
/// Time bonus kicks in above this much remaining time.
const EARLY_BONUS_THRESHOLD_SECS: u32 = 60;
/// Immediate score cost of taking a hint.
const HINT_PENALTY: i64 = 25;
/// Settlement cost per hint taken, applied to the solver's final score.
const SETTLEMENT_HINT_PENALTY: i64 = 50;
/// Settlement cost per move beyond the 81 a perfect solve needs.
const EXTRA_MOVE_PENALTY: i64 = 5;
const PERFECT_SOLVE_MOVES: u32 = 81;
/// How long a disconnected player has to come back mid-game.
const DISCONNECT_GRACE_SECS: u64 = 30;
/// Client-side countdown relayed in the game-started event.
const START_COUNTDOWN_SECS: u32 = 3;
/// Coarse cadence for time-update events.
const TIME_UPDATE_EVERY_SECS: u32 = 15;

/// Result of a move submission. An invalid move is a normal outcome, not an
/// error; `completed` marks the move that won the match.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    pub completed: bool,
}

/// A revealed cell. `None` from `use_hint` means the budget is spent or the
/// grid has no empty cell left.
#[derive(Debug, Clone)]
pub struct Hint {
    pub row: usize,
    pub col: usize,
    pub value: u8,
    pub hints_remaining: u32,
}

/// Which terminal event a resolution broadcasts.
enum TerminalEvent {
    Completed,
    TimeUp,
}

/// What must reach the persistence collaborator after a terminal transition.
/// Carries the room timer handle out of the lock: it is aborted only after
/// the settlement write, because the time-up path runs on that very task and
/// must not cancel itself mid-write.
struct Settlement {
    status: MatchStatus,
    winner_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    timer: Option<JoinHandle<()>>,
}

/// One live match. All mutable state sits behind a single per-room lock;
/// rooms never block each other. Events are published while the lock is held
/// (the transport is non-blocking) so subscribers see them in application
/// order. Calls to the persistence collaborator always happen after the lock
/// is released.
pub struct GameRoom {
    pub room_id: String,
    pub match_id: String,
    inner: Mutex<RoomInner>,
    matches: Arc<dyn MatchRepository>,
    transport: Arc<dyn TransportRepository>,
    puzzles: Arc<dyn PuzzleService>,
}

impl std::fmt::Debug for GameRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameRoom")
            .field("room_id", &self.room_id)
            .field("match_id", &self.match_id)
            .finish_non_exhaustive()
    }
}

struct RoomInner {
    status: RoomStatus,
    allowed_players: Vec<String>,
    required_players: usize,
    players: Vec<RoomPlayer>,
    puzzle: Grid,
    solution: Grid,
    settings: GameSettings,
    moves: Vec<MoveRecord>,
    time_remaining: u32,
    winner_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    /// Monotonic companions to the wall-clock timestamps, for sweep math.
    last_activity: Instant,
    ended_mono: Option<Instant>,
    /// False until the terminal outcome reached the persistence layer.
    settled: bool,
    timer: Option<JoinHandle<()>>,
    grace_timers: HashMap<String, JoinHandle<()>>,
}

impl GameRoom {
    /// Build a room for a loaded match record. The puzzle/solution pair is
    /// fixed here for the room's lifetime.
    pub fn from_match(
        room_id: String,
        record: &MatchRecord,
        settings: GameSettings,
        matches: Arc<dyn MatchRepository>,
        transport: Arc<dyn TransportRepository>,
        puzzles: Arc<dyn PuzzleService>,
    ) -> Arc<Self> {
        let mut allowed = vec![record.player1_id.clone()];
        if let Some(p2) = &record.player2_id {
            allowed.push(p2.clone());
        }

        Arc::new(GameRoom {
            room_id,
            match_id: record.match_id.clone(),
            inner: Mutex::new(RoomInner {
                status: RoomStatus::Waiting,
                required_players: record.required_players(),
                allowed_players: allowed,
                players: Vec::new(),
                puzzle: record.puzzle,
                solution: record.solution,
                settings,
                moves: Vec::new(),
                time_remaining: settings.time_limit_seconds,
                winner_id: None,
                started_at: None,
                ended_at: None,
                last_activity: Instant::now(),
                ended_mono: None,
                settled: false,
                timer: None,
                grace_timers: HashMap::new(),
            }),
            matches,
            transport,
            puzzles,
        })
    }

    /// Join as a new player, or reattach an existing player's connection.
    pub async fn join(
        self: &Arc<Self>,
        player_id: &str,
        connection_id: &str,
    ) -> Result<RoomSnapshot, RoomServiceError> {
        let mut inner = self.inner.lock().await;
        inner.last_activity = Instant::now();

        if !inner.allowed_players.iter().any(|p| p == player_id) {
            return Err(RoomServiceError::NotAParticipant);
        }

        if let Some(index) = inner.players.iter().position(|p| p.player_id == player_id) {
            // Reconnection: reattach and stop any pending forfeit.
            inner.players[index].is_connected = true;
            inner.players[index].connection_id = connection_id.to_string();
            if let Some(grace) = inner.grace_timers.remove(player_id) {
                grace.abort();
            }
            info!(room_id = %self.room_id, player_id, "Player reconnected");
        } else {
            if inner.status != RoomStatus::Waiting {
                return Err(RoomServiceError::NotInProgress);
            }
            if inner.players.len() >= 2 {
                return Err(RoomServiceError::RoomFull);
            }
            let puzzle = inner.puzzle;
            inner
                .players
                .push(RoomPlayer::new(player_id, connection_id, puzzle));
            info!(room_id = %self.room_id, player_id, "Player joined room");
        }

        self.transport.publish(
            &self.room_id,
            &RoomEvent::PlayerJoined {
                player_id: player_id.to_string(),
                players_count: inner.players.len(),
            },
        );
        Ok(self.snapshot_locked(&inner))
    }

    /// Flip a player's ready flag. Once every required player is present and
    /// ready the room starts: Waiting → Starting → InProgress, timer running.
    pub async fn set_ready(
        self: &Arc<Self>,
        player_id: &str,
        ready: bool,
    ) -> Result<(), RoomServiceError> {
        let started = {
            let mut inner = self.inner.lock().await;
            inner.last_activity = Instant::now();

            if inner.status != RoomStatus::Waiting {
                return Err(RoomServiceError::ValidationError(
                    "Room already started".to_string(),
                ));
            }
            let index = inner
                .players
                .iter()
                .position(|p| p.player_id == player_id)
                .ok_or(RoomServiceError::NotAParticipant)?;
            inner.players[index].is_ready = ready;

            let all_ready = inner.players.len() == inner.required_players
                && inner.players.iter().all(|p| p.is_ready);
            self.transport.publish(
                &self.room_id,
                &RoomEvent::PlayerReadyChanged {
                    player_id: player_id.to_string(),
                    is_ready: ready,
                    all_ready,
                },
            );

            if all_ready {
                inner.status = RoomStatus::Starting;
                inner.started_at = Some(Utc::now());
                inner.time_remaining = inner.settings.time_limit_seconds;
                inner.status = RoomStatus::InProgress;
                inner.timer = Some(self.spawn_timer());

                let snapshot = self.snapshot_locked(&inner);
                self.transport.publish(
                    &self.room_id,
                    &RoomEvent::GameStarted {
                        room: snapshot,
                        countdown_seconds: START_COUNTDOWN_SECS,
                    },
                );
                info!(room_id = %self.room_id, "Game started");
                inner.started_at
            } else {
                None
            }
        };

        // The room is already playing; a failed status write must not stop it.
        if let Some(started_at) = started {
            if let Err(err) = self
                .matches
                .update_match_status(
                    &self.match_id,
                    MatchStatus::InProgress,
                    None,
                    Some(started_at),
                    None,
                )
                .await
            {
                warn!(room_id = %self.room_id, error = %err, "Failed to mark match in progress");
            }
        }
        Ok(())
    }

    /// Submit a move. Valid moves mutate only the mover's progress grid;
    /// invalid ones are logged and broadcast with `is_valid = false`. The
    /// move that fills and validates the whole grid wins the match.
    pub async fn make_move(
        self: &Arc<Self>,
        player_id: &str,
        row: usize,
        col: usize,
        value: u8,
    ) -> Result<MoveOutcome, RoomServiceError> {
        if row > 8 || col > 8 {
            return Err(RoomServiceError::ValidationError(
                "Cell out of range".to_string(),
            ));
        }
        if value > 9 {
            return Err(RoomServiceError::ValidationError(
                "Value out of range".to_string(),
            ));
        }

        let (outcome, settlement) = {
            let mut inner = self.inner.lock().await;
            inner.last_activity = Instant::now();

            if inner.status != RoomStatus::InProgress {
                return Err(RoomServiceError::NotInProgress);
            }
            let index = inner
                .players
                .iter()
                .position(|p| p.player_id == player_id)
                .ok_or(RoomServiceError::NotAParticipant)?;

            // Givens are untouchable; clearing an own cell is always fine;
            // placements must respect row/column/box uniqueness on the
            // mover's own grid.
            let is_valid = if inner.puzzle.get(row, col) != 0 {
                false
            } else if value == 0 {
                true
            } else {
                self.puzzles
                    .is_valid_placement(&inner.players[index].progress, row, col, value)
            };

            let record = MoveRecord {
                player_id: player_id.to_string(),
                row,
                col,
                value,
                timestamp: Utc::now(),
                is_valid,
            };
            inner.moves.push(record.clone());

            if is_valid {
                let time_remaining = inner.time_remaining;
                let player = &mut inner.players[index];
                player.progress.set(row, col, value);
                player.move_count += 1;
                player.last_move_at = Some(record.timestamp);
                if value != 0 {
                    player.score += BASE_CELL_SCORE
                        + (time_remaining.saturating_sub(EARLY_BONUS_THRESHOLD_SECS) / 10) as i64;
                }
            }

            self.transport.publish(
                &self.room_id,
                &RoomEvent::MoveMade {
                    mv: record.clone(),
                    progress: inner.players[index].progress,
                    player: PlayerState::from(&inner.players[index]),
                },
            );

            let completed = is_valid
                && value != 0
                && inner.players[index].progress.is_filled()
                && self.puzzles.is_complete(&inner.players[index].progress);

            let settlement = if completed {
                let time_remaining = inner.time_remaining;
                let player = &mut inner.players[index];
                player.score += time_remaining as i64;
                player.score -= EXTRA_MOVE_PENALTY
                    * player.move_count.saturating_sub(PERFECT_SOLVE_MOVES) as i64;
                player.score -= SETTLEMENT_HINT_PENALTY * player.hints_used as i64;

                let winner = player.player_id.clone();
                Some(self.complete_locked(
                    &mut inner,
                    Some(winner),
                    MatchStatus::Finished,
                    TerminalEvent::Completed,
                ))
            } else {
                None
            };

            (MoveOutcome { record, completed }, settlement)
        };

        if let Some(settlement) = settlement {
            self.persist_settlement(settlement).await;
        }
        Ok(outcome)
    }

    /// Reveal one empty cell of the caller's grid from the solution, at a
    /// score cost. `None` once the hint budget is spent or nothing is empty.
    pub async fn use_hint(self: &Arc<Self>, player_id: &str) -> Result<Option<Hint>, RoomServiceError> {
        let (hint, settlement) = {
            let mut inner = self.inner.lock().await;
            inner.last_activity = Instant::now();

            if inner.status != RoomStatus::InProgress {
                return Err(RoomServiceError::NotInProgress);
            }
            let index = inner
                .players
                .iter()
                .position(|p| p.player_id == player_id)
                .ok_or(RoomServiceError::NotAParticipant)?;

            let hints_allowed = inner.settings.hints_allowed;
            if inner.players[index].hints_used >= hints_allowed {
                return Ok(None);
            }
            let Some(&(row, col)) = inner.players[index].progress.empty_cells().first() else {
                return Ok(None);
            };

            let value = inner.solution.get(row, col);
            let player = &mut inner.players[index];
            player.progress.set(row, col, value);
            player.hints_used += 1;
            player.score -= HINT_PENALTY;
            let hints_remaining = hints_allowed - player.hints_used;

            self.transport.publish(
                &self.room_id,
                &RoomEvent::HintUsed {
                    player_id: player_id.to_string(),
                    hints_remaining,
                    row,
                    col,
                    value,
                },
            );

            // A hint can fill the last hole; the solve still counts.
            let settlement = if inner.players[index].progress.is_filled()
                && self.puzzles.is_complete(&inner.players[index].progress)
            {
                let winner = inner.players[index].player_id.clone();
                Some(self.complete_locked(
                    &mut inner,
                    Some(winner),
                    MatchStatus::Finished,
                    TerminalEvent::Completed,
                ))
            } else {
                None
            };

            (
                Hint {
                    row,
                    col,
                    value,
                    hints_remaining,
                },
                settlement,
            )
        };

        if let Some(settlement) = settlement {
            self.persist_settlement(settlement).await;
        }
        Ok(Some(hint))
    }

    /// Mark a player disconnected. Mid-game this arms the forfeit grace
    /// timer; rejoining within the window disarms it.
    pub async fn leave(self: &Arc<Self>, player_id: &str) -> Result<(), RoomServiceError> {
        let mut inner = self.inner.lock().await;
        inner.last_activity = Instant::now();

        let index = inner
            .players
            .iter()
            .position(|p| p.player_id == player_id)
            .ok_or(RoomServiceError::NotAParticipant)?;

        inner.players[index].is_connected = false;
        if inner.status == RoomStatus::Waiting {
            inner.players[index].is_ready = false;
        }

        let snapshot = self.snapshot_locked(&inner);
        self.transport.publish(
            &self.room_id,
            &RoomEvent::PlayerLeft {
                player_id: player_id.to_string(),
                room: snapshot,
            },
        );
        info!(room_id = %self.room_id, player_id, "Player left");

        if inner.status == RoomStatus::InProgress {
            if let Some(previous) = inner
                .grace_timers
                .insert(player_id.to_string(), self.spawn_grace_timer(player_id))
            {
                previous.abort();
            }
        }
        Ok(())
    }

    /// Current public view of the room.
    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.lock().await;
        self.snapshot_locked(&inner)
    }

    pub async fn status(&self) -> RoomStatus {
        self.inner.lock().await.status
    }

    /// The append-only move audit log, both players interleaved.
    pub async fn moves(&self) -> Vec<MoveRecord> {
        self.inner.lock().await.moves.clone()
    }

    /// Re-attempt a settlement write that failed at transition time. No-op
    /// for non-terminal or already-settled rooms.
    pub async fn retry_settlement(&self) {
        let pending = {
            let inner = self.inner.lock().await;
            if !inner.status.is_terminal() || inner.settled {
                None
            } else {
                Some(Settlement {
                    status: match inner.status {
                        RoomStatus::Cancelled => MatchStatus::Cancelled,
                        _ => MatchStatus::Finished,
                    },
                    winner_id: inner.winner_id.clone(),
                    started_at: inner.started_at,
                    ended_at: inner.ended_at,
                    timer: None,
                })
            }
        };
        if let Some(settlement) = pending {
            self.persist_settlement(settlement).await;
        }
    }

    /// Cancel a room that never reached a natural ending (idle sweep).
    pub async fn cancel_abandoned(self: &Arc<Self>) {
        let settlement = {
            let mut inner = self.inner.lock().await;
            if inner.status.is_terminal() {
                None
            } else {
                Some(self.complete_locked(
                    &mut inner,
                    None,
                    MatchStatus::Cancelled,
                    TerminalEvent::Completed,
                ))
            }
        };
        if let Some(settlement) = settlement {
            self.persist_settlement(settlement).await;
        }
    }

    /// Stop every task the room owns. Called on eviction.
    pub(crate) async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        for (_, grace) in inner.grace_timers.drain() {
            grace.abort();
        }
    }

    pub(crate) async fn terminal_for(&self) -> Option<Duration> {
        let inner = self.inner.lock().await;
        inner.ended_mono.map(|ended| ended.elapsed())
    }

    pub(crate) async fn idle_for(&self) -> Duration {
        self.inner.lock().await.last_activity.elapsed()
    }

    fn snapshot_locked(&self, inner: &RoomInner) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            match_id: self.match_id.clone(),
            status: inner.status,
            time_remaining: inner.time_remaining,
            players: inner.players.iter().map(PlayerState::from).collect(),
            winner_id: inner.winner_id.clone(),
            started_at: inner.started_at,
            ended_at: inner.ended_at,
        }
    }

    /// Terminal transition. Sets the final status, stops every timer, and
    /// broadcasts the closing event. Runs exactly once: every caller checks
    /// the status under the same lock first.
    fn complete_locked(
        &self,
        inner: &mut RoomInner,
        winner_id: Option<String>,
        match_status: MatchStatus,
        event: TerminalEvent,
    ) -> Settlement {
        inner.status = if match_status == MatchStatus::Cancelled {
            RoomStatus::Cancelled
        } else {
            RoomStatus::Completed
        };
        inner.winner_id = winner_id.clone();
        inner.ended_at = Some(Utc::now());
        inner.ended_mono = Some(Instant::now());

        let timer = inner.timer.take();
        for (_, grace) in inner.grace_timers.drain() {
            grace.abort();
        }

        let snapshot = self.snapshot_locked(inner);
        let closing = match event {
            TerminalEvent::Completed => RoomEvent::GameCompleted {
                winner_id: winner_id.clone(),
                room: snapshot,
            },
            TerminalEvent::TimeUp => RoomEvent::TimeUp {
                winner_id: winner_id.clone(),
                room: snapshot,
            },
        };
        self.transport.publish(&self.room_id, &closing);
        info!(
            room_id = %self.room_id,
            status = ?inner.status,
            winner = winner_id.as_deref().unwrap_or("none"),
            "Room reached terminal state"
        );

        Settlement {
            status: match_status,
            winner_id,
            started_at: inner.started_at,
            ended_at: inner.ended_at,
            timer,
        }
    }

    /// Write the terminal outcome. On failure the room stays terminal
    /// locally and the registry sweep retries later.
    async fn persist_settlement(&self, settlement: Settlement) {
        let result = self
            .matches
            .update_match_status(
                &self.match_id,
                settlement.status,
                settlement.winner_id.clone(),
                settlement.started_at,
                settlement.ended_at,
            )
            .await;

        match result {
            Ok(()) => {
                self.inner.lock().await.settled = true;
            }
            Err(err) => {
                warn!(
                    room_id = %self.room_id,
                    error = %err,
                    "Match settlement deferred; sweep will retry"
                );
            }
        }

        // Safe to cancel now; when time-up resolved on the timer task itself
        // this lands after the write and the task is about to exit anyway.
        if let Some(timer) = settlement.timer {
            timer.abort();
        }
    }

    fn spawn_timer(self: &Arc<Self>) -> JoinHandle<()> {
        let room: Weak<GameRoom> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first tick completes immediately; skip it.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(room) = room.upgrade() else {
                    break;
                };
                if !room.timer_tick().await {
                    break;
                }
            }
        })
    }

    /// One second elapsed. Returns false once the room no longer needs the
    /// timer; ticks on a terminal room do nothing.
    async fn timer_tick(self: &Arc<Self>) -> bool {
        let settlement = {
            let mut inner = self.inner.lock().await;
            if inner.status.is_terminal() {
                return false;
            }
            if inner.status != RoomStatus::InProgress {
                return true;
            }

            inner.time_remaining = inner.time_remaining.saturating_sub(1);
            if inner.time_remaining == 0 {
                let winner = inner
                    .players
                    .iter()
                    .max_by_key(|p| {
                        (
                            p.score,
                            p.progress.filled_count(),
                            std::cmp::Reverse(p.hints_used),
                        )
                    })
                    .map(|p| p.player_id.clone());
                Some(self.complete_locked(
                    &mut inner,
                    winner,
                    MatchStatus::Finished,
                    TerminalEvent::TimeUp,
                ))
            } else {
                if inner.time_remaining % TIME_UPDATE_EVERY_SECS == 0 {
                    self.transport.publish(
                        &self.room_id,
                        &RoomEvent::TimeUpdate {
                            time_remaining: inner.time_remaining,
                        },
                    );
                }
                None
            }
        };

        match settlement {
            Some(settlement) => {
                self.persist_settlement(settlement).await;
                false
            }
            None => true,
        }
    }

    fn spawn_grace_timer(self: &Arc<Self>, player_id: &str) -> JoinHandle<()> {
        let room: Weak<GameRoom> = Arc::downgrade(self);
        let player_id = player_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(DISCONNECT_GRACE_SECS)).await;
            if let Some(room) = room.upgrade() {
                room.resolve_forfeit(&player_id).await;
            }
        })
    }

    /// Grace expired. If the player is still gone, the last connected player
    /// wins by forfeiture; with nobody left the room is cancelled.
    async fn resolve_forfeit(self: &Arc<Self>, player_id: &str) {
        let settlement = {
            let mut inner = self.inner.lock().await;
            inner.grace_timers.remove(player_id);

            if inner.status != RoomStatus::InProgress {
                None
            } else if inner
                .players
                .iter()
                .any(|p| p.player_id == player_id && p.is_connected)
            {
                // Came back before the deadline.
                None
            } else {
                let survivor = inner
                    .players
                    .iter()
                    .find(|p| p.is_connected && p.player_id != player_id)
                    .map(|p| p.player_id.clone());

                match survivor {
                    Some(winner) => {
                        info!(
                            room_id = %self.room_id,
                            forfeiter = player_id,
                            winner = %winner,
                            "Forfeit: disconnect grace expired"
                        );
                        Some(self.complete_locked(
                            &mut inner,
                            Some(winner),
                            MatchStatus::Finished,
                            TerminalEvent::Completed,
                        ))
                    }
                    None => {
                        info!(room_id = %self.room_id, "All players gone, cancelling room");
                        Some(self.complete_locked(
                            &mut inner,
                            None,
                            MatchStatus::Cancelled,
                            TerminalEvent::Completed,
                        ))
                    }
                }
            }
        };

        if let Some(settlement) = settlement {
            self.persist_settlement(settlement).await;
        }
    }
}
