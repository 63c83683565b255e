//! Gridlock pairs players for real-time Sudoku duels and drives each duel
//! through a timed, stateful room until it settles.
//!
//! The crate covers two subsystems: the matchmaking engine (skill-based
//! pairing that degrades to first-come-first-served under low load) and the
//! match-room state machine (readiness, synchronized start, move validation,
//! scoring, hints, disconnect grace, timeout resolution, exactly-once
//! settlement). Persistence, transport and puzzle generation are collaborator
//! traits with in-process reference implementations.

pub mod models;
pub mod repositories;
pub mod services;

pub use models::match_record::{Difficulty, MatchStatus, MatchType};
pub use models::queue::{MatchResult, OpponentPreference, QueueStatus};
pub use models::room::{GameSettings, RoomStatus};
pub use repositories::match_repository::{InMemoryMatchRepository, MatchRepository};
pub use repositories::transport_repository::{BroadcastTransport, TransportRepository};
pub use services::matchmaking_service::MatchmakingService;
pub use services::rating_service::RatingService;
pub use services::room_registry::RoomRegistry;
pub use services::room_service::GameRoom;
pub use services::sudoku_service::{PuzzleService, SudokuService};
