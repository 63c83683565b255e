use crate::repositories::errors::match_repository_errors::MatchRepositoryError;

#[derive(Debug)]
pub enum RoomServiceError {
    MatchNotFound,
    RoomNotFound,
    NotAParticipant,
    RoomFull,
    /// The room is not accepting play: it has not started, or it already
    /// reached a terminal status. Distinct from an invalid move.
    NotInProgress,
    ValidationError(String),
    RepositoryError(MatchRepositoryError),
}

impl std::fmt::Display for RoomServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomServiceError::MatchNotFound => write!(f, "Match not found"),
            RoomServiceError::RoomNotFound => write!(f, "Room not found"),
            RoomServiceError::NotAParticipant => {
                write!(f, "Player is not a participant of this match")
            }
            RoomServiceError::RoomFull => write!(f, "Room already has two players"),
            RoomServiceError::NotInProgress => write!(f, "Room is not in progress"),
            RoomServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            RoomServiceError::RepositoryError(err) => write!(f, "Repository error: {}", err),
        }
    }
}

impl std::error::Error for RoomServiceError {}

impl From<MatchRepositoryError> for RoomServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        RoomServiceError::RepositoryError(err)
    }
}
