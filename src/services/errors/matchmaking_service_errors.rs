use crate::repositories::errors::match_repository_errors::MatchRepositoryError;
use crate::services::errors::puzzle_service_errors::PuzzleServiceError;

#[derive(Debug)]
pub enum MatchmakingServiceError {
    RepositoryError(MatchRepositoryError),
    PuzzleError(PuzzleServiceError),
}

impl std::fmt::Display for MatchmakingServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingServiceError::RepositoryError(err) => {
                write!(f, "Repository error: {}", err)
            }
            MatchmakingServiceError::PuzzleError(err) => write!(f, "Puzzle error: {}", err),
        }
    }
}

impl std::error::Error for MatchmakingServiceError {}

impl From<MatchRepositoryError> for MatchmakingServiceError {
    fn from(err: MatchRepositoryError) -> Self {
        MatchmakingServiceError::RepositoryError(err)
    }
}

impl From<PuzzleServiceError> for MatchmakingServiceError {
    fn from(err: PuzzleServiceError) -> Self {
        MatchmakingServiceError::PuzzleError(err)
    }
}
