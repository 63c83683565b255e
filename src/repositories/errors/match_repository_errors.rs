#[derive(Debug)]
pub enum MatchRepositoryError {
    NotFound,
    AlreadyExists,
    Serialization(String),
    Storage(String),
}

impl std::fmt::Display for MatchRepositoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRepositoryError::NotFound => write!(f, "Match not found"),
            MatchRepositoryError::AlreadyExists => write!(f, "Match already exists"),
            MatchRepositoryError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            MatchRepositoryError::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for MatchRepositoryError {}
