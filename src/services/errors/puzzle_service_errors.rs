#[derive(Debug)]
pub enum PuzzleServiceError {
    Generation(String),
}

impl std::fmt::Display for PuzzleServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PuzzleServiceError::Generation(msg) => write!(f, "Puzzle generation error: {}", msg),
        }
    }
}

impl std::error::Error for PuzzleServiceError {}
