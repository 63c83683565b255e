pub mod errors;
pub mod matchmaking_service;
pub mod rating_service;
pub mod room_registry;
pub mod room_service;
pub mod sudoku_service;
