pub mod matchmaking_service_errors;
pub mod puzzle_service_errors;
pub mod room_service_errors;
