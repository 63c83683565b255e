pub mod errors;
pub mod match_repository;
pub mod transport_repository;
