pub mod match_repository_errors;
