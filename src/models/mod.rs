pub mod events;
pub mod grid;
pub mod match_record;
pub mod queue;
pub mod rating;
pub mod room;
