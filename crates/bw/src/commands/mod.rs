pub mod events;
pub mod git;
pub mod replay;
