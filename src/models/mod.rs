pub mod audio;
pub mod job;
pub mod separation;
