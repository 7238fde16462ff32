pub mod archive;
pub mod config;
pub mod job;
pub mod result_error;
pub mod retention;
pub mod schedule;
pub mod snapshot;
