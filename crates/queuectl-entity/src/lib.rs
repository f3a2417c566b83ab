//! Domain entities for queuectl.

pub mod job;

pub use job::{Job, JobState};
