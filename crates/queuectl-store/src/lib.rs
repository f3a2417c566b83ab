//! Durable JSON-file persistence for job records.

pub mod store;

pub use store::{JobStatistics, JobStore};
