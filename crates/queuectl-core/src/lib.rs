//! Core types shared by every queuectl crate: the unified error type,
//! configuration schema and manager, and domain identifiers.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use config::{ConfigManager, QueueConfig};
pub use error::{AppError, ErrorKind};
pub use result::AppResult;
pub use types::JobId;
