//! Job entity: model and state.

pub mod model;
pub mod state;

pub use self::model::Job;
pub use self::state::JobState;
