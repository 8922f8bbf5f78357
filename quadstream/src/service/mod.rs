//! Streaming service facade.
//!
//! [`StreamingService`] validates a [`PipelineConfig`](crate::config::PipelineConfig),
//! spawns the fetch and scheduler daemons and returns a [`ServiceHandle`].

mod error;
mod streaming;

pub use error::ServiceError;
pub use streaming::{ServiceHandle, StreamingService};
