//! Upload a local audio file to the processing service and track its job.

/// Config model and persistence.
pub mod config;
/// Upload/poll state machine.
pub mod coordinator;
/// Transport and job failure types.
pub mod error;
/// Job and file model.
pub mod jobs;
/// Status polling loop.
pub mod poller;
/// HTTP transport.
pub mod transport;

#[cfg(test)]
mod testing;

pub use coordinator::UploadCoordinator;
pub use jobs::{AudioFile, JobSnapshot, JobStatus};
