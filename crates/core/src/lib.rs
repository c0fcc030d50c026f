//! `jobpipe-core`: job pipeline building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the job lifecycle record, the queue descriptor and request parsing.

pub mod descriptor;
pub mod error;
pub mod id;
pub mod job;
pub mod request;

pub use descriptor::{JobDescriptor, DESCRIPTOR_CONTENT_TYPE};
pub use error::ValidationError;
pub use id::JobId;
pub use job::{JobRecord, JobStatus};
pub use request::SubmitRequest;

/// Name of the single durable work queue shared by intake and workers.
pub const QUEUE_NAME: &str = "tasks_queue";
