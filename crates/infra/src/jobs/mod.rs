//! Job persistence and execution.
//!
//! ## Components
//!
//! - `JobStore`: durable job rows (in-memory or Postgres)
//! - `JobExecutor`: consumes descriptors from the queue and records outcomes
//! - `WorkerHandle`: shutdown and statistics for a running pool

pub mod executor;
pub mod postgres;
pub mod store;

pub use executor::{ExecutorStats, JobExecutor, ProcessOutcome, WorkerConfig, WorkerHandle};
pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError, UpdateOutcome};
