//! Infrastructure layer: job store, queue transport, services, worker, config.

pub mod config;
pub mod jobs;
pub mod queue;
pub mod services;

mod integration_tests;

pub use config::{AppConfig, ConfigError};
pub use jobs::{JobExecutor, JobStore, JobStoreError, WorkerHandle};
pub use queue::{Delivery, JobQueue, QueueError};
pub use services::{IntakeService, ResultQueryService, ServiceError};
