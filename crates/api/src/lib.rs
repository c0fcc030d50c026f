//! HTTP API: job submission and result lookup.

pub mod app;
