//! Computation backends executed by workers.
//!
//! Backends are pure functions from an operand list to a result string. The
//! [`ComputeRegistry`] maps operation names to backends; unknown names are the
//! caller's problem.

pub mod arithmetic;
pub mod error;
pub mod number_theory;
pub mod registry;

pub use error::ComputeError;
pub use registry::{ComputeBackend, ComputeRegistry};
