//! Operation name → backend dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::arithmetic::BinaryOp;
use crate::error::ComputeError;
use crate::number_theory;

/// A pluggable computation.
pub trait ComputeBackend: Send + Sync {
    fn compute(&self, operands: &[String]) -> Result<String, ComputeError>;
}

impl<F> ComputeBackend for F
where
    F: Fn(&[String]) -> Result<String, ComputeError> + Send + Sync,
{
    fn compute(&self, operands: &[String]) -> Result<String, ComputeError> {
        self(operands)
    }
}

/// Registry of backends keyed by operation name.
///
/// Lookup is exact-match and case-sensitive.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    backends: HashMap<String, Arc<dyn ComputeBackend>>,
}

impl ComputeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the arithmetic and number-theoretic backends installed.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for op in BinaryOp::all() {
            registry.register(op.name(), move |operands: &[String]| op.apply(operands));
        }
        registry.register("factorial", number_theory::factorial);
        registry.register("fibonacci", number_theory::fibonacci);
        registry
    }

    /// Register (or replace) the backend for an operation name.
    pub fn register<B>(&mut self, operation: impl Into<String>, backend: B)
    where
        B: ComputeBackend + 'static,
    {
        self.backends.insert(operation.into(), Arc::new(backend));
    }

    pub fn get(&self, operation: &str) -> Option<&Arc<dyn ComputeBackend>> {
        self.backends.get(operation)
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl core::fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComputeRegistry")
            .field("operations", &self.operations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(
        registry: &ComputeRegistry,
        op: &str,
        operands: &[&str],
    ) -> Result<String, ComputeError> {
        let operands: Vec<String> = operands.iter().map(|s| s.to_string()).collect();
        registry.get(op).expect("backend registered").compute(&operands)
    }

    #[test]
    fn defaults_cover_all_operations() {
        let registry = ComputeRegistry::with_defaults();
        assert_eq!(
            registry.operations(),
            vec!["add", "divide", "factorial", "fibonacci", "multiply", "subtract"]
        );
    }

    #[test]
    fn dispatches_by_name() {
        let registry = ComputeRegistry::with_defaults();
        assert_eq!(run(&registry, "add", &["2", "3"]).unwrap(), "5.000000");
        assert_eq!(run(&registry, "factorial", &["20"]).unwrap(), "2432902008176640000");
        assert_eq!(run(&registry, "fibonacci", &["10"]).unwrap(), "55");
        assert_eq!(run(&registry, "divide", &["5", "0"]), Err(ComputeError::DivisionByZero));
    }

    #[test]
    fn unknown_operations_are_absent() {
        let registry = ComputeRegistry::with_defaults();
        assert!(registry.get("sqrt").is_none());
        assert!(registry.get("ADD").is_none());
    }

    #[test]
    fn custom_backends_can_be_plugged_in() {
        let mut registry = ComputeRegistry::new();
        registry.register("echo", |operands: &[String]| Ok(operands.join(",")));
        assert_eq!(run(&registry, "echo", &["a", "b"]).unwrap(), "a,b");
    }
}
