//! Single-operand integer functions.

use num_bigint::BigUint;

use crate::error::ComputeError;

/// Largest accepted factorial operand; bounds per-message CPU time.
pub const MAX_FACTORIAL_OPERAND: u64 = 10_000;

/// Largest `n` whose Fibonacci number fits in a `u64`.
pub const MAX_FIBONACCI_OPERAND: u64 = 93;

/// `n!` with unbounded precision.
pub fn factorial(operands: &[String]) -> Result<String, ComputeError> {
    let n = single_non_negative(operands, "factorial")?;
    if n > MAX_FACTORIAL_OPERAND {
        return Err(ComputeError::invalid(format!(
            "factorial operand {n} exceeds limit {MAX_FACTORIAL_OPERAND}"
        )));
    }

    let result = (2..=n).fold(BigUint::from(1u32), |acc, i| acc * i);
    Ok(result.to_string())
}

/// `fib(n)` with `fib(0) = 0`, `fib(1) = fib(2) = 1`, checked against `u64` overflow.
pub fn fibonacci(operands: &[String]) -> Result<String, ComputeError> {
    let n = single_non_negative(operands, "fibonacci")?;
    fib_u64(n).map(|v| v.to_string())
}

fn fib_u64(n: u64) -> Result<u64, ComputeError> {
    if n == 0 {
        return Ok(0);
    }
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 1..n {
        let next = a.checked_add(b).ok_or_else(|| {
            ComputeError::Overflow(format!(
                "fibonacci({n}) exceeds 64-bit range (max operand {MAX_FIBONACCI_OPERAND})"
            ))
        })?;
        a = b;
        b = next;
    }
    Ok(b)
}

fn single_non_negative(operands: &[String], op: &str) -> Result<u64, ComputeError> {
    let [raw] = operands else {
        return Err(ComputeError::invalid(format!(
            "{op} expects exactly one operand, got {}",
            operands.len()
        )));
    };
    raw.parse::<u64>().map_err(|_| {
        ComputeError::invalid(format!("{op} operand '{raw}' is not a non-negative integer"))
    })
}
