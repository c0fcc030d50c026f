//! Binary floating-point arithmetic.
//!
//! Results use fixed-point text with six decimals (`"5.000000"`).

use crate::error::ComputeError;

/// The four supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "subtract",
            BinaryOp::Multiply => "multiply",
            BinaryOp::Divide => "divide",
        }
    }

    pub fn all() -> [BinaryOp; 4] {
        [
            BinaryOp::Add,
            BinaryOp::Subtract,
            BinaryOp::Multiply,
            BinaryOp::Divide,
        ]
    }

    pub fn apply(&self, operands: &[String]) -> Result<String, ComputeError> {
        let [lhs, rhs] = operands else {
            return Err(ComputeError::invalid(format!(
                "expected two numbers for {}, got {}",
                self.name(),
                operands.len()
            )));
        };
        let lhs = parse_operand(lhs, "first")?;
        let rhs = parse_operand(rhs, "second")?;

        let value = match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => {
                if rhs == 0.0 {
                    return Err(ComputeError::DivisionByZero);
                }
                lhs / rhs
            }
        };

        if !value.is_finite() {
            return Err(ComputeError::Overflow(format!(
                "{} result is not finite",
                self.name()
            )));
        }

        Ok(format_fixed(value))
    }
}

fn parse_operand(raw: &str, position: &str) -> Result<f64, ComputeError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| ComputeError::invalid(format!("{position} operand '{raw}' is not a number")))?;
    if !value.is_finite() {
        return Err(ComputeError::invalid(format!(
            "{position} operand '{raw}' is not finite"
        )));
    }
    Ok(value)
}

/// Fixed-point rendering, never scientific notation.
pub fn format_fixed(value: f64) -> String {
    format!("{value:.6}")
}
