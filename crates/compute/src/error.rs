use thiserror::Error;

/// Backend failure. Converted into an error marker on the job, never propagated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// Wrong operand count, non-numeric input, or out-of-domain value.
    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("division by zero")]
    DivisionByZero,

    /// Result does not fit the backend's numeric range.
    #[error("overflow: {0}")]
    Overflow(String),
}

impl ComputeError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperand(msg.into())
    }
}
