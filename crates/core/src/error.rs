//! Domain error model.

use thiserror::Error;

/// Malformed client input.
///
/// Raised before anything is persisted; the HTTP layer surfaces it as a 4xx.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The body is not well-formed JSON (or not a JSON object).
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A well-formed integer that no job can carry (non-positive or out of range).
    #[error("no job can have identifier {0}")]
    UnassignableId(String),
}

impl ValidationError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBody(msg.into())
    }

    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}
