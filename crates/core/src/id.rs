//! Strongly-typed job identifier.

use core::num::IntErrorKind;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier of a job, assigned by the job store at creation.
///
/// Store-assigned and monotonic; never reused once handed out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(i64);

impl JobId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for JobId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<JobId> for i64 {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl FromStr for JobId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.parse::<i64>() {
            Ok(value) => value,
            Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
                return Err(ValidationError::UnassignableId(s.to_string()));
            }
            Err(e) => return Err(ValidationError::InvalidId(format!("JobId: {e}"))),
        };
        if value <= 0 {
            return Err(ValidationError::UnassignableId(s.to_string()));
        }
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_integers() {
        let id: JobId = "42".parse().unwrap();
        assert_eq!(id.as_i64(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!("abc".parse::<JobId>(), Err(ValidationError::InvalidId(_))));
        assert!(matches!("".parse::<JobId>(), Err(ValidationError::InvalidId(_))));
        assert!(matches!("1.5".parse::<JobId>(), Err(ValidationError::InvalidId(_))));
    }

    #[test]
    fn integers_outside_the_id_range_are_unassignable() {
        for input in ["0", "-3", "9223372036854775808", "-99999999999999999999"] {
            assert_eq!(
                input.parse::<JobId>(),
                Err(ValidationError::UnassignableId(input.to_string())),
                "{input}"
            );
        }
    }
}
