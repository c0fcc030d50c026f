//! Queue message carrying everything a worker needs to execute a job.

use serde::{Deserialize, Serialize};

use crate::id::JobId;

/// Content type stamped on every descriptor message.
pub const DESCRIPTOR_CONTENT_TYPE: &str = "application/json";

/// Snapshot of a job placed on the work queue.
///
/// Wire format: `{"id": <integer>, "operation": <string>, "data": [<string>, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub operation: String,
    pub data: Vec<String>,
}

impl JobDescriptor {
    pub fn new(id: JobId, operation: impl Into<String>, data: Vec<String>) -> Self {
        Self {
            id,
            operation: operation.into(),
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_uses_integer_id_and_string_data() {
        let d = JobDescriptor::new(JobId::new(12), "add", vec!["2".into(), "3".into()]);
        let value: serde_json::Value = serde_json::from_str(&d.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": 12, "operation": "add", "data": ["2", "3"]})
        );
    }

    #[test]
    fn rejects_numeric_data_elements() {
        let body = br#"{"id": 1, "operation": "add", "data": [2, 3]}"#;
        assert!(JobDescriptor::from_json(body).is_err());
    }
}
