//! Submit request parsing and structural validation.

use serde_json::Value;

use crate::error::ValidationError;

/// A validated computation request: `{"operation": string, "data": [any]}`.
///
/// Operand elements may be JSON strings (kept verbatim) or JSON numbers
/// (converted to their decimal text). Anything else is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub operation: String,
    pub data: Vec<String>,
}

impl SubmitRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ValidationError::malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(ValidationError::malformed("expected a JSON object"));
        };

        let operation = match fields.remove("operation") {
            Some(Value::String(op)) if !op.trim().is_empty() => op,
            Some(Value::String(_)) => {
                return Err(ValidationError::invalid_field("operation", "must not be empty"));
            }
            Some(_) => return Err(ValidationError::invalid_field("operation", "must be a string")),
            None => return Err(ValidationError::MissingField("operation")),
        };

        let items = match fields.remove("data") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ValidationError::invalid_field("data", "must be an array")),
            None => return Err(ValidationError::MissingField("data")),
        };

        let data = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(ValidationError::invalid_field(
                    "data",
                    format!("element {idx} must be a string or number, got {}", type_name(&other)),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { operation, data })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
