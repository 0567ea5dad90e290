use crate::orchestrator::TierError;
use crate::Record;
use serde_json::Value;

/// Returns the elements of the array found at `pointer` (RFC 6901)
///
/// An empty pointer selects the document root.
pub fn extract(body: &str, pointer: &str) -> Result<Vec<Record>, TierError> {
    let document: Value =
        serde_json::from_str(body).map_err(|e| TierError::Parse(format!("invalid JSON: {}", e)))?;

    let target = document
        .pointer(pointer)
        .ok_or_else(|| TierError::Parse(format!("nothing at JSON pointer '{}'", pointer)))?;

    match target {
        Value::Array(items) => Ok(items.clone()),
        other => Err(TierError::Parse(format!(
            "expected an array at '{}', found {}",
            pointer,
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
