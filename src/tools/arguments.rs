//! Typed access to tool call arguments.

use crate::error::ParleyError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Parse the raw arguments string of a function call.
    ///
    /// Blank input is treated as an empty object, since tools without
    /// parameters are often called with `""`.
    pub fn parse(raw: &str) -> Result<Self, ParleyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(serde_json::json!({})));
        }
        serde_json::from_str(trimmed).map(Self::new).map_err(|e| {
            ParleyError::InvalidArgument(format!("Malformed tool arguments: {e}"))
        })
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ParleyError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParleyError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ParleyError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ParleyError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
