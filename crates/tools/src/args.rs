//! Argument extraction shared by the handlers.

use appforge_core::error::ToolError;
use appforge_core::store::normalize_path;
use serde_json::Value;

pub(crate) fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// A workspace path argument, normalized. Escaping paths are rejected.
pub(crate) fn required_path(arguments: &Value, key: &str) -> Result<String, ToolError> {
    let raw = required_str(arguments, key)?;
    normalize_path(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// The path a call will touch, for scheduling. An invalid path is kept raw
/// so the call still serializes against anything naming the same string.
pub(crate) fn touched(arguments: &Value, key: &str) -> Option<String> {
    arguments[key]
        .as_str()
        .map(|p| normalize_path(p).unwrap_or_else(|_| p.to_string()))
}
