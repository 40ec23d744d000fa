//! Completion of user code invoked by the pipeline (post-deploy hooks).

use serde::{Deserialize, Serialize};

/// Tagged completion of a user-supplied callback.
///
/// User code may finish with a single value, report a failure, or emit a
/// sequence of partial values before exiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum HookOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
    Streamed(Vec<serde_json::Value>),
}

impl HookOutcome {
    /// Collapses the outcome into a single value or the failure message.
    pub fn into_result(self) -> Result<serde_json::Value, String> {
        match self {
            Self::Succeeded(value) => Ok(value),
            Self::Streamed(parts) => Ok(serde_json::Value::Array(parts)),
            Self::Failed(message) => Err(message),
        }
    }
}
