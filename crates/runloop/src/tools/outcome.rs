use serde::{Deserialize, Serialize};

use super::ToolError;

/// Result of one tool call, paired with the call it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The tool ran; `output` is its display string.
    Success { call_id: String, output: String },
    /// The call failed before or during execution.
    Failure { call_id: String, error: ToolError },
}

impl ToolOutcome {
    pub fn success(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Success {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    pub fn failure(call_id: impl Into<String>, error: ToolError) -> Self {
        Self::Failure {
            call_id: call_id.into(),
            error,
        }
    }

    pub fn call_id(&self) -> &str {
        match self {
            Self::Success { call_id, .. } | Self::Failure { call_id, .. } => call_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Text submitted to the remote run for this call.
    ///
    /// Failures are rendered so the remote model can see what went wrong and
    /// react, e.g. `error (tool_execution): execution failed: boom`.
    pub fn output(&self) -> String {
        match self {
            Self::Success { output, .. } => output.clone(),
            Self::Failure { error, .. } => format!("error ({}): {error}", error.kind()),
        }
    }
}
