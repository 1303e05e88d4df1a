use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure confined to a single tool call.
///
/// These are reported back to the remote run as the call's output text and
/// never abort sibling calls or the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolError {
    /// The raw argument payload was not a JSON object.
    #[error("could not decode arguments {raw:?}: {reason}")]
    ArgumentDecode { raw: String, reason: String },

    /// The arguments parsed but do not satisfy the tool's schema.
    #[error("invalid arguments: {0}")]
    ArgumentValidation(String),

    /// The tool function returned an error or panicked.
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),
}

impl ToolError {
    /// Short machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ArgumentDecode { .. } => "argument_decode",
            Self::ArgumentValidation(_) => "argument_validation",
            Self::Execution(_) => "tool_execution",
            Self::Timeout(_) => "timeout",
        }
    }
}
