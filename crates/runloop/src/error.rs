use crate::config::ConfigError;
use thiserror::Error;

/// Run-level errors.
///
/// Per-call failures (bad arguments, a tool that errored) never show up here;
/// they become that call's output. Everything in this enum ends the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The remote run asked for a tool the registry never declared.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A tool with this name is already registered.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// The remote side sent something outside the expected event contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The run hit its action-cycle cap or the resume call ran out of retries.
    #[error("run exhausted: {0}")]
    RunExhausted(String),

    /// Transport-level failure talking to the remote service. Transient.
    #[error("network error: {0}")]
    Network(String),

    /// An event stream broke off after the request was accepted. Not retried,
    /// since the remote may already have acted on the request.
    #[error("event stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The remote service rejected a request.
    #[error("API error: {0}")]
    Api(String),

    /// The enclosing turn was cancelled.
    #[error("run cancelled")]
    Cancelled,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] storage::Error),
}

/// Where in the loop a run-level failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Registry,
    Dispatch,
    Resume,
    Batch,
    Setup,
    Persistence,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Registry => "tool resolution",
            Self::Dispatch => "event dispatch",
            Self::Resume => "resume",
            Self::Batch => "batch assembly",
            Self::Setup => "setup",
            Self::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// The loop stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::UnknownTool(_) | Self::DuplicateTool(_) => Stage::Registry,
            Self::ProtocolViolation(_) | Self::StreamInterrupted(_) | Self::Cancelled => {
                Stage::Dispatch
            }
            Self::RunExhausted(_) | Self::Network(_) | Self::Api(_) => Stage::Resume,
            Self::InvalidState(_) => Stage::Batch,
            Self::Config(_) => Stage::Setup,
            Self::Storage(_) => Stage::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
