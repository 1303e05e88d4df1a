//! Run identity, remote events and submission payloads.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use storage::ThreadId;

use crate::tools::ToolOutcome;
use crate::{Error, Result};

/// Identifier of a run on the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One in-flight remote execution: the (thread, run) pair every remote call
/// is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    pub thread_id: ThreadId,
    pub run_id: RunId,
}

impl RunHandle {
    pub fn new(thread_id: impl Into<ThreadId>, run_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: RunId(run_id.into()),
        }
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.run_id)
    }
}

/// Lifecycle status reported by the remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunStatus {
    /// Parse the remote's status string. Unknown statuses yield `None`.
    pub fn from_wire(status: &str) -> Option<Self> {
        let status = match status {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "cancelling" => Self::Cancelling,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            "incomplete" => Self::Incomplete,
            _ => return None,
        };
        Some(status)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Cancelling => "cancelling",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Function body of a raw tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// A tool call exactly as the remote sent it, before shape checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub function: Option<RawFunction>,
}

impl RawToolCall {
    /// A well-formed `function` call.
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: Some(RawFunction {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }
}

/// An event from a remote run's stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The run moved to a new lifecycle status.
    RunStatus {
        run: RunHandle,
        status: RunStatus,
        /// Remote-provided reason for failed or incomplete runs.
        error: Option<String>,
    },
    /// The run paused and needs the outputs of these calls.
    RequiresAction {
        run: RunHandle,
        tool_calls: Vec<RawToolCall>,
    },
    /// A chunk of assistant message text.
    MessageDelta { text: String },
    /// An assistant message finished; `text` is its full content.
    MessageCompleted { text: String },
    /// Stream-level error reported by the remote.
    Error { message: String },
    /// End-of-stream sentinel.
    Done,
    /// Any event the loop does not act on.
    Other { name: String },
}

/// A validated tool call waiting to be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    /// Serialized JSON arguments, possibly empty.
    pub arguments: String,
}

impl TryFrom<RawToolCall> for PendingToolCall {
    type Error = Error;

    fn try_from(raw: RawToolCall) -> Result<Self> {
        if raw.kind != "function" {
            return Err(Error::ProtocolViolation(format!(
                "unexpected tool call type `{}` for call {}",
                raw.kind, raw.id
            )));
        }
        let function = raw.function.ok_or_else(|| {
            Error::ProtocolViolation(format!("function call {} has no function body", raw.id))
        })?;
        Ok(Self {
            id: raw.id,
            name: function.name,
            arguments: function.arguments,
        })
    }
}

/// Turn the calls of one "requires action" event into a batch.
///
/// The whole batch is validated before any of it is used.
pub fn capture_batch(tool_calls: Vec<RawToolCall>) -> Result<Vec<PendingToolCall>> {
    if tool_calls.is_empty() {
        return Err(Error::ProtocolViolation(
            "requires_action event carried no tool calls".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(tool_calls.len());
    tool_calls
        .into_iter()
        .map(|raw| {
            if !seen.insert(raw.id.clone()) {
                return Err(Error::ProtocolViolation(format!(
                    "duplicate tool call id {}",
                    raw.id
                )));
            }
            PendingToolCall::try_from(raw)
        })
        .collect()
}

/// Output for one call, in the remote's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// The single payload that resumes a paused run.
///
/// Always carries exactly one output per call of the batch that caused the
/// pause, in the order the calls arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionBatch {
    tool_outputs: Vec<ToolOutput>,
}

impl SubmissionBatch {
    /// Pair outcomes with their calls.
    ///
    /// Fails if any call lacks an outcome, or an outcome matches no call or
    /// repeats one.
    pub fn assemble(calls: &[PendingToolCall], outcomes: &[ToolOutcome]) -> Result<Self> {
        let mut by_id: HashMap<&str, &ToolOutcome> = HashMap::with_capacity(outcomes.len());
        for outcome in outcomes {
            if by_id.insert(outcome.call_id(), outcome).is_some() {
                return Err(Error::InvalidState(format!(
                    "two outcomes for call {}",
                    outcome.call_id()
                )));
            }
        }

        let tool_outputs = calls
            .iter()
            .map(|call| {
                by_id
                    .remove(call.id.as_str())
                    .map(|outcome| ToolOutput {
                        tool_call_id: call.id.clone(),
                        output: outcome.output(),
                    })
                    .ok_or_else(|| {
                        Error::InvalidState(format!("no outcome for call {}", call.id))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(stray) = by_id.keys().next() {
            return Err(Error::InvalidState(format!(
                "outcome for call {stray} outside the batch"
            )));
        }

        Ok(Self { tool_outputs })
    }

    pub fn outputs(&self) -> &[ToolOutput] {
        &self.tool_outputs
    }

    pub fn call_ids(&self) -> impl Iterator<Item = &str> {
        self.tool_outputs.iter().map(|o| o.tool_call_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.tool_outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tool_outputs.is_empty()
    }
}

/// A tool call and the outcome submitted for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExchange {
    pub call: PendingToolCall,
    pub outcome: ToolOutcome,
}

/// Where the loop is in a run's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Streaming,
    ActionRequired,
    Submitting,
    Completed,
    Failed,
}

/// How a run ended on the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run finished; `message` is the assistant text from its final leg.
    Completed { message: Option<String> },
    /// The remote reported the run as failed, cancelled, expired or incomplete.
    Failed { reason: String },
}

/// Result of driving a run to a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalRunState {
    /// Last run identity seen on the stream.
    pub run: Option<RunHandle>,
    pub outcome: RunOutcome,
    /// Number of "requires action" pauses served.
    pub action_cycles: u32,
    /// Every tool exchange of the run, in submission order.
    pub exchanges: Vec<ToolExchange>,
}

impl FinalRunState {
    pub fn state(&self) -> RunState {
        match self.outcome {
            RunOutcome::Completed { .. } => RunState::Completed,
            RunOutcome::Failed { .. } => RunState::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state() == RunState::Completed
    }

    /// Final assistant message, if the run completed with one.
    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Completed { message } => message.as_deref(),
            RunOutcome::Failed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;

    fn pending(id: &str) -> PendingToolCall {
        PendingToolCall {
            id: id.into(),
            name: "t".into(),
            arguments: String::new(),
        }
    }

    #[test]
    fn raw_call_deserializes_from_wire() {
        let raw: RawToolCall = serde_json::from_str(
            r#"{"id":"call_1","type":"function","function":{"name":"fetch_current_temperature","arguments":""}}"#,
        )
        .unwrap();
        assert_eq!(
            raw,
            RawToolCall::function("call_1", "fetch_current_temperature", "")
        );
    }

    #[test]
    fn non_function_call_is_a_protocol_violation() {
        let raw = RawToolCall {
            id: "call_1".into(),
            kind: "code_interpreter".into(),
            function: None,
        };
        let err = capture_batch(vec![raw]).unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(msg) if msg.contains("code_interpreter")));
    }

    #[test]
    fn empty_or_duplicate_batches_are_rejected() {
        assert!(matches!(
            capture_batch(Vec::new()),
            Err(Error::ProtocolViolation(_))
        ));

        let dup = vec![
            RawToolCall::function("call_1", "a", ""),
            RawToolCall::function("call_1", "b", ""),
        ];
        assert!(matches!(capture_batch(dup), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn batch_follows_call_order() {
        let calls = [pending("a"), pending("b")];
        let outcomes = [
            ToolOutcome::failure("b", ToolError::Execution("boom".into())),
            ToolOutcome::success("a", "ok"),
        ];
        let batch = SubmissionBatch::assemble(&calls, &outcomes).unwrap();
        assert_eq!(batch.call_ids().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(batch.outputs()[0].output, "ok");
        assert!(batch.outputs()[1].output.contains("boom"));
    }

    #[test]
    fn partial_batches_cannot_be_assembled() {
        let calls = [pending("a"), pending("b")];
        let missing = [ToolOutcome::success("a", "ok")];
        assert!(matches!(
            SubmissionBatch::assemble(&calls, &missing),
            Err(Error::InvalidState(_))
        ));

        let stray = [
            ToolOutcome::success("a", "ok"),
            ToolOutcome::success("b", "ok"),
            ToolOutcome::success("c", "ok"),
        ];
        assert!(matches!(
            SubmissionBatch::assemble(&calls, &stray),
            Err(Error::InvalidState(_))
        ));

        let twice = [ToolOutcome::success("a", "1"), ToolOutcome::success("a", "2")];
        assert!(matches!(
            SubmissionBatch::assemble(&calls, &twice),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn batch_serializes_to_wire_shape() {
        let batch =
            SubmissionBatch::assemble(&[pending("call_1")], &[ToolOutcome::success("call_1", "x")])
                .unwrap();
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            serde_json::json!({"tool_outputs": [{"tool_call_id": "call_1", "output": "x"}]})
        );
    }
}
