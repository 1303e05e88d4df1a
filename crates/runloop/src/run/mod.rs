//! Driving a remote run: event dispatch, batch assembly and the resume loop.

mod coordinator;
mod dispatcher;
mod types;

pub use coordinator::{RunProgress, ToolLoop, run_tool_loop};
pub use dispatcher::{Dispatch, RunEventDispatcher};
pub use types::{
    FinalRunState, PendingToolCall, RawFunction, RawToolCall, RunEvent, RunHandle, RunId,
    RunOutcome, RunState, RunStatus, SubmissionBatch, ToolExchange, ToolOutput, capture_batch,
};
