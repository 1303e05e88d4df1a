//! Classify a run's event stream into the next thing the loop must do.

use futures::StreamExt;
use tracing::{debug, trace};

use super::{PendingToolCall, RunEvent, RunHandle, RunStatus, capture_batch};
use crate::Result;
use crate::remote::EventStream;

/// What a stream leg ended with.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// The run paused for this batch of tool calls.
    ActionRequired {
        run: RunHandle,
        calls: Vec<PendingToolCall>,
    },
    /// The run finished.
    Completed {
        run: Option<RunHandle>,
        message: Option<String>,
    },
    /// The run ended without completing.
    Failed {
        run: Option<RunHandle>,
        reason: String,
    },
}

/// Consumes one event stream of a run.
///
/// A new dispatcher is attached to every stream returned by a resume call.
pub struct RunEventDispatcher {
    stream: EventStream,
    run: Option<RunHandle>,
    completed_messages: Vec<String>,
    pending_text: String,
}

impl RunEventDispatcher {
    pub fn new(stream: EventStream) -> Self {
        Self {
            stream,
            run: None,
            completed_messages: Vec::new(),
            pending_text: String::new(),
        }
    }

    /// Most recent run identity seen on this stream.
    pub fn run(&self) -> Option<&RunHandle> {
        self.run.as_ref()
    }

    /// Pull events until the run pauses for tools or ends.
    ///
    /// A "requires action" event is returned as soon as it arrives, with its
    /// whole batch. Reaching the end of the stream without a terminal status
    /// counts as completion.
    pub async fn next_dispatch(&mut self) -> Result<Dispatch> {
        while let Some(event) = self.stream.next().await {
            match event? {
                RunEvent::RequiresAction { run, tool_calls } => {
                    self.run = Some(run.clone());
                    let calls = capture_batch(tool_calls)?;
                    debug!(run = %run, calls = calls.len(), "run requires action");
                    return Ok(Dispatch::ActionRequired { run, calls });
                }
                RunEvent::RunStatus { run, status, error } => {
                    debug!(run = %run, %status, "run status");
                    self.run = Some(run);
                    if status == RunStatus::Completed {
                        return Ok(self.completed());
                    }
                    if status.is_terminal() {
                        let reason = error.unwrap_or_else(|| format!("run {status}"));
                        return Ok(self.failed(reason));
                    }
                }
                RunEvent::MessageDelta { text } => self.pending_text.push_str(&text),
                RunEvent::MessageCompleted { text } => {
                    self.pending_text.clear();
                    self.completed_messages.push(text);
                }
                RunEvent::Error { message } => return Ok(self.failed(message)),
                RunEvent::Done => break,
                RunEvent::Other { name } => trace!(event = %name, "ignoring event"),
            }
        }
        Ok(self.completed())
    }

    fn completed(&mut self) -> Dispatch {
        let message = if !self.completed_messages.is_empty() {
            Some(self.completed_messages.join("\n\n"))
        } else if !self.pending_text.is_empty() {
            Some(std::mem::take(&mut self.pending_text))
        } else {
            None
        };
        Dispatch::Completed {
            run: self.run.clone(),
            message,
        }
    }

    fn failed(&self, reason: String) -> Dispatch {
        Dispatch::Failed {
            run: self.run.clone(),
            reason,
        }
    }
}
