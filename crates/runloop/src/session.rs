//! Session management.

use std::sync::Arc;

use storage::{Event, EventKind, Role, ThreadId, ThreadStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::config::RunConfig;
use crate::remote::{EventStream, Remote};
use crate::run::{FinalRunState, RunHandle, RunOutcome, RunProgress, ToolExchange, ToolLoop};
use crate::tools::ToolRegistry;

/// A conversation thread whose runs are served locally and recorded.
pub struct Session {
    pub thread: ThreadId,
    store: ThreadStore,
    tool_loop: ToolLoop,
}

impl Session {
    /// Create a session on `thread` with the given store, tools and remote.
    pub fn new(
        thread: impl Into<ThreadId>,
        store: ThreadStore,
        registry: Arc<ToolRegistry>,
        remote: Arc<dyn Remote>,
    ) -> Self {
        Self {
            thread: thread.into(),
            store,
            tool_loop: ToolLoop::new(registry, remote),
        }
    }

    /// Set loop limits and scheduling.
    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.tool_loop = self.tool_loop.with_config(config);
        self
    }

    /// Cancel in-flight turns when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.tool_loop = self.tool_loop.with_cancellation(cancel);
        self
    }

    /// Record a user message on the thread.
    pub fn say(&mut self, text: &str) -> Result<()> {
        self.store.save_message(&self.thread, Role::User, text)?;
        Ok(())
    }

    /// Drive a run to its end and record what happened.
    ///
    /// Every tool exchange, the final assistant message and a closing
    /// `run_end` record are persisted. If the loop itself fails, the
    /// `run_end` record names the failing stage and the error is returned.
    pub async fn run_turn(&mut self, initial: EventStream) -> Result<FinalRunState> {
        let mut progress = RunProgress::default();
        let result = self.tool_loop.run_with_progress(initial, &mut progress).await;

        let state = match result {
            Ok(state) => state,
            Err(e) => {
                warn!(thread = %self.thread, stage = %e.stage(), error = %e, "turn failed");
                self.record_exchanges(&progress.exchanges)?;
                self.append(EventKind::RunEnd {
                    run_id: run_id(progress.run.as_ref()),
                    status: "error".to_string(),
                    detail: Some(format!("{}: {e}", e.stage())),
                })?;
                return Err(e);
            }
        };

        self.record_exchanges(&state.exchanges)?;
        if let Some(message) = state.message() {
            self.store.save_message(&self.thread, Role::Assistant, message)?;
        }

        let (status, detail) = match &state.outcome {
            RunOutcome::Completed { .. } => ("completed", None),
            RunOutcome::Failed { reason } => ("failed", Some(reason.clone())),
        };
        self.append(EventKind::RunEnd {
            run_id: run_id(state.run.as_ref()),
            status: status.to_string(),
            detail,
        })?;

        info!(
            thread = %self.thread,
            status,
            exchanges = state.exchanges.len(),
            "turn recorded"
        );
        Ok(state)
    }

    /// Everything recorded on this thread, oldest first.
    pub fn history(&self) -> Result<Vec<Event>> {
        Ok(self.store.load_thread(&self.thread)?)
    }

    fn record_exchanges(&self, exchanges: &[ToolExchange]) -> Result<()> {
        for exchange in exchanges {
            self.append(EventKind::ToolCall {
                call_id: exchange.call.id.clone(),
                name: exchange.call.name.clone(),
                arguments: exchange.call.arguments.clone(),
            })?;
            self.append(EventKind::ToolResult {
                call_id: exchange.call.id.clone(),
                name: exchange.call.name.clone(),
                output: exchange.outcome.output(),
                is_error: exchange.outcome.is_error(),
            })?;
        }
        Ok(())
    }

    fn append(&self, kind: EventKind) -> Result<()> {
        self.store.append(&Event::new(self.thread.clone(), kind))?;
        Ok(())
    }
}

fn run_id(run: Option<&RunHandle>) -> Option<String> {
    run.map(|run| run.run_id.to_string())
}
