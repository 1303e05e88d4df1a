//! The tool-call fulfillment loop.
//!
//! A run alternates between streaming events and serving "requires action"
//! pauses. Each pause is answered with exactly one submission carrying an
//! output for every requested call, after which the resumed stream is
//! consumed the same way until the run ends.

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Dispatch, FinalRunState, PendingToolCall, RunEventDispatcher, RunHandle, RunOutcome,
    SubmissionBatch, ToolExchange,
};
use crate::config::RunConfig;
use crate::remote::{EventStream, Remote};
use crate::tools::{ToolOutcome, ToolRegistry, execute_call};
use crate::{Error, Result};

/// Where the loop currently is.
enum Phase {
    Streaming(RunEventDispatcher),
    ActionRequired {
        run: RunHandle,
        calls: Vec<PendingToolCall>,
    },
    Submitting {
        run: RunHandle,
        batch: SubmissionBatch,
        exchanges: Vec<ToolExchange>,
    },
}

/// What a run has done so far, kept by the caller across a failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunProgress {
    /// Last run identity seen on the stream.
    pub run: Option<RunHandle>,
    /// "Requires action" pauses entered, including one that failed.
    pub action_cycles: u32,
    /// Exchanges whose outputs the remote accepted, in submission order.
    pub exchanges: Vec<ToolExchange>,
}

/// Drives one run to a terminal state, executing local tools whenever the
/// run pauses for them.
#[derive(Clone)]
pub struct ToolLoop {
    registry: Arc<ToolRegistry>,
    remote: Arc<dyn Remote>,
    config: RunConfig,
    cancel: CancellationToken,
}

impl ToolLoop {
    pub fn new(registry: Arc<ToolRegistry>, remote: Arc<dyn Remote>) -> Self {
        Self {
            registry,
            remote,
            config: RunConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Stop the loop when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Consume `initial` and every resumed stream until the run ends.
    ///
    /// A run the remote reports as failed is still `Ok`; see
    /// [`FinalRunState::outcome`]. `Err` means the loop itself gave up.
    pub async fn run(&self, initial: EventStream) -> Result<FinalRunState> {
        self.run_with_progress(initial, &mut RunProgress::default()).await
    }

    /// Like [`run`](Self::run), but records progress into `progress` as the
    /// run advances, so callers can still see what was submitted when the
    /// loop fails.
    ///
    /// On success the recorded exchanges move into the returned state.
    pub async fn run_with_progress(
        &self,
        initial: EventStream,
        progress: &mut RunProgress,
    ) -> Result<FinalRunState> {
        let mut phase = Phase::Streaming(RunEventDispatcher::new(initial));

        loop {
            phase = match phase {
                Phase::Streaming(mut dispatcher) => {
                    let dispatch = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        dispatch = dispatcher.next_dispatch() => dispatch?,
                    };

                    let (run, outcome) = match dispatch {
                        Dispatch::ActionRequired { run, calls } => {
                            progress.run = Some(run.clone());
                            phase = Phase::ActionRequired { run, calls };
                            continue;
                        }
                        Dispatch::Completed { run, message } => {
                            (run, RunOutcome::Completed { message })
                        }
                        Dispatch::Failed { run, reason } => (run, RunOutcome::Failed { reason }),
                    };
                    if run.is_some() {
                        progress.run = run;
                    }
                    info!(
                        run = ?progress.run,
                        action_cycles = progress.action_cycles,
                        completed = matches!(outcome, RunOutcome::Completed { .. }),
                        "run finished"
                    );
                    return Ok(FinalRunState {
                        run: progress.run.clone(),
                        outcome,
                        action_cycles: progress.action_cycles,
                        exchanges: std::mem::take(&mut progress.exchanges),
                    });
                }
                Phase::ActionRequired { run, calls } => {
                    progress.action_cycles += 1;
                    let cycle = progress.action_cycles;
                    if cycle > self.config.max_action_cycles {
                        return Err(Error::RunExhausted(format!(
                            "run {run} exceeded {} action cycles",
                            self.config.max_action_cycles
                        )));
                    }
                    info!(run = %run, cycle, calls = calls.len(), "serving tool calls");

                    let outcomes = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        outcomes = self.handle_batch(&calls) => outcomes?,
                    };
                    let batch = SubmissionBatch::assemble(&calls, &outcomes)?;
                    let exchanges = calls
                        .into_iter()
                        .zip(outcomes)
                        .map(|(call, outcome)| ToolExchange { call, outcome })
                        .collect();
                    Phase::Submitting {
                        run,
                        batch,
                        exchanges,
                    }
                }
                Phase::Submitting {
                    run,
                    batch,
                    exchanges,
                } => {
                    let stream = self.resume_with_retry(&run, &batch).await?;
                    progress.exchanges.extend(exchanges);
                    Phase::Streaming(RunEventDispatcher::new(stream))
                }
            };
        }
    }

    /// Execute one batch of calls and return their outcomes in call order.
    ///
    /// Every call is resolved before anything runs, so an unknown tool
    /// fails the whole batch with no side effects.
    pub async fn handle_batch(&self, calls: &[PendingToolCall]) -> Result<Vec<ToolOutcome>> {
        let resolved = calls
            .iter()
            .map(|call| self.registry.resolve(&call.name).map(|tool| (tool, call)))
            .collect::<Result<Vec<_>>>()?;

        let timeout = self.config.tool_timeout();
        if self.config.parallel_tools {
            let pending = resolved
                .into_iter()
                .map(|(tool, call)| execute_call(tool, call, timeout));
            return Ok(join_all(pending).await);
        }

        let mut outcomes = Vec::with_capacity(resolved.len());
        for (tool, call) in resolved {
            outcomes.push(execute_call(tool, call, timeout).await);
        }
        Ok(outcomes)
    }

    /// Submit a batch, retrying transient failures with backoff.
    async fn resume_with_retry(
        &self,
        run: &RunHandle,
        batch: &SubmissionBatch,
    ) -> Result<EventStream> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempt += 1;
            debug!(run = %run, attempt, outputs = batch.len(), "resuming run");

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                result = self.remote.resume_run(run, batch) => result,
            };

            let error = match result {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                warn!(run = %run, attempt, error = %error, "giving up on resume");
                return Err(Error::RunExhausted(format!(
                    "resume of run {run} failed after {attempt} attempts: {error}"
                )));
            }

            let delay = policy.delay_for(attempt - 1);
            warn!(
                run = %run,
                attempt,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "resume failed, retrying"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Drive a run with a one-off [`ToolLoop`].
pub async fn run_tool_loop(
    initial: EventStream,
    registry: Arc<ToolRegistry>,
    remote: Arc<dyn Remote>,
    config: RunConfig,
    cancel: CancellationToken,
) -> Result<FinalRunState> {
    ToolLoop::new(registry, remote)
        .with_config(config)
        .with_cancellation(cancel)
        .run(initial)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::ScriptedRemote;
    use crate::tools::{Param, ParamKind, ToolDescriptor, ToolFnError, ToolSchema};
    use serde_json::{Value, json};

    async fn echo(args: crate::tools::Kwargs) -> std::result::Result<Value, ToolFnError> {
        Ok(Value::Object(args))
    }

    fn tool_loop(parallel: bool) -> ToolLoop {
        let registry = ToolRegistry::from_tools([ToolDescriptor::new(
            "echo",
            ToolSchema::new([Param::optional("n", ParamKind::Integer)]),
            echo,
        )])
        .unwrap();
        ToolLoop::new(Arc::new(registry), Arc::new(ScriptedRemote::new())).with_config(RunConfig {
            parallel_tools: parallel,
            ..RunConfig::default()
        })
    }

    fn call(id: &str, name: &str, arguments: &str) -> PendingToolCall {
        PendingToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    #[tokio::test]
    async fn batch_outcomes_follow_call_order() {
        let calls = [call("call_1", "echo", r#"{"n":1}"#), call("call_2", "echo", "")];
        for parallel in [true, false] {
            let outcomes = tool_loop(parallel).handle_batch(&calls).await.unwrap();
            let ids: Vec<_> = outcomes.iter().map(ToolOutcome::call_id).collect();
            assert_eq!(ids, ["call_1", "call_2"]);
            assert_eq!(outcomes[0].output(), json!({"n": 1}).to_string());
            assert_eq!(outcomes[1].output(), "{}");
        }
    }

    #[tokio::test]
    async fn unknown_tool_fails_the_whole_batch() {
        let calls = [call("call_1", "echo", ""), call("call_2", "missing", "")];
        let err = tool_loop(true).handle_batch(&calls).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(name) if name == "missing"));
    }
}
