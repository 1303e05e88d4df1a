//! In-memory remote that replays scripted streams.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio::sync::Mutex;

use super::{EventStream, Remote};
use crate::run::{RunEvent, RunHandle, SubmissionBatch};
use crate::{Error, Result};

/// A [`Remote`] that answers each resume call with the next scripted
/// response and records what was submitted.
///
/// Useful for tests and demos.
#[derive(Default)]
pub struct ScriptedRemote {
    responses: Mutex<VecDeque<Result<Vec<RunEvent>>>>,
    submissions: Mutex<Vec<(RunHandle, SubmissionBatch)>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a stream of events for the next resume call.
    pub fn then_stream(mut self, events: Vec<RunEvent>) -> Self {
        self.responses.get_mut().push_back(Ok(events));
        self
    }

    /// Queue a failure for the next resume call.
    pub fn then_fail(mut self, error: Error) -> Self {
        self.responses.get_mut().push_back(Err(error));
        self
    }

    /// Build an event stream from a list of events.
    pub fn stream(events: Vec<RunEvent>) -> EventStream {
        stream::iter(events.into_iter().map(Ok)).boxed()
    }

    /// Every resume call made so far, in order.
    pub async fn submissions(&self) -> Vec<(RunHandle, SubmissionBatch)> {
        self.submissions.lock().await.clone()
    }

    pub async fn resume_count(&self) -> usize {
        self.submissions.lock().await.len()
    }

    /// Scripted responses not yet consumed.
    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl Remote for ScriptedRemote {
    async fn resume_run(&self, run: &RunHandle, batch: &SubmissionBatch) -> Result<EventStream> {
        self.submissions
            .lock()
            .await
            .push((run.clone(), batch.clone()));

        let response = self.responses.lock().await.pop_front().ok_or_else(|| {
            Error::InvalidState(format!("no scripted response left for run {run}"))
        })?;
        response.map(Self::stream)
    }
}
