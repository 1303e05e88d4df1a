//! The remote assistant service.
//!
//! The loop only needs one operation from the remote side: submit the
//! outputs of a paused run and get the resumed run's event stream back.

mod openai;
mod scripted;
mod sse;

pub use openai::{OpenAiRemote, OpenAiRemoteBuilder};
pub use scripted::ScriptedRemote;
pub use sse::{SseDecoder, SseFrame};

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Result;
use crate::run::{RunEvent, RunHandle, SubmissionBatch};

/// Lazily produced events of one run leg. `None` is end of stream.
pub type EventStream = BoxStream<'static, Result<RunEvent>>;

/// A service hosting assistant runs.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Submit tool outputs for a paused run and stream the resumed run.
    ///
    /// Transport failures are reported as [`Error::Network`](crate::Error::Network)
    /// so the caller can retry them.
    async fn resume_run(&self, run: &RunHandle, batch: &SubmissionBatch) -> Result<EventStream>;
}
