//! Streaming client for an OpenAI-style Assistants API.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, Stream};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use storage::ThreadId;
use tracing::{debug, warn};

use super::{EventStream, Remote, SseDecoder, SseFrame};
use crate::config::RemoteConfig;
use crate::run::{RawToolCall, RunEvent, RunHandle, RunStatus, SubmissionBatch, ToolOutput};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ASSISTANTS_BETA: &str = "assistants=v2";

/// Builder for creating an OpenAI remote.
#[derive(Debug, Clone)]
pub struct OpenAiRemoteBuilder {
    api_key: String,
    base_url: String,
}

impl OpenAiRemoteBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API root (proxies, compatible servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn build(self) -> OpenAiRemote {
        OpenAiRemote {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            base_url: self.base_url,
        }
    }
}

/// Assistants API client that streams run events.
pub struct OpenAiRemote {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct SubmitToolOutputsRequest<'a> {
    tool_outputs: &'a [ToolOutput],
    stream: bool,
}

impl OpenAiRemote {
    pub fn builder(api_key: impl Into<String>) -> OpenAiRemoteBuilder {
        OpenAiRemoteBuilder::new(api_key)
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Ok(Self::builder(config.api_key()?)
            .base_url(&config.base_url)
            .build())
    }

    /// Start a run of `assistant_id` on a thread and stream its events.
    pub async fn create_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &str,
    ) -> Result<EventStream> {
        let url = format!("{}/threads/{thread_id}/runs", self.base_url);
        debug!(%thread_id, assistant_id, "creating run");
        self.post_stream(
            &url,
            &CreateRunRequest {
                assistant_id,
                stream: true,
            },
        )
        .await
    }

    fn submit_url(&self, run: &RunHandle) -> String {
        format!(
            "{}/threads/{}/runs/{}/submit_tool_outputs",
            self.base_url, run.thread_id, run.run_id
        )
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
            .header("accept", "text/event-stream")
    }

    async fn post_stream(&self, url: &str, body: &impl Serialize) -> Result<EventStream> {
        let response = self
            .request(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        Ok(frame_stream(response.bytes_stream()))
    }
}

impl std::fmt::Display for OpenAiRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.base_url)
    }
}

#[async_trait]
impl Remote for OpenAiRemote {
    async fn resume_run(&self, run: &RunHandle, batch: &SubmissionBatch) -> Result<EventStream> {
        debug!(run = %run, outputs = batch.len(), "submitting tool outputs");
        self.post_stream(
            &self.submit_url(run),
            &SubmitToolOutputsRequest {
                tool_outputs: batch.outputs(),
                stream: true,
            },
        )
        .await
    }
}

/// Rate limits and server errors are worth retrying; other rejections are not.
fn classify_status(status: StatusCode, body: String) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Error::Network(format!("{status}: {body}"))
    } else {
        Error::Api(format!("{status}: {body}"))
    }
}

/// Turn a streamed response body into run events.
fn frame_stream<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = (body.boxed(), SseDecoder::new(), false);
    stream::unfold(state, |(mut body, mut decoder, mut finished)| async move {
        loop {
            if let Some(frame) = decoder.next_frame() {
                return Some((decode_frame(&frame), (body, decoder, finished)));
            }
            if finished {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    if let Err(e) = decoder.push_bytes(chunk.as_ref()) {
                        let err = Error::ProtocolViolation(format!(
                            "invalid UTF-8 in event stream: {e}"
                        ));
                        return Some((Err(err), (body, decoder, true)));
                    }
                }
                Some(Err(e)) => {
                    let err = Error::StreamInterrupted(e.to_string());
                    return Some((Err(err), (body, decoder, true)));
                }
                None => {
                    finished = true;
                    if decoder.has_partial() {
                        decoder.push("\n\n");
                    }
                }
            }
        }
    })
    .boxed()
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireRun {
    id: String,
    thread_id: String,
    status: String,
    #[serde(default)]
    required_action: Option<WireRequiredAction>,
    #[serde(default)]
    last_error: Option<WireError>,
    #[serde(default)]
    incomplete_details: Option<WireIncomplete>,
}

impl WireRun {
    fn handle(&self) -> RunHandle {
        RunHandle::new(self.thread_id.as_str(), self.id.as_str())
    }

    fn failure_reason(&self) -> Option<String> {
        if let Some(error) = &self.last_error {
            return Some(error.describe());
        }
        self.incomplete_details
            .as_ref()
            .and_then(|d| d.reason.as_ref())
            .map(|reason| format!("incomplete: {reason}"))
    }
}

#[derive(Debug, Deserialize)]
struct WireRequiredAction {
    #[serde(default)]
    submit_tool_outputs: Option<WireSubmitToolOutputs>,
}

#[derive(Debug, Deserialize)]
struct WireSubmitToolOutputs {
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl WireError {
    fn describe(&self) -> String {
        match &self.code {
            Some(code) => format!("{code}: {}", self.message),
            None => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireIncomplete {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    delta: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireContent>,
}

impl WireMessage {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .filter_map(|c| c.text.as_ref())
            .map(|t| t.value.as_str())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<WireText>,
}

#[derive(Debug, Deserialize)]
struct WireText {
    #[serde(default)]
    value: String,
}

fn parse<'a, T: Deserialize<'a>>(event: &str, data: &'a str) -> Result<T> {
    serde_json::from_str(data)
        .map_err(|e| Error::ProtocolViolation(format!("malformed `{event}` event: {e}")))
}

/// Map one SSE frame onto a run event.
fn decode_frame(frame: &SseFrame) -> Result<RunEvent> {
    let name = frame.event.as_deref().unwrap_or("message");
    match name {
        "done" => Ok(RunEvent::Done),
        "error" => {
            let message = serde_json::from_str::<WireError>(&frame.data)
                .map(|e| e.describe())
                .unwrap_or_else(|_| frame.data.clone());
            Ok(RunEvent::Error { message })
        }
        "thread.run.requires_action" => {
            let run: WireRun = parse(name, &frame.data)?;
            let handle = run.handle();
            let tool_calls = run
                .required_action
                .and_then(|action| action.submit_tool_outputs)
                .map(|submit| submit.tool_calls)
                .ok_or_else(|| {
                    Error::ProtocolViolation(format!(
                        "run {handle} requires action without submit_tool_outputs"
                    ))
                })?;
            Ok(RunEvent::RequiresAction {
                run: handle,
                tool_calls,
            })
        }
        "thread.message.delta" => {
            let delta: WireMessageDelta = parse(name, &frame.data)?;
            Ok(RunEvent::MessageDelta {
                text: delta.delta.text(),
            })
        }
        "thread.message.completed" => {
            let message: WireMessage = parse(name, &frame.data)?;
            Ok(RunEvent::MessageCompleted {
                text: message.text(),
            })
        }
        run_event
            if run_event.starts_with("thread.run.") && !run_event.starts_with("thread.run.step.") =>
        {
            let run: WireRun = parse(name, &frame.data)?;
            match RunStatus::from_wire(&run.status) {
                Some(status) => Ok(RunEvent::RunStatus {
                    run: run.handle(),
                    error: run.failure_reason(),
                    status,
                }),
                None => {
                    warn!(event = name, status = %run.status, "unrecognized run status");
                    Ok(RunEvent::Other {
                        name: name.to_string(),
                    })
                }
            }
        }
        other => Ok(RunEvent::Other {
            name: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(event: &str, data: serde_json::Value) -> SseFrame {
        SseFrame {
            event: Some(event.into()),
            data: data.to_string(),
        }
    }

    fn run_json(status: &str) -> serde_json::Value {
        json!({"id": "run_1", "thread_id": "thread_1", "status": status, "object": "thread.run"})
    }

    #[test]
    fn decodes_requires_action() {
        let mut data = run_json("requires_action");
        data["required_action"] = json!({
            "type": "submit_tool_outputs",
            "submit_tool_outputs": {"tool_calls": [
                {"id": "call_1", "type": "function",
                 "function": {"name": "fetch_current_temperature", "arguments": ""}}
            ]}
        });

        let event = decode_frame(&frame("thread.run.requires_action", data)).unwrap();
        assert_eq!(
            event,
            RunEvent::RequiresAction {
                run: RunHandle::new("thread_1", "run_1"),
                tool_calls: vec![RawToolCall::function(
                    "call_1",
                    "fetch_current_temperature",
                    ""
                )],
            }
        );
    }

    #[test]
    fn requires_action_without_calls_is_a_violation() {
        let err = decode_frame(&frame("thread.run.requires_action", run_json("requires_action")))
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[test]
    fn decodes_run_status_with_failure_reason() {
        let mut data = run_json("failed");
        data["last_error"] = json!({"code": "server_error", "message": "boom"});
        let event = decode_frame(&frame("thread.run.failed", data)).unwrap();
        assert_eq!(
            event,
            RunEvent::RunStatus {
                run: RunHandle::new("thread_1", "run_1"),
                status: RunStatus::Failed,
                error: Some("server_error: boom".into()),
            }
        );
    }

    #[test]
    fn step_and_unknown_events_are_other() {
        let step = frame("thread.run.step.created", json!({"id": "step_1"}));
        let event = decode_frame(&step).unwrap();
        assert_eq!(
            event,
            RunEvent::Other {
                name: "thread.run.step.created".into()
            }
        );
        let event = decode_frame(&frame("thread.run.created", run_json("something_new"))).unwrap();
        assert!(matches!(event, RunEvent::Other { .. }));
    }

    #[test]
    fn decodes_message_text() {
        let delta = json!({"id": "msg_1", "delta": {"content": [
            {"index": 0, "type": "text", "text": {"value": "32 deg"}}
        ]}});
        assert_eq!(
            decode_frame(&frame("thread.message.delta", delta)).unwrap(),
            RunEvent::MessageDelta {
                text: "32 deg".into()
            }
        );

        let done = json!({"id": "msg_1", "content": [
            {"type": "text", "text": {"value": "32 degrees", "annotations": []}},
            {"type": "image_file", "image_file": {"file_id": "f"}}
        ]});
        assert_eq!(
            decode_frame(&frame("thread.message.completed", done)).unwrap(),
            RunEvent::MessageCompleted {
                text: "32 degrees".into()
            }
        );
    }

    #[test]
    fn decodes_done_and_error() {
        let done = SseFrame {
            event: Some("done".into()),
            data: "[DONE]".into(),
        };
        assert_eq!(decode_frame(&done).unwrap(), RunEvent::Done);

        let error = frame("error", json!({"code": "server_error", "message": "oops"}));
        assert_eq!(
            decode_frame(&error).unwrap(),
            RunEvent::Error {
                message: "server_error: oops".into()
            }
        );
    }

    #[test]
    fn malformed_payload_is_a_violation() {
        let bad = SseFrame {
            event: Some("thread.run.completed".into()),
            data: "{not json".into(),
        };
        assert!(matches!(decode_frame(&bad), Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, String::new()).is_transient());
    }

    #[test]
    fn submit_url_targets_the_run() {
        let remote = OpenAiRemote::builder("sk-test")
            .base_url("http://localhost:8080/v1/")
            .build();
        assert_eq!(
            remote.submit_url(&RunHandle::new("thread_1", "run_1")),
            "http://localhost:8080/v1/threads/thread_1/runs/run_1/submit_tool_outputs"
        );
        assert_eq!(remote.to_string(), "openai(http://localhost:8080/v1)");
    }

    #[tokio::test]
    async fn body_chunks_become_events() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"event: thread.run.completed\ndata: ".to_vec()),
            Ok(run_json("completed").to_string().into_bytes()),
            Ok(b"\n\nevent: done\ndata: [DONE]".to_vec()),
        ];
        let events: Vec<_> = frame_stream(stream::iter(chunks)).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            Ok(RunEvent::RunStatus { status: RunStatus::Completed, .. })
        ));
        assert!(matches!(&events[1], Ok(RunEvent::Done)));
    }

    #[tokio::test]
    async fn transport_errors_end_the_stream() {
        let chunks: Vec<std::result::Result<Vec<u8>, std::io::Error>> =
            vec![Err(std::io::Error::other("reset"))];
        let events: Vec<_> = frame_stream(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Err(Error::StreamInterrupted(_))));
        assert_eq!(
            events[0].as_ref().unwrap_err().stage(),
            crate::Stage::Dispatch
        );
    }
}
