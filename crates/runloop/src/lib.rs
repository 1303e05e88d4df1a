//! Hawser run loop: serve tool calls for remote assistant runs.
//!
//! A remote assistant run pauses whenever its model wants local tools
//! executed. This crate consumes the run's event stream, executes the
//! requested calls against a registry of local functions, submits every
//! output in a single batch and keeps consuming the resumed stream until the
//! run ends.
//!
//! # Overview
//!
//! - **ToolRegistry**: Declared tools, each a name, a parameter schema and an
//!   async function.
//! - **RunEventDispatcher**: Turns a stream of run events into "requires
//!   action", "completed" or "failed".
//! - **ToolLoop**: The fulfillment loop: execute a batch, resume, repeat.
//! - **Remote**: The service hosting runs (`OpenAiRemote`, `ScriptedRemote`).
//! - **Session**: Runs turns on a thread and records them in a `ThreadStore`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use runloop::{
//!     OpenAiRemote, Param, ParamKind, Session, ToolDescriptor, ToolRegistry, ToolSchema,
//! };
//! use storage::ThreadStore;
//!
//! # async fn example() -> runloop::Result<()> {
//! let registry = ToolRegistry::from_tools([ToolDescriptor::new(
//!     "fetch_current_temperature",
//!     ToolSchema::new([Param::optional("location", ParamKind::String)]),
//!     |_args| async { Ok(serde_json::json!("32 degrees Celsius")) },
//! )])?;
//! let remote = Arc::new(OpenAiRemote::builder("sk-...").build());
//!
//! let initial = remote.create_run(&"thread_abc".into(), "asst_abc").await?;
//! let store = ThreadStore::in_memory()?;
//! let mut session = Session::new("thread_abc", store, Arc::new(registry), remote);
//! let state = session.run_turn(initial).await?;
//! println!("{:?}", state.message());
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod remote;
pub mod run;
mod session;
pub mod tools;

// Error types
pub use error::{Error, Result, Stage};

// Configuration
pub use config::{Config, ConfigError, RemoteConfig, RetryPolicy, RunConfig};

// Remote service
pub use remote::{EventStream, OpenAiRemote, OpenAiRemoteBuilder, Remote, ScriptedRemote};

// Run loop
pub use run::{
    Dispatch, FinalRunState, PendingToolCall, RawToolCall, RunEvent, RunEventDispatcher,
    RunHandle, RunOutcome, RunProgress, RunState, RunStatus, SubmissionBatch, ToolExchange,
    ToolLoop, ToolOutput, run_tool_loop,
};

// Tools
pub use tools::{Param, ParamKind, ToolDescriptor, ToolError, ToolOutcome, ToolRegistry, ToolSchema};

// Session management
pub use session::Session;
