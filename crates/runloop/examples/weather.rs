//! Serve a scripted weather run end to end.
//!
//! Run with: RUST_LOG=runloop=debug cargo run --example weather

use std::sync::Arc;

use runloop::tools::{Kwargs, ToolFnError};
use runloop::{
    Param, ParamKind, RawToolCall, RunEvent, RunHandle, RunStatus, ScriptedRemote, Session,
    ToolDescriptor, ToolRegistry, ToolSchema,
};
use serde_json::{Value, json};
use storage::{EventKind, ThreadStore};
use tracing_subscriber::EnvFilter;

async fn fetch_current_temperature(_: Kwargs) -> Result<Value, ToolFnError> {
    Ok(json!("32 degrees Celsius"))
}

async fn fetch_forecast_temperature(args: Kwargs) -> Result<Value, ToolFnError> {
    let location = args
        .get("location")
        .and_then(Value::as_str)
        .ok_or("location is required")?;
    let dt = args.get("dt_str").and_then(Value::as_str).unwrap_or("today");
    Ok(json!(format!("37 degrees Celsius in {location} on {dt}")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let registry = ToolRegistry::from_tools([
        ToolDescriptor::new(
            "fetch_current_temperature",
            ToolSchema::empty(),
            fetch_current_temperature,
        ),
        ToolDescriptor::new(
            "fetch_forecast_temperature",
            ToolSchema::new([
                Param::required("location", ParamKind::String).describe("City name"),
                Param::optional("dt_str", ParamKind::String).describe("Date, e.g. 2024-06-01"),
            ]),
            fetch_forecast_temperature,
        ),
    ])?;

    let run = RunHandle::new("thread_demo", "run_demo");
    let remote = ScriptedRemote::new().then_stream(vec![
        RunEvent::RunStatus {
            run: run.clone(),
            status: RunStatus::InProgress,
            error: None,
        },
        RunEvent::MessageCompleted {
            text: "It is 32 degrees Celsius now; tomorrow Lisbon reaches 37.".into(),
        },
        RunEvent::RunStatus {
            run: run.clone(),
            status: RunStatus::Completed,
            error: None,
        },
        RunEvent::Done,
    ]);

    let mut session = Session::new(
        "thread_demo",
        ThreadStore::in_memory()?,
        Arc::new(registry),
        Arc::new(remote),
    );
    session.say("How warm is it now, and tomorrow in Lisbon?")?;

    let initial = ScriptedRemote::stream(vec![
        RunEvent::RunStatus {
            run: run.clone(),
            status: RunStatus::Queued,
            error: None,
        },
        RunEvent::RequiresAction {
            run,
            tool_calls: vec![
                RawToolCall::function("call_1", "fetch_current_temperature", ""),
                RawToolCall::function(
                    "call_2",
                    "fetch_forecast_temperature",
                    r#"{"location": "Lisbon", "dt_str": "tomorrow"}"#,
                ),
            ],
        },
    ]);

    let state = session.run_turn(initial).await?;
    println!("Assistant: {}", state.message().unwrap_or("(no reply)"));

    println!("\nThread log:");
    for event in session.history()? {
        match event.kind {
            EventKind::Message { role, content } => println!("  {role:?}: {content}"),
            EventKind::ToolCall {
                call_id,
                name,
                arguments,
            } => println!("  call {call_id}: {name}({arguments})"),
            EventKind::ToolResult {
                call_id, output, ..
            } => println!("  result {call_id}: {output}"),
            EventKind::RunEnd { status, .. } => println!("  run ended: {status}"),
        }
    }

    Ok(())
}
