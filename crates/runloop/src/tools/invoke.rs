//! Tool execution with failure capture.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Kwargs, ToolDescriptor, ToolError, ToolOutcome, decode_arguments};
use crate::run::PendingToolCall;

/// Decode a pending call's arguments and run it.
///
/// Decoding failures are reported as that call's outcome; they do not
/// affect other calls of the batch.
pub async fn execute_call(
    descriptor: &ToolDescriptor,
    call: &PendingToolCall,
    timeout: Option<Duration>,
) -> ToolOutcome {
    match decode_arguments(&call.arguments, descriptor.schema()) {
        Ok(kwargs) => invoke(descriptor, &call.id, kwargs, timeout).await,
        Err(error) => {
            warn!(call_id = %call.id, tool = %call.name, %error, "rejected tool arguments");
            ToolOutcome::failure(&call.id, error)
        }
    }
}

/// Run a tool with already-validated arguments.
///
/// Errors and panics raised by the tool become a failure outcome.
pub async fn invoke(
    descriptor: &ToolDescriptor,
    call_id: &str,
    kwargs: Kwargs,
    timeout: Option<Duration>,
) -> ToolOutcome {
    debug!(call_id, tool = descriptor.name(), "invoking tool");

    let call = AssertUnwindSafe(descriptor.function().call(kwargs)).catch_unwind();
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                let millis = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                warn!(call_id, tool = descriptor.name(), millis, "tool timed out");
                return ToolOutcome::failure(call_id, ToolError::Timeout(millis));
            }
        },
        None => call.await,
    };

    match result {
        Ok(Ok(value)) => ToolOutcome::success(call_id, display_string(value)),
        Ok(Err(e)) => {
            warn!(call_id, tool = descriptor.name(), error = %e, "tool failed");
            ToolOutcome::failure(call_id, ToolError::Execution(e.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(call_id, tool = descriptor.name(), %message, "tool panicked");
            ToolOutcome::failure(call_id, ToolError::Execution(message))
        }
    }
}

/// Render a tool's return value the way the remote protocol expects it.
pub fn display_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("tool panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("tool panicked: {s}")
    } else {
        "tool panicked".to_string()
    }
}
