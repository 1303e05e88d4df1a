//! Local tools: registry, argument decoding and invocation.

mod decode;
pub mod errors;
mod invoke;
mod outcome;
mod registry;
mod types;

pub use decode::decode_arguments;
pub use errors::ToolError;
pub use invoke::{display_string, execute_call, invoke};
pub use outcome::ToolOutcome;
pub use registry::ToolRegistry;
pub use types::{Kwargs, Param, ParamKind, ToolDescriptor, ToolFnError, ToolFunction, ToolSchema};
