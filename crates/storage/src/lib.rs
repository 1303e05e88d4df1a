//! SQLite-backed thread history for Hawser.
//!
//! The tool loop itself is stateless; this crate is the message store it
//! reports into. Every user message, tool call, submitted tool output, final
//! assistant message and run outcome is appended to a per-thread log.
//!
//! # Core Concepts
//!
//! ## ThreadStore
//!
//! The [`ThreadStore`] wraps a SQLite database. Events are append-only and
//! come back in the order they were written.
//!
//! ## Event
//!
//! An [`Event`] has a unique ID, the [`ThreadId`] it belongs to, a timestamp,
//! and an [`EventKind`]:
//! - `Message`: user, assistant or system text
//! - `ToolCall` / `ToolResult`: one tool exchange of a run
//! - `RunEnd`: how a run finished
//!
//! ## ThreadId
//!
//! Thread ids are assigned by the remote assistant service and stored as
//! opaque strings.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Role, ThreadId, ThreadStore};
//!
//! let store = ThreadStore::open("threads.db")?;
//! let thread = ThreadId::from("thread_abc123");
//!
//! store.save_message(&thread, Role::User, "What's the temperature?")?;
//! store.save_message(&thread, Role::Assistant, "32 degrees Celsius.")?;
//!
//! for event in store.load_thread(&thread)? {
//!     println!("{}: {:?}", event.timestamp, event.kind);
//! }
//!
//! for summary in store.list_threads()? {
//!     println!("{}: {} messages", summary.id, summary.message_count);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, Role, ThreadId};
pub use store::{ThreadStore, ThreadSummary};
