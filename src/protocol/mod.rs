//! Wire protocol for the task and result channels.
//!
//! Message bodies are JSON; the field names are fixed by the wire
//! format and shared by every producer and consumer on the queue.

pub mod messages;
pub mod topics;

pub use messages::{ResultMessage, TaskMessage};
