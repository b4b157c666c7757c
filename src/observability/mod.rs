//! Structured logging setup shared by all run modes.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
