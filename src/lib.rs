//! linecut - Distributed line processing
//!
//! A distributed, fault-tolerant take on `cut`-style field extraction.
//! An input stream is split into order-numbered chunks, each chunk is
//! shipped as a task through a durable MQTT queue to a pool of
//! independent workers, and a coordinator reassembles the accepted
//! results into ordered output under a quorum acceptance policy.
//!
//! # Overview
//!
//! The crate is organized around four components:
//! - [`processor::LineProcessor`] - the pure per-line field extraction
//! - [`transport::Broker`] - durable, at-least-once task/result transport
//! - [`worker::Worker`] - a pool of concurrent task pullers
//! - [`coordinator::Coordinator`] - split, publish, collect, quorum, assemble
//!
//! The coordinator and workers never talk to each other directly; the
//! broker is the only shared resource between them.
//!
//! # Quick Start
//!
//! ```rust
//! use linecut::processor::{parse_fields, LineProcessor};
//!
//! let fields = parse_fields("1,3").unwrap();
//! let processor = LineProcessor::new(",", fields, false).unwrap();
//!
//! let out = processor.process_line("a,b,c").unwrap();
//! assert_eq!(out.as_deref(), Some("a,c"));
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod processor;
pub mod protocol;
pub mod testing;
pub mod transport;
pub mod worker;

pub use config::AppConfig;
pub use coordinator::Coordinator;
pub use error::{CutError, CutResult};
pub use processor::{parse_fields, LineProcessor};
pub use protocol::{ResultMessage, TaskMessage};
pub use transport::{Broker, BrokerError};
pub use worker::Worker;
