//! Transport layer decoupling coordinator and worker lifetimes.
//!
//! The [`Broker`] trait is the only surface the coordinator and worker
//! see: decoded [`TaskMessage`]/[`ResultMessage`] values flowing through
//! bounded channels. Raw transport messages and their acknowledgment
//! never leave this layer, which keeps the quorum and assembly logic
//! testable against an in-memory mock.

use crate::protocol::{ResultMessage, TaskMessage};
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

/// Connection state of the underlying transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Attempting to connect, waiting for broker acknowledgment
    Connecting,
    /// Connected and ready for publish/consume
    Connected,
    /// Disconnected with reason; fatal for the current run
    Disconnected(String),
}

/// Transport-layer errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("publish failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("subscribe failed")]
    SubscribeFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("serialization error")]
    Serialization(#[source] serde_json::Error),

    #[error("invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("broker is closed")]
    Closed,

    #[error("not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("consumer already active for this channel")]
    ConsumerActive,
}

/// Durable, at-least-once task/result transport.
///
/// Two independent channels: a task queue load-balanced across worker
/// pullers, and a result queue drained by the coordinator. `consume_*`
/// returns a capacity-bounded channel of decoded messages; a raw
/// message is acknowledged only after its decoded value has been handed
/// to that channel, so back-pressure throttles the puller. A message
/// that fails to decode is negatively acknowledged for redelivery and
/// dropped from the stream.
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Serialize and durably enqueue one task.
    async fn publish_task(&self, task: &TaskMessage) -> Result<(), BrokerError>;

    /// Serialize and durably enqueue one result.
    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BrokerError>;

    /// Open the decoded task stream with at most `prefetch` in-flight,
    /// unacknowledged messages.
    async fn consume_tasks(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<TaskMessage>, BrokerError>;

    /// Open the decoded result stream with at most `prefetch` in-flight,
    /// unacknowledged messages.
    async fn consume_results(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<ResultMessage>, BrokerError>;

    /// Stop future publishes and consumes. Idempotent and safe to call
    /// concurrently with in-flight operations; those observe
    /// [`BrokerError::Closed`] rather than deadlocking.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Type alias for the MQTT transport.
pub type MqttTransport = mqtt::MqttBroker;
