//! MQTT v5 implementation of the [`Broker`](crate::transport::Broker) trait.
//!
//! Durability model: QoS 1 publishes into a persistent session
//! (`clean_start = false` with a session expiry interval), manual
//! acknowledgment on the consumer side. A message is acked only after
//! its decoded value has been handed to the bounded consumer channel;
//! leaving a message unacked is the negative acknowledgment - the
//! broker redelivers it when the session resumes.

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttBroker;
