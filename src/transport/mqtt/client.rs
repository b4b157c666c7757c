//! MQTT broker client: connection lifecycle, publishing, and the event
//! loop that feeds decoded messages to consumer channels.

use super::connection::configure_mqtt_options;
use super::message_handler::{
    decode_result, decode_task, route_event, EventRoute, MessageForwarder,
};
use crate::config::BrokerSection;
use crate::protocol::{topics, ResultMessage, TaskMessage};
use crate::transport::{Broker, BrokerError, ConnectionState};
use rumqttc::v5::mqttbytes::v5::Publish;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// MQTT-backed implementation of the [`Broker`] trait.
///
/// One instance per process; the coordinator publishes tasks and
/// consumes results, workers do the reverse. Acknowledgment is fully
/// contained here: callers only ever see decoded messages.
pub struct MqttBroker {
    client: AsyncClient,
    forwarder: Arc<Mutex<MessageForwarder>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    event_loop_handle: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl MqttBroker {
    /// Connect to the broker and wait for its acknowledgment.
    ///
    /// `role` distinguishes client ids of coordinators and workers; the
    /// random suffix keeps concurrent processes from evicting each
    /// other's sessions.
    pub async fn connect(config: &BrokerSection, role: &str) -> Result<Self, BrokerError> {
        let client_id = format!("linecut-{role}-{}", Uuid::new_v4().simple());
        let mqtt_options = configure_mqtt_options(&client_id, config)?;

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let forwarder = Arc::new(Mutex::new(MessageForwarder::new()));

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            client.clone(),
            forwarder.clone(),
            state_tx,
            shutdown_rx,
        ));

        let broker = MqttBroker {
            client,
            forwarder,
            state_rx: state_rx.clone(),
            shutdown_tx,
            event_loop_handle: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        };

        Self::wait_for_connection(state_rx, CONNECT_TIMEOUT).await?;
        info!(client_id, "connected to MQTT broker");
        Ok(broker)
    }

    /// Drive the MQTT event loop until shutdown or a fatal error.
    ///
    /// Transport failure is fatal for the current run: the loop does not
    /// reconnect, it marks the state disconnected and closes any active
    /// consumer streams so collection loops observe the closure.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        client: AsyncClient,
        forwarder: Arc<Mutex<MessageForwarder>>,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("shutdown signal received, stopping MQTT event loop");
                        break;
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(event) => match route_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            let _ = state_tx.send(ConnectionState::Connected);
                        }
                        EventRoute::MessageReceived(publish) => {
                            // Detached so a slow consumer never stalls
                            // poll() and the keep-alive pings it drives.
                            // In-flight count stays bounded by the
                            // broker's receive-maximum flow control:
                            // each message is acked only after hand-off.
                            tokio::spawn(Self::handle_publish(
                                client.clone(),
                                forwarder.clone(),
                                publish,
                            ));
                        }
                        EventRoute::Disconnected => {
                            let _ = state_tx.send(ConnectionState::Disconnected(
                                "disconnected by broker".to_string(),
                            ));
                            break;
                        }
                        EventRoute::Infrastructure => {}
                    },
                    Err(e) => {
                        error!(error = %e, "MQTT event loop error, stopping");
                        let _ = state_tx.send(ConnectionState::Disconnected(e.to_string()));
                        break;
                    }
                }
            }
        }

        // Dropping the senders closes the consumer streams. Anything
        // pulled but not yet handed off stays unacked for redelivery.
        forwarder.lock().await.clear();
    }

    /// Decode an incoming publish and hand it to its consumer channel.
    ///
    /// Ack only after a successful hand-off. A payload that fails to
    /// decode is left unacked (the negative acknowledgment) and never
    /// reaches consumers: poison messages must not stall the queue.
    /// Senders are cloned out of the forwarder before the send so the
    /// forwarder lock is never held across a channel await.
    async fn handle_publish(
        client: AsyncClient,
        forwarder: Arc<Mutex<MessageForwarder>>,
        publish: Publish,
    ) {
        let topic = String::from_utf8_lossy(&publish.topic).to_string();
        let handed_off = match topic.as_str() {
            topics::TASKS => match decode_task(&publish.payload) {
                Ok(task) => {
                    let sender = forwarder.lock().await.task_sender();
                    match sender {
                        Some(tx) => tx.send(task).await.is_ok(),
                        None => false,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode task, leaving unacked for redelivery");
                    false
                }
            },
            topics::RESULTS => match decode_result(&publish.payload) {
                Ok(result) => {
                    let sender = forwarder.lock().await.result_sender();
                    match sender {
                        Some(tx) => tx.send(result).await.is_ok(),
                        None => false,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to decode result, leaving unacked for redelivery");
                    false
                }
            },
            other => {
                debug!(topic = other, "ignoring message on unexpected topic");
                false
            }
        };

        if handed_off {
            if let Err(e) = client.ack(&publish).await {
                warn!(error = %e, "failed to ack message");
            }
        }
    }

    /// Wait for the broker to confirm the connection (ConnAck), with a
    /// timeout so a dead broker fails fast instead of hanging startup.
    async fn wait_for_connection(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), BrokerError> {
        let wait = async {
            loop {
                match state_rx.borrow().clone() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(BrokerError::ConnectionFailed(reason));
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(BrokerError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ConnectionFailed(
                "timed out waiting for broker acknowledgment".to_string(),
            )),
        }
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let state = self.state_rx.borrow().clone();
        if state != ConnectionState::Connected {
            return Err(BrokerError::NotConnected { state });
        }
        Ok(())
    }

    async fn publish_json<T: serde::Serialize>(
        &self,
        topic: &str,
        message: &T,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let payload = serde_json::to_vec(message).map_err(BrokerError::Serialization)?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::PublishFailed(Box::new(e)))
    }
}

#[async_trait::async_trait]
impl Broker for MqttBroker {
    async fn publish_task(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        self.publish_json(topics::TASKS, task).await?;
        debug!(task_id = %task.id, "published task");
        Ok(())
    }

    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BrokerError> {
        self.publish_json(topics::RESULTS, result).await?;
        debug!(task_id = %result.task_id, worker_id = %result.worker_id, "published result");
        Ok(())
    }

    async fn consume_tasks(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<TaskMessage>, BrokerError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(prefetch.max(1));
        {
            let mut forwarder = self.forwarder.lock().await;
            if forwarder.has_task_consumer() {
                return Err(BrokerError::ConsumerActive);
            }
            forwarder.set_task_sender(tx);
        }

        // Shared subscription: the broker hands each task to exactly
        // one subscriber in the group, across all worker processes.
        self.client
            .subscribe(topics::shared_task_filter(), QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::SubscribeFailed(Box::new(e)))?;

        info!(prefetch, "consuming tasks");
        Ok(rx)
    }

    async fn consume_results(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<ResultMessage>, BrokerError> {
        self.ensure_open()?;

        let (tx, rx) = mpsc::channel(prefetch.max(1));
        {
            let mut forwarder = self.forwarder.lock().await;
            if forwarder.has_result_consumer() {
                return Err(BrokerError::ConsumerActive);
            }
            forwarder.set_result_sender(tx);
        }

        self.client
            .subscribe(topics::RESULTS, QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::SubscribeFailed(Box::new(e)))?;

        info!(prefetch, "consuming results");
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);
        let _ = self.client.disconnect().await;

        if let Some(handle) = self.event_loop_handle.lock().await.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => debug!("MQTT event loop shut down"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "MQTT event loop ended with error")
                }
                Err(_) => warn!("MQTT event loop did not stop in time, aborting"),
                _ => {}
            }
        }

        info!("MQTT broker closed");
        Ok(())
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        // Cannot run async close() here; just stop the background task.
        let _ = self.shutdown_tx.send(true);
    }
}
