//! Pure event routing and message decoding for the MQTT event loop.

use crate::protocol::{ResultMessage, TaskMessage};
use rumqttc::v5::mqttbytes::v5::{Packet, Publish};
use rumqttc::v5::Event;
use tokio::sync::mpsc;

/// Routing decision for one MQTT event.
#[derive(Debug)]
pub enum EventRoute {
    /// ConnAck received - ready to publish/subscribe
    ConnectionAcknowledged,
    /// Application message on a subscribed topic
    MessageReceived(Publish),
    /// Broker closed the connection
    Disconnected,
    /// Infrastructure traffic (PingResp, SubAck, outgoing packets, ...)
    Infrastructure,
}

/// Classify an MQTT event (pure function).
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => match incoming {
            Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
            Packet::Publish(publish) => EventRoute::MessageReceived(publish.clone()),
            Packet::Disconnect(_) => EventRoute::Disconnected,
            _ => EventRoute::Infrastructure,
        },
        Event::Outgoing(_) => EventRoute::Infrastructure,
    }
}

/// Decode a task payload (pure function).
pub fn decode_task(payload: &[u8]) -> Result<TaskMessage, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Decode a result payload (pure function).
pub fn decode_result(payload: &[u8]) -> Result<ResultMessage, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Registry of the active consumer channels.
///
/// At most one consumer per channel; dropping the senders (via
/// [`MessageForwarder::clear`]) closes the consumer streams once any
/// in-flight cloned senders finish.
#[derive(Default)]
pub struct MessageForwarder {
    task_tx: Option<mpsc::Sender<TaskMessage>>,
    result_tx: Option<mpsc::Sender<ResultMessage>>,
}

impl MessageForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_task_consumer(&self) -> bool {
        self.task_tx.is_some()
    }

    pub fn has_result_consumer(&self) -> bool {
        self.result_tx.is_some()
    }

    pub fn set_task_sender(&mut self, sender: mpsc::Sender<TaskMessage>) {
        self.task_tx = Some(sender);
    }

    pub fn set_result_sender(&mut self, sender: mpsc::Sender<ResultMessage>) {
        self.result_tx = Some(sender);
    }

    /// Clone out the task sender so the caller can send without
    /// holding the forwarder lock across the await.
    pub fn task_sender(&self) -> Option<mpsc::Sender<TaskMessage>> {
        self.task_tx.clone()
    }

    /// Clone out the result sender; same locking contract as
    /// [`Self::task_sender`].
    pub fn result_sender(&self) -> Option<mpsc::Sender<ResultMessage>> {
        self.result_tx.clone()
    }

    /// Drop both senders, closing any active consumer streams.
    pub fn clear(&mut self) {
        self.task_tx = None;
        self.result_tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::QoS;

    #[test]
    fn test_route_publish_event() {
        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: Bytes::from("linecut/tasks"),
            pkid: 1,
            payload: Bytes::from("{}"),
            properties: None,
        };
        let event = Event::Incoming(Packet::Publish(publish));

        match route_event(&event) {
            EventRoute::MessageReceived(p) => {
                assert_eq!(&p.topic[..], b"linecut/tasks");
            }
            other => panic!("expected MessageReceived, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_task_rejects_malformed_payload() {
        assert!(decode_task(b"not json").is_err());
        assert!(decode_task(b"{\"id\": 42}").is_err());
    }

    #[test]
    fn test_decode_task_accepts_wire_format() {
        let payload =
            br#"{"id":"chunk-0","chunk":"a,b\n","delimiter":",","fields":[1],"suppress":false}"#;
        let task = decode_task(payload).unwrap();
        assert_eq!(task.id, "chunk-0");
        assert_eq!(task.fields, vec![1]);
    }

    #[test]
    fn test_forwarder_without_consumer_has_no_sender() {
        let forwarder = MessageForwarder::new();
        assert!(forwarder.task_sender().is_none());
        assert!(forwarder.result_sender().is_none());
    }

    #[tokio::test]
    async fn test_forwarder_hands_off_and_clear_closes_stream() {
        let mut forwarder = MessageForwarder::new();
        let (tx, mut rx) = mpsc::channel(1);
        forwarder.set_result_sender(tx);
        assert!(forwarder.has_result_consumer());

        let result = ResultMessage {
            task_id: "chunk-1".to_string(),
            output: "x\n".to_string(),
            worker_id: "worker-0".to_string(),
            error: None,
        };
        let sender = forwarder.result_sender().unwrap();
        sender.send(result.clone()).await.unwrap();
        drop(sender);
        assert_eq!(rx.recv().await, Some(result));

        forwarder.clear();
        assert_eq!(rx.recv().await, None);
    }
}
