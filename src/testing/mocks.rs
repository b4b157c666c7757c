//! In-memory broker for exercising coordinator and worker logic
//! without a live MQTT broker.

use crate::protocol::{ResultMessage, TaskMessage};
use crate::transport::{Broker, BrokerError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};

/// In-memory [`Broker`] with two unbounded queues mirroring the task
/// and result channels. Published messages are both recorded for
/// assertions and enqueued, so a coordinator and a worker sharing one
/// mock see each other's traffic.
pub struct MockBroker {
    task_tx: Mutex<Option<mpsc::UnboundedSender<TaskMessage>>>,
    task_rx: Mutex<Option<mpsc::UnboundedReceiver<TaskMessage>>>,
    result_tx: Mutex<Option<mpsc::UnboundedSender<ResultMessage>>>,
    result_rx: Mutex<Option<mpsc::UnboundedReceiver<ResultMessage>>>,
    published_tasks: Mutex<Vec<TaskMessage>>,
    published_results: Mutex<Vec<ResultMessage>>,
    fail_publish: AtomicBool,
    closed: AtomicBool,
}

impl MockBroker {
    pub fn new() -> Self {
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        MockBroker {
            task_tx: Mutex::new(Some(task_tx)),
            task_rx: Mutex::new(Some(task_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx: Mutex::new(Some(result_rx)),
            published_tasks: Mutex::new(Vec::new()),
            published_results: Mutex::new(Vec::new()),
            fail_publish: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Make subsequent publishes fail with [`BrokerError::PublishFailed`].
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Enqueue a task without recording it as published.
    pub async fn inject_task(&self, task: TaskMessage) {
        if let Some(tx) = self.task_tx.lock().await.as_ref() {
            let _ = tx.send(task);
        }
    }

    /// Enqueue a result without recording it as published.
    pub async fn inject_result(&self, result: ResultMessage) {
        if let Some(tx) = self.result_tx.lock().await.as_ref() {
            let _ = tx.send(result);
        }
    }

    /// Close the task queue so a consuming worker's stream ends once
    /// drained.
    pub async fn close_task_stream(&self) {
        self.task_tx.lock().await.take();
    }

    /// Close the result queue so a collecting coordinator's stream ends
    /// once drained.
    pub async fn close_result_stream(&self) {
        self.result_tx.lock().await.take();
    }

    pub async fn published_tasks(&self) -> Vec<TaskMessage> {
        self.published_tasks.lock().await.clone()
    }

    pub async fn published_results(&self) -> Vec<ResultMessage> {
        self.published_results.lock().await.clone()
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::PublishFailed(Box::new(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected publish failure",
            ))));
        }
        Ok(())
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Broker for MockBroker {
    async fn publish_task(&self, task: &TaskMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.published_tasks.lock().await.push(task.clone());
        if let Some(tx) = self.task_tx.lock().await.as_ref() {
            let _ = tx.send(task.clone());
        }
        Ok(())
    }

    async fn publish_result(&self, result: &ResultMessage) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.published_results.lock().await.push(result.clone());
        if let Some(tx) = self.result_tx.lock().await.as_ref() {
            let _ = tx.send(result.clone());
        }
        Ok(())
    }

    async fn consume_tasks(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<TaskMessage>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let Some(mut queue_rx) = self.task_rx.lock().await.take() else {
            return Err(BrokerError::ConsumerActive);
        };

        let (tx, rx) = mpsc::channel(prefetch.max(1));
        tokio::spawn(async move {
            while let Some(task) = queue_rx.recv().await {
                if tx.send(task).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn consume_results(
        &self,
        prefetch: usize,
    ) -> Result<mpsc::Receiver<ResultMessage>, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        let Some(mut queue_rx) = self.result_rx.lock().await.take() else {
            return Err(BrokerError::ConsumerActive);
        };

        let (tx, rx) = mpsc::channel(prefetch.max(1));
        tokio::spawn(async move {
            while let Some(result) = queue_rx.recv().await {
                if tx.send(result).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        self.task_tx.lock().await.take();
        self.result_tx.lock().await.take();
        Ok(())
    }
}
