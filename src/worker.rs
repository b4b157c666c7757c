//! Worker: a bounded pool of pullers draining the task stream.
//!
//! One task never aborts the worker, and one bad line never aborts its
//! task: per-line failures are logged and skipped, and every task gets
//! exactly one published result.

use crate::error::CutResult;
use crate::processor::LineProcessor;
use crate::protocol::{ResultMessage, TaskMessage};
use crate::transport::Broker;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cumulative counters for one worker instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

pub struct Worker<B: Broker> {
    id: String,
    threads: usize,
    prefetch: usize,
    broker: Arc<B>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl<B: Broker + 'static> Worker<B> {
    /// `id` defaults to `worker-<uuid>` when not configured.
    pub fn new(broker: Arc<B>, id: Option<String>, threads: usize, prefetch: usize) -> Self {
        Worker {
            id: id.unwrap_or_else(|| format!("worker-{}", Uuid::new_v4().simple())),
            threads: threads.max(1),
            prefetch: prefetch.max(1),
            broker,
            processed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Run `threads` pullers over one shared task stream until the
    /// stream closes or shutdown is signalled. Blocks until every
    /// puller has exited.
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> CutResult<()> {
        let tasks_rx = self.broker.consume_tasks(self.prefetch).await?;
        let tasks_rx = Arc::new(Mutex::new(tasks_rx));

        info!(worker_id = %self.id, threads = self.threads, "worker started");

        let mut pullers = Vec::with_capacity(self.threads);
        for puller in 0..self.threads {
            let tasks_rx = tasks_rx.clone();
            let broker = self.broker.clone();
            let worker_id = self.id.clone();
            let processed = self.processed.clone();
            let failed = self.failed.clone();
            let mut shutdown = shutdown.clone();

            pullers.push(tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = tasks_rx.lock().await;
                        tokio::select! {
                            _ = shutdown.changed() => {
                                if *shutdown.borrow() {
                                    debug!(puller, "shutdown signal received");
                                    break;
                                }
                                continue;
                            }
                            received = rx.recv() => match received {
                                Some(task) => task,
                                None => {
                                    debug!(puller, "task stream closed");
                                    break;
                                }
                            }
                        }
                    };

                    let result = process_task(&task, &worker_id);
                    if result.is_clean() {
                        processed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            puller,
                            task_id = %task.id,
                            error = result.error.as_deref().unwrap_or(""),
                            "task failed"
                        );
                    }

                    if let Err(e) = broker.publish_result(&result).await {
                        error!(puller, task_id = %task.id, error = %e, "failed to publish result");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }));
        }

        for puller in pullers {
            if let Err(e) = puller.await {
                error!(error = %e, "puller task panicked");
            }
        }

        info!(
            worker_id = %self.id,
            processed = self.processed.load(Ordering::Relaxed),
            failed = self.failed.load(Ordering::Relaxed),
            "worker stopped"
        );
        Ok(())
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Process one task into exactly one result.
///
/// A line that fails processing is logged and skipped; only a setup
/// failure (bad delimiter or field set) marks the result as errored.
/// An all-failed task is still a clean result with empty output.
pub fn process_task(task: &TaskMessage, worker_id: &str) -> ResultMessage {
    let processor = match LineProcessor::new(&task.delimiter, task.fields.clone(), task.suppress)
    {
        Ok(processor) => processor,
        Err(e) => {
            return ResultMessage {
                task_id: task.id.clone(),
                output: String::new(),
                worker_id: worker_id.to_string(),
                error: Some(e.to_string()),
            };
        }
    };

    let mut outputs = Vec::new();
    for line in task.chunk.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match processor.process_line(line) {
            Ok(Some(output)) => outputs.push(output),
            Ok(None) => {}
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "skipping line");
            }
        }
    }

    let mut output = outputs.join("\n");
    if !output.is_empty() {
        output.push('\n');
    }

    ResultMessage {
        task_id: task.id.clone(),
        output,
        worker_id: worker_id.to_string(),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockBroker;
    use std::time::Duration;

    fn task(id: &str, chunk: &str, fields: Vec<i32>) -> TaskMessage {
        TaskMessage {
            id: id.to_string(),
            chunk: chunk.to_string(),
            delimiter: ",".to_string(),
            fields,
            suppress: false,
        }
    }

    #[test]
    fn test_process_task_extracts_fields() {
        let result = process_task(&task("chunk-0", "a,b,c\n1,2,3\n", vec![1, 3]), "w");
        assert_eq!(result.task_id, "chunk-0");
        assert_eq!(result.output, "a,c\n1,3\n");
        assert!(result.is_clean());
    }

    #[test]
    fn test_process_task_skips_blank_lines() {
        let result = process_task(&task("chunk-0", "a,b\n\n  \nc,d\n", vec![1]), "w");
        assert_eq!(result.output, "a\nc\n");
    }

    #[test]
    fn test_process_task_skips_bad_lines_without_failing() {
        // Field index 0 is invalid at process time; both lines fail,
        // yet the task result stays clean with empty output.
        let result = process_task(&task("chunk-0", "a,b\nc,d\n", vec![0]), "w");
        assert!(result.is_clean());
        assert_eq!(result.output, "");
    }

    #[test]
    fn test_process_task_setup_failure_sets_error() {
        let mut bad = task("chunk-0", "a,b\n", vec![]);
        bad.fields = Vec::new();
        let result = process_task(&bad, "w");
        assert!(!result.is_clean());
        assert!(result.error.is_some());
    }

    #[test]
    fn test_process_task_suppression_omits_lines() {
        let mut t = task("chunk-0", "a,b\nnodelim\nc,d\n", vec![1]);
        t.suppress = true;
        let result = process_task(&t, "w");
        assert_eq!(result.output, "a\nc\n");
    }

    #[tokio::test]
    async fn test_worker_default_id() {
        let broker = Arc::new(MockBroker::new());
        let worker = Worker::new(broker, None, 2, 10);
        assert!(worker.id().starts_with("worker-"));
    }

    #[tokio::test]
    async fn test_worker_processes_tasks_and_publishes_results() {
        let broker = Arc::new(MockBroker::new());
        broker
            .inject_task(task("chunk-0", "a,b,c\n", vec![2]))
            .await;
        broker
            .inject_task(task("chunk-1", "1,2,3\n", vec![2]))
            .await;
        broker.close_task_stream().await;

        let worker = Worker::new(broker.clone(), Some("worker-0".to_string()), 3, 10);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        worker.start(shutdown_rx).await.unwrap();

        let mut results = broker.published_results().await;
        results.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].output, "b\n");
        assert_eq!(results[1].output, "2\n");
        assert!(results.iter().all(|r| r.worker_id == "worker-0"));
        assert_eq!(worker.stats().processed, 2);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let broker = Arc::new(MockBroker::new());
        let worker = Arc::new(Worker::new(broker, Some("worker-0".to_string()), 2, 10));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.start(shutdown_rx).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop after shutdown")
            .unwrap()
            .unwrap();
    }
}
