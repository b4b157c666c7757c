//! Coordinator: owns an end-to-end run over the pipeline.
//!
//! One run is split -> publish -> collect -> quorum check -> assemble.
//! Chunk output order follows split order, never result arrival order.
//! Assembly is best-effort: a chunk whose result is missing or errored
//! is skipped with a warning, it does not abort the run.

use crate::error::{CutError, CutResult};
use crate::protocol::{ResultMessage, TaskMessage};
use crate::transport::Broker;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// One line-aligned slice of the input, identified by its split order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpec {
    pub id: String,
    pub content: String,
}

/// Processing parameters stamped onto every task of a run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub delimiter: String,
    pub fields: Vec<i32>,
    pub suppress: bool,
}

/// Results gathered by one collection phase.
#[derive(Debug)]
pub struct Collected {
    /// Latest result per task id. Redelivery overwrites, never
    /// double-counts.
    pub results: HashMap<String, ResultMessage>,
    /// False when the deadline fired or shutdown was requested before
    /// every expected task id was seen.
    pub complete: bool,
}

/// Outcome of a quorum check that passed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuorumStats {
    pub clean: usize,
    pub errored: usize,
    pub threshold: usize,
}

/// Cumulative counters for one coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatorStats {
    pub total_tasks: u64,
    pub completed_tasks: u64,
}

pub struct Coordinator<B: Broker> {
    broker: Arc<B>,
    quorum_size: usize,
    total_tasks: AtomicU64,
    completed_tasks: AtomicU64,
}

impl<B: Broker> Coordinator<B> {
    /// `quorum_size` is accepted for forward compatibility with an
    /// N-way redundant publishing mode; the acceptance policy of this
    /// implementation is the majority threshold over distinct chunks.
    pub fn new(broker: Arc<B>, quorum_size: usize) -> Self {
        Coordinator {
            broker,
            quorum_size,
            total_tasks: AtomicU64::new(0),
            completed_tasks: AtomicU64::new(0),
        }
    }

    /// Split the input into line-aligned chunks of at most
    /// `chunk_size` bytes, except that a single line longer than the
    /// limit still becomes its own chunk. Ids are `chunk-0..` in split
    /// order; concatenating contents in id order reproduces the input.
    pub fn split_into_chunks(
        reader: impl BufRead,
        chunk_size: usize,
    ) -> CutResult<Vec<ChunkSpec>> {
        let mut chunks = Vec::new();
        let mut buffer = String::new();

        for line in reader.lines() {
            let line = line?;
            let line_len = line.len() + 1;
            if !buffer.is_empty() && buffer.len() + line_len > chunk_size {
                chunks.push(ChunkSpec {
                    id: format!("chunk-{}", chunks.len()),
                    content: std::mem::take(&mut buffer),
                });
            }
            buffer.push_str(&line);
            buffer.push('\n');
        }

        if !buffer.is_empty() {
            chunks.push(ChunkSpec {
                id: format!("chunk-{}", chunks.len()),
                content: buffer,
            });
        }

        Ok(chunks)
    }

    /// Publish one task per chunk, in chunk order, stamping every task
    /// with the run's processing parameters. The first publish failure
    /// aborts the run; there is no partial-publish continuation.
    pub async fn publish_tasks(
        &self,
        chunks: &[ChunkSpec],
        params: &RunParams,
    ) -> CutResult<()> {
        for chunk in chunks {
            let task = TaskMessage {
                id: chunk.id.clone(),
                chunk: chunk.content.clone(),
                delimiter: params.delimiter.clone(),
                fields: params.fields.clone(),
                suppress: params.suppress,
            };
            self.broker
                .publish_task(&task)
                .await
                .map_err(|source| CutError::PublishTask {
                    task_id: chunk.id.clone(),
                    source,
                })?;
            self.total_tasks.fetch_add(1, Ordering::Relaxed);
        }

        info!(count = chunks.len(), "published tasks");
        Ok(())
    }

    /// Drain the result stream until every expected task id has been
    /// seen, the deadline fires, or shutdown is requested. The partial
    /// map is returned in the latter two cases so the caller can still
    /// attempt an under-quorum assembly; an unexpected stream closure
    /// is a hard error.
    pub async fn collect_results(
        &self,
        mut results_rx: mpsc::Receiver<ResultMessage>,
        expected: usize,
        timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> CutResult<Collected> {
        let mut results: HashMap<String, ResultMessage> = HashMap::new();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while results.len() < expected {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(
                        collected = results.len(),
                        expected,
                        "collection deadline elapsed"
                    );
                    return Ok(Collected { results, complete: false });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(collected = results.len(), "collection cancelled");
                        return Ok(Collected { results, complete: false });
                    }
                }
                received = results_rx.recv() => {
                    let Some(result) = received else {
                        return Err(CutError::ResultStreamClosed);
                    };
                    debug!(
                        task_id = %result.task_id,
                        worker_id = %result.worker_id,
                        clean = result.is_clean(),
                        "received result"
                    );
                    if results.insert(result.task_id.clone(), result).is_none() {
                        self.completed_tasks.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        Ok(Collected {
            results,
            complete: true,
        })
    }

    /// Accept the run iff clean results form a strict majority of the
    /// expected task count (`expected / 2 + 1`).
    pub fn check_quorum(
        results: &HashMap<String, ResultMessage>,
        expected: usize,
    ) -> CutResult<QuorumStats> {
        let clean = results.values().filter(|r| r.is_clean()).count();
        let errored = results.len() - clean;
        let threshold = expected / 2 + 1;

        if clean >= threshold {
            Ok(QuorumStats {
                clean,
                errored,
                threshold,
            })
        } else {
            Err(CutError::QuorumNotReached {
                clean,
                expected,
                threshold,
            })
        }
    }

    /// Run the full pipeline: split, publish, collect, quorum-check,
    /// and assemble accepted outputs in original chunk order.
    ///
    /// The result stream is opened before publishing so results from
    /// fast workers cannot slip past the subscription. A collection
    /// timeout is not fatal when quorum is still reached from the
    /// partial set.
    pub async fn process_with_quorum<W: Write>(
        &self,
        reader: impl BufRead,
        writer: &mut W,
        params: &RunParams,
        chunk_size: usize,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> CutResult<QuorumStats> {
        let chunks = Self::split_into_chunks(reader, chunk_size)?;
        if chunks.is_empty() {
            return Err(CutError::NoChunks);
        }
        info!(chunks = chunks.len(), chunk_size, "split input");

        let results_rx = self.broker.consume_results(chunks.len()).await?;

        self.publish_tasks(&chunks, params).await?;

        let collected = self
            .collect_results(results_rx, chunks.len(), timeout, shutdown)
            .await?;
        if !collected.complete {
            warn!(
                collected = collected.results.len(),
                expected = chunks.len(),
                "collection incomplete, attempting assembly from partial results"
            );
        }
        if collected.results.is_empty() {
            return Err(CutError::NoResults);
        }

        let stats = Self::check_quorum(&collected.results, chunks.len())?;
        info!(
            clean = stats.clean,
            errored = stats.errored,
            threshold = stats.threshold,
            "quorum reached"
        );

        for chunk in &chunks {
            match collected.results.get(&chunk.id) {
                Some(result) if result.is_clean() => {
                    writer.write_all(result.output.as_bytes())?;
                }
                Some(result) => {
                    warn!(
                        chunk_id = %chunk.id,
                        error = result.error.as_deref().unwrap_or(""),
                        "skipping errored chunk"
                    );
                }
                None => {
                    warn!(chunk_id = %chunk.id, "skipping chunk with no result");
                }
            }
        }
        writer.flush()?;

        Ok(stats)
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            total_tasks: self.total_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
        }
    }
}
