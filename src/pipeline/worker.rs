//! Worker pool
//!
//! A fixed number of named threads pull tokens from the shared queue and
//! run each one through the pipeline. A worker exits on a shutdown
//! sentinel, or when a sample fails in a way the pipeline does not
//! anticipate.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

use super::Pipeline;
use crate::error::SampleResult;
use crate::ingest::{WorkItem, WorkQueue};

/// What the pool did before it was shut down
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    /// Samples that went through the whole pipeline
    pub processed: usize,
    /// Workers that stopped on an error or panic
    pub failed_workers: usize,
}

pub struct WorkerPool {
    queue: WorkQueue,
    handles: Vec<JoinHandle<SampleResult<usize>>>,
}

impl WorkerPool {
    /// Spawn `count` workers on `queue`
    pub fn start(count: usize, pipeline: Arc<Pipeline>, queue: WorkQueue) -> Result<Self> {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let pipeline = pipeline.clone();
            let worker_queue = queue.clone();
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || run_worker(id, &pipeline, &worker_queue))
                .with_context(|| format!("Failed to spawn worker {}", id))?;
            handles.push(handle);
        }
        info!("Started {} workers", count);
        Ok(Self { queue, handles })
    }

    /// Queue one sentinel per worker behind the pending work and wait for
    /// every worker to finish
    pub fn shutdown(self) -> PoolSummary {
        for _ in &self.handles {
            self.queue.push_shutdown();
        }

        let mut summary = PoolSummary::default();
        for (id, handle) in self.handles.into_iter().enumerate() {
            match handle.join() {
                Ok(Ok(processed)) => summary.processed += processed,
                Ok(Err(e)) => {
                    error!("Worker {} stopped on an unexpected error: {}", id, e);
                    summary.failed_workers += 1;
                }
                Err(_) => {
                    error!("Worker {} panicked", id);
                    summary.failed_workers += 1;
                }
            }
        }
        info!(
            "Workers stopped: {} samples processed, {} workers failed",
            summary.processed, summary.failed_workers
        );
        summary
    }
}

fn run_worker(id: usize, pipeline: &Pipeline, queue: &WorkQueue) -> SampleResult<usize> {
    debug!("Worker {} waiting for samples", id);
    let mut processed = 0;
    loop {
        match queue.pop() {
            WorkItem::Shutdown => {
                debug!("Worker {} exiting", id);
                return Ok(processed);
            }
            WorkItem::Sample(token) => {
                debug!("Worker {} took {:?}", id, token);
                if pipeline.process_token(&token)?.is_some() {
                    processed += 1;
                }
                info!("Sample events in process queue: {}", queue.len());
            }
        }
    }
}
