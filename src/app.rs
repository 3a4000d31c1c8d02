//! Application Coordinator
//!
//! Wires configuration, ingestion and the worker pool together: backlog
//! scan first, then (when monitoring) the live watcher until Ctrl-C, then
//! an orderly pool shutdown that lets queued samples finish.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::ingest::scanner::{enqueue_backlog, ArtifactMatcher};
use crate::ingest::watcher::DirectoryWatcher;
use crate::ingest::WorkQueue;
use crate::pipeline::worker::{PoolSummary, WorkerPool};
use crate::pipeline::Pipeline;
use crate::storage::table::TableWriter;
use crate::vision::Collaborators;

/// Main application coordinator
pub struct Postprocessor {
    config: Arc<AppConfig>,
    matcher: ArtifactMatcher,
    queue: WorkQueue,
    pipeline: Arc<Pipeline>,
}

impl Postprocessor {
    /// Coordinator using the external recognizers named in `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config);
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        let matcher = ArtifactMatcher::new(&config.sampleformat.recognize_by_filename_pattern)?;
        let table = match &config.output.table_path {
            Some(path) => Some(Arc::new(
                TableWriter::open(path).with_context(|| format!("Failed to open output table {:?}", path))?,
            )),
            None => None,
        };

        let config = Arc::new(config);
        let pipeline = Arc::new(Pipeline::new(config.clone(), collaborators, table));
        Ok(Self {
            config,
            matcher,
            queue: WorkQueue::new(),
            pipeline,
        })
    }

    /// Process the backlog and, when monitoring, new samples until Ctrl-C
    pub fn run(self) -> Result<PoolSummary> {
        let root = &self.config.basic.main_data_directory;
        let pp = &self.config.postprocessor;
        if !root.is_dir() {
            bail!("Data directory {:?} does not exist", root);
        }
        info!(
            "Postprocessing {:?} as {:?} with {} workers",
            root, self.config.sampleformat.datatype_to_load, pp.workers
        );

        let pool = WorkerPool::start(pp.workers, self.pipeline.clone(), self.queue.clone())?;
        if pp.process_existing {
            enqueue_backlog(root, &self.matcher, &self.queue);
        }

        if pp.monitor {
            let watcher = DirectoryWatcher::start(root, self.matcher.clone(), self.queue.clone())?;
            info!("Monitoring for new samples, press Ctrl-C to stop");
            wait_for_interrupt()?;
            info!("Interrupted, no longer watching {:?}", watcher.root());
            drop(watcher);
        }

        info!("Waiting for {} queued samples", self.queue.len());
        Ok(pool.shutdown())
    }
}

fn wait_for_interrupt() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to listen for Ctrl-C")
}
