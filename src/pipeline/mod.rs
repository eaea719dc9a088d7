//! Job distribution and failure-isolation pipeline.
//!
//! The dispatcher discovers job workbooks, filters them against the failure
//! ledger in retry mode, stages and enqueues work, and coordinates shutdown:
//! exactly one sentinel per worker, a `join` on each queue, and a hard stop
//! of the failure collector only after both queues have drained.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher -> Job Queue -> Converter Workers -> Failure Queue
//!                                                      |
//!                                  Failure Collector <-+-> Failure Ledger
//! ```
//!
//! Workers and the collector communicate exclusively through the two
//! queues; no other mutable state crosses task boundaries.

mod collector;
mod worker;

use snafu::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::convert::{Convert, OfficeConverter};
use crate::emit;
use crate::error::{
    ConverterSetupSnafu, CopyWorkbookSnafu, CreateDirSnafu, DiscoverSnafu, ExtractSnafu,
    LedgerError, LedgerSnafu, MissingFieldSnafu, MissingLedgerSnafu, PipelineError,
    PrepareJobDirSnafu, SinkSetupSnafu, StageError,
};
use crate::extract::{JobRecords, ReadJob, WorkbookReader, category_of};
use crate::ledger::FailureLedger;
use crate::metrics::events::{FailureStage, JobFailed, JobProcessed, JobStatus, QueueDepth};
use crate::queue::JoinableQueue;
use crate::sink::{RecordSink, SqlRecordSink};

use collector::run_collector;
use worker::run_worker;

/// Which jobs a run processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Process every discovered job.
    Full,
    /// Process only jobs recorded in the failure ledger of a prior run.
    RetryFailed,
}

/// One unit of conversion work, or the sentinel stopping a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Convert { input: PathBuf, output: PathBuf },
    Quit,
}

/// Stable identity of a job: the input's base name without extension.
pub fn job_key(path: &Path) -> Option<&str> {
    path.file_stem()?.to_str()
}

/// Statistics about the pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Inputs found in the input folder.
    pub discovered: usize,
    /// Inputs not in the retry set (retry mode only).
    pub filtered: usize,
    /// Inputs skipped during staging (validation or I/O).
    pub skipped: usize,
    /// Jobs handed to the workers.
    pub enqueued: usize,
    /// Jobs converted successfully.
    pub converted: usize,
    /// Jobs routed to the failure ledger.
    pub failed: usize,
}

/// Orchestrates one pipeline run.
pub struct Dispatcher<R, S> {
    config: Config,
    mode: RunMode,
    reader: R,
    sink: Option<S>,
}

impl<R: ReadJob, S: RecordSink> Dispatcher<R, S> {
    /// Create a dispatcher with the given collaborators.
    pub fn new(config: Config, mode: RunMode, reader: R, sink: Option<S>) -> Self {
        Self {
            config,
            mode,
            reader,
            sink,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// Takes one converter per worker; each worker owns its converter for
    /// the whole run.
    pub async fn run<C: Convert>(self, converters: Vec<C>) -> Result<PipelineStats, PipelineError> {
        let worker_count = converters.len();
        info!(workers = worker_count, mode = ?self.mode, "Starting pipeline");

        let output_root = self.config.output.folder_path.clone();
        tokio::fs::create_dir_all(&output_root)
            .await
            .context(CreateDirSnafu { path: &output_root })?;

        let ledger = FailureLedger::new(&self.config.ledger.path);
        let retry_keys = self.prepare_ledger(&ledger).await.context(LedgerSnafu)?;

        let jobs = Arc::new(JoinableQueue::new());
        let failures = Arc::new(JoinableQueue::new());

        let mut workers = Vec::with_capacity(worker_count);
        for (index, converter) in converters.into_iter().enumerate() {
            workers.push(tokio::spawn(run_worker(
                index,
                jobs.clone(),
                failures.clone(),
                converter,
                self.config.pdf.sheets.clone(),
            )));
        }
        let collector = tokio::spawn(run_collector(failures.clone(), ledger));

        let mut stats = PipelineStats::default();
        for input in self.discover_inputs().await? {
            stats.discovered += 1;

            let Some(key) = job_key(&input).map(str::to_string) else {
                warn!(input = %input.display(), "Skipping input without a UTF-8 file stem");
                stats.skipped += 1;
                continue;
            };

            if let Some(retry) = &retry_keys {
                if !retry.contains(&key) {
                    debug!(job = %key, "Not in retry set, skipping");
                    stats.filtered += 1;
                    continue;
                }
            }

            info!(job = %key, "Staging job");
            match self.stage_job(&input, &key).await {
                Ok(output) => {
                    jobs.enqueue(Job::Convert { input, output });
                    stats.enqueued += 1;
                    emit!(QueueDepth {
                        count: jobs.unfinished()
                    });
                }
                Err(e) => {
                    // One job's staging failure never aborts the run.
                    warn!(job = %key, "Skipping job: {e}");
                    stats.skipped += 1;
                    emit!(JobProcessed {
                        status: JobStatus::Skipped
                    });
                    emit!(JobFailed {
                        stage: FailureStage::Extract
                    });
                }
            }
        }

        // One sentinel per worker, so each worker sees exactly one
        // termination signal and the queue drains deterministically.
        for _ in 0..worker_count {
            jobs.enqueue(Job::Quit);
        }

        info!("Waiting for conversions to drain");
        jobs.join().await;
        info!("Waiting for failure records to drain");
        failures.join().await;

        // Both queues have drained: every recorded failure is already on
        // disk, so a hard stop of the collector loses nothing.
        collector.abort();

        for worker in workers {
            match worker.await {
                Ok(ws) => {
                    stats.converted += ws.converted;
                    stats.failed += ws.failed;
                }
                Err(e) => error!("Worker task failed: {e}"),
            }
        }

        info!(
            discovered = stats.discovered,
            converted = stats.converted,
            failed = stats.failed,
            skipped = stats.skipped,
            "Pipeline completed"
        );
        Ok(stats)
    }

    /// Load and rotate the failure ledger according to the run mode.
    ///
    /// Returns the retry set in retry mode, `None` in full mode. Ledger I/O
    /// failure here is fatal: without the retry set the run cannot be
    /// scoped, and it must fail before any worker starts.
    async fn prepare_ledger(
        &self,
        ledger: &FailureLedger,
    ) -> Result<Option<HashSet<String>>, LedgerError> {
        match self.mode {
            RunMode::RetryFailed => {
                ensure!(
                    ledger.exists(),
                    MissingLedgerSnafu {
                        path: ledger.path()
                    }
                );
                let keys = ledger.load().await?;
                let archive = ledger.rotate().await?;
                info!(
                    retry_jobs = keys.len(),
                    archive = %archive.display(),
                    "Loaded failure ledger for retry"
                );
                Ok(Some(keys))
            }
            RunMode::Full => {
                // A leftover ledger belongs to an earlier run; archive it
                // unread so this run's failures never mix with it.
                if ledger.exists() {
                    let archive = ledger.rotate().await?;
                    info!(archive = %archive.display(), "Archived stale failure ledger");
                }
                Ok(None)
            }
        }
    }

    /// List job workbooks in the input folder, lexicographically sorted.
    async fn discover_inputs(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let folder = &self.config.input.folder_path;
        let mut entries = tokio::fs::read_dir(folder)
            .await
            .context(DiscoverSnafu { path: folder })?;

        let mut inputs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context(DiscoverSnafu { path: folder })?
        {
            let path = entry.path();
            let is_sheet = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
            if is_sheet {
                inputs.push(path);
            }
        }

        // Stable order so runs are reproducible.
        inputs.sort();
        info!(count = inputs.len(), "Discovered job workbooks");
        Ok(inputs)
    }

    /// Extract, validate, and replicate one job; prepare its output
    /// directory and return the document's target path.
    async fn stage_job(&self, input: &Path, key: &str) -> Result<PathBuf, StageError> {
        let mut records = self.reader.read(input).context(ExtractSnafu)?;

        // A job without an o-number cannot be replicated or traced back to
        // its order; it is skipped before conversion.
        ensure!(
            records.program.o_number.is_some(),
            MissingFieldSnafu { field: "o_number" }
        );
        let tooling = records
            .program
            .tooling
            .clone()
            .context(MissingFieldSnafu { field: "tooling" })?;

        let job_dir = self
            .config
            .output
            .folder_path
            .join(category_of(&tooling))
            .join(key);
        reset_dir(&job_dir)
            .await
            .context(PrepareJobDirSnafu { path: &job_dir })?;

        if let Some(name) = input.file_name() {
            let dest = job_dir.join(name);
            tokio::fs::copy(input, &dest)
                .await
                .context(CopyWorkbookSnafu { path: &dest })?;
        }

        records.program.folder_path = job_dir.display().to_string();
        self.replicate(&records).await;

        Ok(job_dir.join(format!("{key}.pdf")))
    }

    /// Replicate records through the sink, if one is configured.
    ///
    /// Replication failures are logged and never block conversion.
    async fn replicate(&self, records: &JobRecords) {
        let Some(sink) = &self.sink else {
            debug!("No record sink configured, skipping replication");
            return;
        };

        match sink.put_program(&records.program).await {
            Ok(id) => {
                if !records.tools.is_empty() {
                    if let Err(e) = sink.put_tooling(&records.tools, id).await {
                        warn!("Tooling replication failed: {e}");
                        emit!(JobFailed {
                            stage: FailureStage::Sink
                        });
                    }
                }
            }
            Err(e) => {
                warn!("Program replication failed, converting anyway: {e}");
                emit!(JobFailed {
                    stage: FailureStage::Sink
                });
            }
        }
    }
}

/// Create a directory, emptying it first if it already exists.
async fn reset_dir(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        tokio::fs::remove_dir_all(path).await?;
    }
    tokio::fs::create_dir_all(path).await
}

/// Run the pipeline with production collaborators.
pub async fn run_pipeline(config: Config, mode: RunMode) -> Result<PipelineStats, PipelineError> {
    let mut converters = Vec::with_capacity(config.pdf.processes);
    for _ in 0..config.pdf.processes {
        converters.push(
            OfficeConverter::new(&config.pdf.command, config.pdf.visible)
                .context(ConverterSetupSnafu)?,
        );
    }

    let sink = match &config.database {
        Some(db) => Some(SqlRecordSink::connect(db).await.context(SinkSetupSnafu)?),
        None => {
            info!("No database configured, record replication disabled");
            None
        }
    };

    let reader = WorkbookReader::new(config.input.sheet_name.clone());
    Dispatcher::new(config, mode, reader, sink)
        .run(converters)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_strips_extension() {
        assert_eq!(job_key(Path::new("/in/JOB-001.xlsx")), Some("JOB-001"));
        assert_eq!(job_key(Path::new("JOB-001")), Some("JOB-001"));
        assert_eq!(job_key(Path::new("/")), None);
    }

    #[tokio::test]
    async fn test_reset_dir_empties_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("job");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("stale.pdf"), "old").unwrap();

        reset_dir(&target).await.unwrap();

        assert!(target.exists());
        assert!(!target.join("stale.pdf").exists());
    }
}
