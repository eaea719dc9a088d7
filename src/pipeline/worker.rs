//! Converter worker loop.
//!
//! Each worker pulls jobs from the shared queue with a private converter
//! instance it owns for its whole lifetime, and stops after consuming
//! exactly one sentinel. Every dequeued item is acknowledged, on success
//! and failure paths alike; an unacknowledged item would keep the
//! dispatcher's `join` pending forever.

use snafu::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::convert::Convert;
use crate::emit;
use crate::error::{ConvertError, RemoveInputSnafu};
use crate::metrics::events::{ConversionCompleted, FailureStage, JobFailed, JobProcessed, JobStatus};
use crate::queue::JoinableQueue;

use super::{Job, job_key};

/// Per-worker counts, returned to the dispatcher when the worker stops.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct WorkerStats {
    pub converted: usize,
    pub failed: usize,
}

/// Run one converter worker until it consumes a sentinel.
pub(super) async fn run_worker<C: Convert>(
    index: usize,
    jobs: Arc<JoinableQueue<Job>>,
    failures: Arc<JoinableQueue<String>>,
    converter: C,
    sheets: Vec<u32>,
) -> WorkerStats {
    debug!(worker = index, "Worker started");
    let mut stats = WorkerStats::default();

    loop {
        match jobs.dequeue().await {
            Job::Quit => {
                debug!(worker = index, "Sentinel received, stopping");
                jobs.acknowledge();
                break;
            }
            Job::Convert { input, output } => {
                info!(worker = index, input = %input.display(), "Converting");
                match convert_one(&converter, &sheets, &input, &output).await {
                    Ok(()) => {
                        stats.converted += 1;
                        emit!(JobProcessed {
                            status: JobStatus::Success
                        });
                    }
                    Err(e) => {
                        stats.failed += 1;
                        warn!(worker = index, input = %input.display(), "Conversion failed: {e}");
                        emit!(JobProcessed {
                            status: JobStatus::Failed
                        });
                        emit!(JobFailed {
                            stage: FailureStage::Convert
                        });
                        match job_key(&input) {
                            Some(key) => failures.enqueue(key.to_string()),
                            // Enqueue guarantees a UTF-8 stem, so this is
                            // unreachable; losing the record beats losing ack.
                            None => warn!(worker = index, "Failed job has no key, not recorded"),
                        }
                    }
                }
                // Both outcomes converge here; the item is acknowledged no
                // matter how conversion went.
                jobs.acknowledge();
            }
        }
    }

    stats
}

/// Convert one job and consume its source artifact.
async fn convert_one<C: Convert>(
    converter: &C,
    sheets: &[u32],
    input: &Path,
    output: &Path,
) -> Result<(), ConvertError> {
    let start = Instant::now();
    converter.convert(input, sheets, output).await?;
    // The source is consumed once the document exists.
    tokio::fs::remove_file(input)
        .await
        .context(RemoveInputSnafu { path: input })?;
    emit!(ConversionCompleted {
        duration: start.elapsed()
    });
    Ok(())
}
