//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the corresponding
//! Prometheus metric.

use metrics::{counter, gauge, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Outcome of a discovered job.
#[derive(Debug, Clone, Copy)]
pub enum JobStatus {
    Success,
    Skipped,
    Failed,
}

impl JobStatus {
    fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Skipped => "skipped",
            JobStatus::Failed => "failed",
        }
    }
}

/// Stage at which a job failure occurred.
#[derive(Debug, Clone, Copy)]
pub enum FailureStage {
    Extract,
    Sink,
    Convert,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Extract => "extract",
            FailureStage::Sink => "sink",
            FailureStage::Convert => "convert",
        }
    }
}

/// Event emitted when a job finishes (in any state).
pub struct JobProcessed {
    pub status: JobStatus,
}

impl InternalEvent for JobProcessed {
    fn emit(self) {
        trace!(status = self.status.as_str(), "Job processed");
        counter!("sheetpress_jobs_processed_total", "status" => self.status.as_str()).increment(1);
    }
}

/// Event emitted when a job fails at some stage.
pub struct JobFailed {
    pub stage: FailureStage,
}

impl InternalEvent for JobFailed {
    fn emit(self) {
        trace!(stage = self.stage.as_str(), "Job failed");
        counter!("sheetpress_jobs_failed_total", "stage" => self.stage.as_str()).increment(1);
    }
}

/// Event emitted when a conversion completes successfully.
pub struct ConversionCompleted {
    pub duration: Duration,
}

impl InternalEvent for ConversionCompleted {
    fn emit(self) {
        histogram!("sheetpress_conversion_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when the collector persists a failure record.
pub struct FailureRecorded;

impl InternalEvent for FailureRecorded {
    fn emit(self) {
        counter!("sheetpress_failures_recorded_total").increment(1);
    }
}

/// Event tracking the number of unacknowledged jobs in the queue.
pub struct QueueDepth {
    pub count: usize,
}

impl InternalEvent for QueueDepth {
    fn emit(self) {
        gauge!("sheetpress_job_queue_depth").set(self.count as f64);
    }
}
