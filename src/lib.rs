//! sheetpress: a batch pipeline converting spreadsheet job sheets to PDF.
//!
//! This library provides components for discovering spreadsheet job
//! descriptions, converting each to a fixed-layout PDF through an external
//! office application, and replicating extracted program fields into a
//! relational store. Jobs that fail conversion are quarantined in a durable
//! failure ledger so a later run can retry exactly the failures.
//!
//! # Example
//!
//! ```ignore
//! use sheetpress::{Config, RunMode, run_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sheetpress::PipelineError> {
//!     let config = Config::from_file("setting.yaml")?;
//!     let stats = run_pipeline(config, RunMode::Full).await?;
//!     println!("Converted {} jobs", stats.converted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod sink;

// Re-export main types
pub use config::Config;
pub use error::PipelineError;
pub use ledger::FailureLedger;
pub use pipeline::{Dispatcher, Job, PipelineStats, RunMode, job_key, run_pipeline};
pub use queue::JoinableQueue;
