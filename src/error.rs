//! Error types for sheetpress using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Input folder path is empty.
    #[snafu(display("Input folder path cannot be empty"))]
    EmptyInputPath,

    /// Output folder path is empty.
    #[snafu(display("Output folder path cannot be empty"))]
    EmptyOutputPath,

    /// Worker count must be positive.
    #[snafu(display("pdf.processes must be at least 1"))]
    NoWorkers,

    /// Worksheet selection is empty.
    #[snafu(display("pdf.sheets must name at least one worksheet"))]
    EmptySheetSelection,

    /// Ledger path is empty.
    #[snafu(display("Ledger path cannot be empty"))]
    EmptyLedgerPath,
}

// ============ Ledger Errors ============

/// Errors that can occur while reading or rotating the failure ledger.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LedgerError {
    /// Ledger file missing when a retry run needs it.
    #[snafu(display("No failure ledger at {}: nothing to retry", path.display()))]
    MissingLedger { path: PathBuf },

    /// Failed to read the ledger file.
    #[snafu(display("Failed to read failure ledger {}", path.display()))]
    ReadLedger {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to archive the ledger file.
    #[snafu(display("Failed to archive failure ledger {} to {}", from.display(), to.display()))]
    RotateLedger {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Failed to append a failure record.
    #[snafu(display("Failed to append to failure ledger {}", path.display()))]
    AppendLedger {
        source: std::io::Error,
        path: PathBuf,
    },
}

// ============ Converter Errors ============

/// Errors that can occur while converting a job sheet to PDF.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConvertError {
    /// Failed to create the converter's private profile directory.
    #[snafu(display("Failed to create converter profile directory"))]
    ProfileDir { source: std::io::Error },

    /// Input path has no usable file stem.
    #[snafu(display("Input path has no file stem: {}", path.display()))]
    InvalidInput { path: PathBuf },

    /// Failed to launch the converter process.
    #[snafu(display("Failed to launch converter '{command}'"))]
    Spawn {
        source: std::io::Error,
        command: String,
    },

    /// Converter exited unsuccessfully.
    #[snafu(display("Converter '{command}' failed: {detail}"))]
    Converter { command: String, detail: String },

    /// Converter reported success but produced no document.
    #[snafu(display("Converter produced no output at {}", path.display()))]
    MissingOutput { path: PathBuf },

    /// Failed to move the produced document to its target name.
    #[snafu(display("Failed to place output at {}", path.display()))]
    PlaceOutput {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to remove the consumed source artifact.
    #[snafu(display("Failed to remove converted input {}", path.display()))]
    RemoveInput {
        source: std::io::Error,
        path: PathBuf,
    },
}

// ============ Extract Errors ============

/// Errors that can occur while reading fields from a job workbook.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ExtractError {
    /// Failed to open the workbook.
    #[snafu(display("Failed to open workbook {}", path.display()))]
    OpenWorkbook {
        source: calamine::XlsxError,
        path: PathBuf,
    },

    /// The job sheet is missing from the workbook.
    #[snafu(display("Workbook {} has no sheet '{sheet}'", path.display()))]
    MissingSheet {
        source: calamine::XlsxError,
        sheet: String,
        path: PathBuf,
    },
}

// ============ Staging Errors ============

/// Errors that can occur while staging a single job.
///
/// Recovered per job at the dispatcher boundary: the job is skipped and the
/// run continues.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StageError {
    /// Job records could not be extracted.
    #[snafu(display("Failed to extract job records"))]
    Extract { source: ExtractError },

    /// A required field is absent from the job sheet.
    #[snafu(display("Job is missing required field '{field}'"))]
    MissingField { field: String },

    /// Failed to prepare the job's output directory.
    #[snafu(display("Failed to prepare job directory {}", path.display()))]
    PrepareJobDir {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to copy the workbook into the job directory.
    #[snafu(display("Failed to copy workbook to {}", path.display()))]
    CopyWorkbook {
        source: std::io::Error,
        path: PathBuf,
    },
}

// ============ Record Sink Errors ============

/// Errors that can occur while replicating records to the database.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to connect to the database.
    #[snafu(display("Failed to connect to database"))]
    Connect { source: sqlx::Error },

    /// Record rejected by the sink.
    #[snafu(display("Record rejected: {reason}"))]
    Rejected { reason: String },

    /// Program record statement failed.
    #[snafu(display("Failed to replicate program record"))]
    PutProgram { source: sqlx::Error },

    /// Tooling record statement failed.
    #[snafu(display("Failed to replicate tooling records"))]
    PutTooling { source: sqlx::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Failure ledger error.
    #[snafu(display("Failure ledger error"))]
    Ledger { source: LedgerError },

    /// Converter could not be constructed.
    #[snafu(display("Converter setup failed"))]
    ConverterSetup { source: ConvertError },

    /// Record sink could not be constructed.
    #[snafu(display("Record sink setup failed"))]
    SinkSetup { source: SinkError },

    /// Failed to create the output directory tree.
    #[snafu(display("Failed to create directory {}", path.display()))]
    CreateDir {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to list the input folder.
    #[snafu(display("Failed to list input folder {}", path.display()))]
    Discover {
        source: std::io::Error,
        path: PathBuf,
    },

    /// Address parsing error.
    #[snafu(display("Failed to parse metrics address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}
