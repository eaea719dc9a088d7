//! Document converter collaborator.
//!
//! Wraps the external office application behind the [`Convert`] trait. The
//! production implementation drives a headless converter process and retries
//! transient "application busy" failures internally with a fixed delay up to
//! a fixed ceiling, so the scheduler only ever sees an opaque call that
//! either succeeds or fails.

use async_trait::async_trait;
use snafu::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{
    ConvertError, ConverterSnafu, InvalidInputSnafu, MissingOutputSnafu, PlaceOutputSnafu,
    ProfileDirSnafu, SpawnSnafu,
};

/// Delay between retries of a busy converter.
const BUSY_DELAY: Duration = Duration::from_millis(50);

/// Ceiling on total time spent retrying a busy converter.
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Stderr fragments that mark a transient, retryable converter failure.
const BUSY_MARKERS: &[&str] = &["is already running", "could not establish connection"];

/// Converts one job workbook into a fixed-layout document.
#[async_trait]
pub trait Convert: Send + Sync + 'static {
    /// Convert `input`, exporting the given 1-based worksheet subset, and
    /// place the document at `output`.
    async fn convert(&self, input: &Path, sheets: &[u32], output: &Path)
    -> Result<(), ConvertError>;
}

/// Converter backed by an external office process.
///
/// Each instance owns a private user-profile directory, because the office
/// application refuses concurrent use of a single profile. One instance
/// belongs to exactly one worker for that worker's whole lifetime; the
/// profile is removed when the instance is dropped.
pub struct OfficeConverter {
    command: String,
    visible: bool,
    profile: TempDir,
}

impl OfficeConverter {
    /// Create a converter with its own profile directory.
    pub fn new(command: &str, visible: bool) -> Result<Self, ConvertError> {
        let profile = tempfile::Builder::new()
            .prefix("sheetpress-profile-")
            .tempdir()
            .context(ProfileDirSnafu)?;

        debug!(
            command,
            profile = %profile.path().display(),
            "Converter instance created"
        );

        Ok(Self {
            command: command.to_string(),
            visible,
            profile,
        })
    }

    /// Export filter argument selecting the worksheet subset.
    fn export_filter(sheets: &[u32]) -> String {
        let pages = sheets
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "pdf:calc_pdf_Export:{{\"PageRange\":{{\"type\":\"string\",\"value\":\"{pages}\"}}}}"
        )
    }

    /// Whether a failed invocation can be retried.
    fn is_transient(stderr: &str) -> bool {
        BUSY_MARKERS.iter().any(|marker| stderr.contains(marker))
    }

    /// Run the converter once, returning the raw process outcome.
    async fn invoke(
        &self,
        input: &Path,
        sheets: &[u32],
        out_dir: &Path,
    ) -> Result<std::process::Output, ConvertError> {
        let mut cmd = Command::new(&self.command);
        if !self.visible {
            cmd.arg("--headless");
        }
        cmd.arg("--norestore")
            .arg(format!(
                "-env:UserInstallation=file://{}",
                self.profile.path().display()
            ))
            .arg("--convert-to")
            .arg(Self::export_filter(sheets))
            .arg("--outdir")
            .arg(out_dir)
            .arg(input);

        cmd.output().await.context(SpawnSnafu {
            command: &self.command,
        })
    }
}

#[async_trait]
impl Convert for OfficeConverter {
    async fn convert(
        &self,
        input: &Path,
        sheets: &[u32],
        output: &Path,
    ) -> Result<(), ConvertError> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .context(InvalidInputSnafu { path: input })?;
        let out_dir = output.parent().unwrap_or_else(|| Path::new("."));

        let deadline = Instant::now() + BUSY_TIMEOUT;
        loop {
            let outcome = self.invoke(input, sheets, out_dir).await?;
            if outcome.status.success() {
                break;
            }

            let stderr = String::from_utf8_lossy(&outcome.stderr).into_owned();
            if Self::is_transient(&stderr) && Instant::now() < deadline {
                warn!(input = %input.display(), "Converter busy, retrying");
                tokio::time::sleep(BUSY_DELAY).await;
                continue;
            }

            let detail = if stderr.trim().is_empty() {
                outcome.status.to_string()
            } else {
                stderr.trim().to_string()
            };
            return ConverterSnafu {
                command: &self.command,
                detail,
            }
            .fail();
        }

        // The converter names its output after the input stem; move it when
        // the requested target name differs.
        let produced = out_dir.join(format!("{stem}.pdf"));
        if produced != output {
            tokio::fs::rename(&produced, output)
                .await
                .context(PlaceOutputSnafu { path: output })?;
        }

        ensure!(output.exists(), MissingOutputSnafu { path: output });
        Ok(())
    }
}
