//! Integration tests for the sheetpress pipeline.
//!
//! Drive full pipeline runs with mock collaborators (workbook reader,
//! converter, record sink) to verify the distribution, failure-isolation,
//! and retry semantics end to end.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use sheetpress::config::{
    Config, InputConfig, LedgerConfig, MetricsConfig, OutputConfig, PdfConfig,
};
use sheetpress::convert::Convert;
use sheetpress::error::{ConvertError, ExtractError, SinkError};
use sheetpress::extract::{JobRecords, ProgramRecord, ReadJob, ToolRecord};
use sheetpress::sink::{ProgramId, RecordSink};
use sheetpress::{Dispatcher, RunMode, job_key};

// ============ Test collaborators ============

/// Reader producing fixed records from the job key, without touching the
/// workbook contents.
struct StubReader {
    /// Keys whose program record comes back without an o-number.
    without_o_number: HashSet<String>,
}

impl StubReader {
    fn new() -> Self {
        Self {
            without_o_number: HashSet::new(),
        }
    }

    fn without_o_number(keys: &[&str]) -> Self {
        Self {
            without_o_number: keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ReadJob for StubReader {
    fn read(&self, input: &Path) -> Result<JobRecords, ExtractError> {
        let key = job_key(input).unwrap().to_string();
        let program = ProgramRecord {
            o_number: (!self.without_o_number.contains(&key)).then(|| format!("O-{key}")),
            tooling: Some("MILL.A1".to_string()),
            parts_name: Some("bracket".to_string()),
            ..ProgramRecord::default()
        };
        Ok(JobRecords {
            program,
            tools: vec![ToolRecord {
                tool_no: Some("1".to_string()),
                name: "endmill 6mm".to_string(),
            }],
        })
    }
}

/// Converter writing a marker document, failing for listed keys.
#[derive(Clone)]
struct StubConverter {
    fail_keys: Arc<HashSet<String>>,
}

#[async_trait]
impl Convert for StubConverter {
    async fn convert(
        &self,
        input: &Path,
        _sheets: &[u32],
        output: &Path,
    ) -> Result<(), ConvertError> {
        let key = job_key(input).unwrap();
        if self.fail_keys.contains(key) {
            return Err(ConvertError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        tokio::fs::write(output, format!("%PDF {key}\n"))
            .await
            .expect("output directory prepared by dispatcher");
        Ok(())
    }
}

/// One converter per worker, as the dispatcher requires.
fn converters(count: usize, fail_keys: &[&str]) -> Vec<StubConverter> {
    let fail_keys = Arc::new(fail_keys.iter().map(|k| k.to_string()).collect::<HashSet<_>>());
    (0..count)
        .map(|_| StubConverter {
            fail_keys: fail_keys.clone(),
        })
        .collect()
}

/// Sink recording every call, optionally failing.
#[derive(Clone, Default)]
struct StubSink {
    fail: bool,
    programs: Arc<Mutex<Vec<ProgramRecord>>>,
    toolings: Arc<Mutex<Vec<(ProgramId, usize)>>>,
}

#[async_trait]
impl RecordSink for StubSink {
    async fn put_program(&self, record: &ProgramRecord) -> Result<ProgramId, SinkError> {
        if self.fail {
            return Err(SinkError::Rejected {
                reason: "sink offline".to_string(),
            });
        }
        let mut programs = self.programs.lock().unwrap();
        programs.push(record.clone());
        Ok(programs.len() as ProgramId)
    }

    async fn put_tooling(
        &self,
        tools: &[ToolRecord],
        program_id: ProgramId,
    ) -> Result<(), SinkError> {
        self.toolings.lock().unwrap().push((program_id, tools.len()));
        Ok(())
    }
}

// ============ Harness ============

struct Workspace {
    _dir: TempDir,
    input: PathBuf,
    output: PathBuf,
    ledger: PathBuf,
}

impl Workspace {
    fn new(keys: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        let output = dir.path().join("output");
        std::fs::create_dir(&input).unwrap();
        let workspace = Self {
            ledger: dir.path().join("fail_list.txt"),
            _dir: dir,
            input,
            output,
        };
        workspace.write_inputs(keys);
        workspace
    }

    fn write_inputs(&self, keys: &[&str]) {
        for key in keys {
            std::fs::write(self.input.join(format!("{key}.xlsx")), "workbook").unwrap();
        }
    }

    fn config(&self, processes: usize) -> Config {
        Config {
            input: InputConfig {
                folder_path: self.input.clone(),
                sheet_name: "工具リスト".to_string(),
            },
            output: OutputConfig {
                folder_path: self.output.clone(),
            },
            pdf: PdfConfig {
                visible: false,
                processes,
                command: "soffice".to_string(),
                sheets: vec![1, 2, 3],
            },
            ledger: LedgerConfig {
                path: self.ledger.clone(),
            },
            database: None,
            metrics: MetricsConfig::default(),
        }
    }

    fn document(&self, key: &str) -> PathBuf {
        // StubReader maps every job to the MILL category.
        self.output.join("MILL").join(key).join(format!("{key}.pdf"))
    }

    fn ledger_keys(&self) -> Vec<String> {
        let content = std::fs::read_to_string(&self.ledger).unwrap_or_default();
        content.lines().map(str::to_string).collect()
    }

    fn archives(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.ledger.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p.file_name().unwrap().to_str().unwrap();
                name.starts_with("fail_list.") && name != "fail_list.txt"
            })
            .collect()
    }
}

// ============ Tests ============

#[tokio::test]
async fn test_full_run_converts_every_job() {
    let ws = Workspace::new(&["J1", "J2", "J3", "J4", "J5"]);
    let dispatcher = Dispatcher::new(
        ws.config(2),
        RunMode::Full,
        StubReader::new(),
        None::<StubSink>,
    );

    let stats = dispatcher.run(converters(2, &[])).await.unwrap();

    assert_eq!(stats.discovered, 5);
    assert_eq!(stats.enqueued, 5);
    assert_eq!(stats.converted, 5);
    assert_eq!(stats.failed, 0);

    for key in ["J1", "J2", "J3", "J4", "J5"] {
        assert!(ws.document(key).exists(), "missing document for {key}");
        assert!(
            !ws.input.join(format!("{key}.xlsx")).exists(),
            "converted input {key} must be consumed"
        );
        assert!(
            ws.output
                .join("MILL")
                .join(key)
                .join(format!("{key}.xlsx"))
                .exists(),
            "workbook copy for {key} missing from job directory"
        );
    }
    assert!(!ws.ledger.exists(), "no failures, no ledger");
}

#[tokio::test]
async fn test_failed_job_lands_in_ledger_and_pipeline_drains() {
    // N=2 workers, J2 always fails: outputs for J1 and J3, ledger holds
    // exactly J2, and the run completes instead of deadlocking.
    let ws = Workspace::new(&["J1", "J2", "J3"]);
    let dispatcher = Dispatcher::new(
        ws.config(2),
        RunMode::Full,
        StubReader::new(),
        None::<StubSink>,
    );

    let stats = dispatcher.run(converters(2, &["J2"])).await.unwrap();

    assert_eq!(stats.converted, 2);
    assert_eq!(stats.failed, 1);
    assert!(ws.document("J1").exists());
    assert!(!ws.document("J2").exists());
    assert!(ws.document("J3").exists());
    assert_eq!(ws.ledger_keys(), vec!["J2"]);
    assert!(
        ws.input.join("J2.xlsx").exists(),
        "failed input is kept for retry"
    );
}

#[tokio::test]
async fn test_retry_mode_processes_only_ledger_jobs() {
    // Ledger {J1, J3}, discovered {J1..J4}: exactly J1 and J3 run.
    let ws = Workspace::new(&["J1", "J2", "J3", "J4"]);
    std::fs::write(&ws.ledger, "J1\nJ3\n").unwrap();

    let dispatcher = Dispatcher::new(
        ws.config(2),
        RunMode::RetryFailed,
        StubReader::new(),
        None::<StubSink>,
    );
    let stats = dispatcher.run(converters(2, &[])).await.unwrap();

    assert_eq!(stats.discovered, 4);
    assert_eq!(stats.filtered, 2);
    assert_eq!(stats.converted, 2);
    assert!(ws.document("J1").exists());
    assert!(ws.document("J3").exists());
    assert!(!ws.document("J2").exists());
    assert!(!ws.document("J4").exists());
    assert!(
        ws.input.join("J2.xlsx").exists() && ws.input.join("J4.xlsx").exists(),
        "jobs outside the retry set are untouched"
    );

    // The loaded ledger was archived; no new ledger appeared.
    assert!(!ws.ledger.exists());
    let archives = ws.archives();
    assert_eq!(archives.len(), 1);
    let archived = std::fs::read_to_string(&archives[0]).unwrap();
    assert_eq!(archived, "J1\nJ3\n");
}

#[tokio::test]
async fn test_retry_failures_do_not_merge_with_archive() {
    let ws = Workspace::new(&["J1", "J2"]);
    std::fs::write(&ws.ledger, "J1\nJ2\n").unwrap();

    let dispatcher = Dispatcher::new(
        ws.config(2),
        RunMode::RetryFailed,
        StubReader::new(),
        None::<StubSink>,
    );
    let stats = dispatcher.run(converters(2, &["J2"])).await.unwrap();

    assert_eq!(stats.converted, 1);
    assert_eq!(stats.failed, 1);

    // This run's ledger holds only this run's failure.
    assert_eq!(ws.ledger_keys(), vec!["J2"]);
    let archives = ws.archives();
    assert_eq!(archives.len(), 1);
    assert_eq!(
        std::fs::read_to_string(&archives[0]).unwrap(),
        "J1\nJ2\n",
        "archive keeps the previous run's record"
    );
}

#[tokio::test]
async fn test_full_run_twice_is_idempotent() {
    let keys = ["J1", "J2"];
    let ws = Workspace::new(&keys);

    let stats = Dispatcher::new(
        ws.config(2),
        RunMode::Full,
        StubReader::new(),
        None::<StubSink>,
    )
    .run(converters(2, &[]))
    .await
    .unwrap();
    assert_eq!(stats.converted, 2);
    assert!(!ws.ledger.exists());

    // Same inputs again: identical outputs, still no ledger.
    ws.write_inputs(&keys);
    let stats = Dispatcher::new(
        ws.config(2),
        RunMode::Full,
        StubReader::new(),
        None::<StubSink>,
    )
    .run(converters(2, &[]))
    .await
    .unwrap();
    assert_eq!(stats.converted, 2);
    assert!(!ws.ledger.exists());
    for key in keys {
        assert_eq!(
            std::fs::read_to_string(ws.document(key)).unwrap(),
            format!("%PDF {key}\n")
        );
    }
}

#[tokio::test]
async fn test_job_without_o_number_is_skipped() {
    let ws = Workspace::new(&["J1", "J2"]);
    let sink = StubSink::default();
    let dispatcher = Dispatcher::new(
        ws.config(1),
        RunMode::Full,
        StubReader::without_o_number(&["J2"]),
        Some(sink.clone()),
    );

    let stats = dispatcher.run(converters(1, &[])).await.unwrap();

    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.converted, 1);
    assert!(ws.document("J1").exists());
    assert!(!ws.document("J2").exists());
    assert!(
        ws.input.join("J2.xlsx").exists(),
        "skipped job's input is untouched"
    );
    // A validation skip is not a conversion failure: no ledger entry.
    assert!(!ws.ledger.exists());
    // And nothing was replicated for the skipped job.
    assert_eq!(sink.programs.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sink_failure_does_not_block_conversion() {
    let ws = Workspace::new(&["J1", "J2"]);
    let sink = StubSink {
        fail: true,
        ..StubSink::default()
    };
    let dispatcher = Dispatcher::new(
        ws.config(1),
        RunMode::Full,
        StubReader::new(),
        Some(sink),
    );

    let stats = dispatcher.run(converters(1, &[])).await.unwrap();

    assert_eq!(stats.converted, 2, "replication failure never blocks conversion");
    assert!(!ws.ledger.exists(), "sink failures are not conversion failures");
}

#[tokio::test]
async fn test_sink_receives_program_and_tooling_records() {
    let ws = Workspace::new(&["J1", "J2"]);
    let sink = StubSink::default();
    let dispatcher = Dispatcher::new(
        ws.config(1),
        RunMode::Full,
        StubReader::new(),
        Some(sink.clone()),
    );

    dispatcher.run(converters(1, &[])).await.unwrap();

    let programs = sink.programs.lock().unwrap();
    assert_eq!(programs.len(), 2);
    let mut o_numbers: Vec<_> = programs
        .iter()
        .map(|p| p.o_number.clone().unwrap())
        .collect();
    o_numbers.sort();
    assert_eq!(o_numbers, vec!["O-J1", "O-J2"]);
    for program in programs.iter() {
        assert!(
            program.folder_path.contains("MILL"),
            "folder_path points at the job's output directory"
        );
    }

    let toolings = sink.toolings.lock().unwrap();
    assert_eq!(toolings.len(), 2);
    assert!(toolings.iter().all(|(_, count)| *count == 1));
}

#[tokio::test]
async fn test_retry_without_ledger_fails_before_workers_start() {
    let ws = Workspace::new(&["J1"]);
    let dispatcher = Dispatcher::new(
        ws.config(1),
        RunMode::RetryFailed,
        StubReader::new(),
        None::<StubSink>,
    );

    let err = dispatcher
        .run(converters(1, &[]))
        .await
        .expect_err("retry with no ledger cannot determine the retry set");
    assert!(err.to_string().contains("ledger"));
    assert!(
        ws.input.join("J1.xlsx").exists(),
        "nothing is processed when startup fails"
    );
}
