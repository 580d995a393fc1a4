//! End-to-end tests of the table-worker protocol against the real binary.
//!
//! These spawn the built `textmill` executable in its hidden worker mode,
//! exactly as the isolated executor does in production.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Duration;

use textmill::isolated::{IsolatedExecutor, TableJob, WorkerError, WorkerMessage};
use textmill::TableConfig;

fn worker_binary() -> &'static str {
    env!("CARGO_BIN_EXE_textmill")
}

fn real_executor() -> IsolatedExecutor {
    IsolatedExecutor::with_command(worker_binary(), vec!["table-worker".to_string()])
        .poll_interval(Duration::from_millis(20))
        .grace_period(Duration::from_secs(2))
}

/// The worker answers garbage input with a structured error message, never
/// with silence.
#[test]
fn worker_reports_invalid_job_as_message() {
    let mut child = Command::new(worker_binary())
        .arg("table-worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn worker");

    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"definitely not a job")
        .expect("write job");

    let output = child.wait_with_output().expect("wait for worker");
    assert!(output.status.success(), "worker must exit cleanly");

    let text = String::from_utf8(output.stdout).expect("utf-8 output");
    let message: WorkerMessage =
        serde_json::from_str(text.trim()).expect("one parseable message");
    match message {
        WorkerMessage::Error { error } => {
            assert_eq!(error.kind, "InvalidJob");
            assert!(!error.message.is_empty());
        }
        WorkerMessage::Ok { .. } => panic!("expected an error message"),
    }
}

/// Full executor round trip: a job for a missing file comes back as a typed
/// `WorkerReportedFailure` carrying the child's error kind and trace.
#[test]
fn executor_surfaces_child_failure_with_context() {
    let job = TableJob {
        file_path: "/nonexistent/input.pdf".into(),
        config: TableConfig::default(),
    };

    let err = real_executor()
        .run(&job, Duration::from_secs(30))
        .expect_err("missing file must fail");

    match err {
        WorkerError::ReportedFailure { kind, message, .. } => {
            assert!(!kind.is_empty());
            assert!(!message.is_empty());
        }
        other => panic!("expected ReportedFailure, got {:?}", other),
    }
}

/// The async call shape works against the real worker binary.
#[tokio::test]
async fn executor_async_round_trip() {
    let job = TableJob {
        file_path: "/nonexistent/input.pdf".into(),
        config: TableConfig::default(),
    };

    let err = real_executor()
        .run_async(job, Duration::from_secs(30))
        .await
        .expect_err("missing file must fail");
    assert!(matches!(err, WorkerError::ReportedFailure { .. }));
}
