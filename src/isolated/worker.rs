//! Child-side entry point for isolated table extraction.
//!
//! The worker reads one job from stdin, runs detection, and writes exactly
//! one message to stdout. Every failure — bad input, extraction errors,
//! panics — is caught at this boundary and marshalled into an error
//! descriptor; the only way the worker dies without a message is a real
//! crash (signal-based termination) that preempts the handler.

use std::backtrace::Backtrace;
use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};

use super::protocol::{ErrorDescriptor, TableJob, WireTable, WorkerMessage};
use crate::extract::tables;

/// Run one table-extraction job over the given streams. Called by the hidden
/// `table-worker` subcommand with stdin/stdout.
pub fn run_table_worker(input: impl Read, mut output: impl Write) -> std::io::Result<()> {
    mask_interrupts();

    let message = run_job(input);
    let line = serde_json::to_string(&message).unwrap_or_else(|e| {
        // Serializing plain data only fails if something is deeply wrong;
        // still send *a* message rather than dying silently.
        format!(
            r#"{{"status":"error","error":{{"message":"failed to serialize worker message: {}","kind":"Protocol","trace":""}}}}"#,
            e
        )
    });
    writeln!(output, "{}", line)?;
    output.flush()
}

fn run_job(input: impl Read) -> WorkerMessage {
    let job: TableJob = match serde_json::from_reader(input) {
        Ok(job) => job,
        Err(e) => {
            return failure("InvalidJob", format!("failed to parse job input: {}", e));
        }
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        tables::detect_tables(&job.file_path, &job.config)
    }));

    match outcome {
        Ok(Ok(records)) => WorkerMessage::Ok {
            tables: records.iter().map(WireTable::from).collect(),
        },
        Ok(Err(e)) => failure(e.kind(), e.to_string()),
        Err(panic_payload) => {
            let message = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic with non-string payload".to_string());
            failure("Panic", message)
        }
    }
}

fn failure(kind: &str, message: String) -> WorkerMessage {
    WorkerMessage::Error {
        error: ErrorDescriptor {
            message,
            kind: kind.to_string(),
            trace: Backtrace::force_capture().to_string(),
        },
    }
}

/// Ignore interactive interrupts so a Ctrl-C aimed at the parent doesn't
/// kill the worker mid-write; the parent tears the worker down itself.
fn mask_interrupts() {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, libc::SIG_IGN);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run_with_input(input: &str) -> WorkerMessage {
        let mut output = Vec::new();
        run_table_worker(Cursor::new(input.as_bytes()), &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        serde_json::from_str(text.trim()).unwrap()
    }

    #[test]
    fn test_invalid_job_reports_error() {
        let message = run_with_input("this is not json");
        match message {
            WorkerMessage::Error { error } => {
                assert_eq!(error.kind, "InvalidJob");
                assert!(!error.trace.is_empty());
            }
            WorkerMessage::Ok { .. } => panic!("expected error message"),
        }
    }

    #[test]
    fn test_missing_file_reports_error_not_silence() {
        let job = r#"{"file_path":"/nonexistent/input.pdf","config":{"min_rows":2,"min_columns":2}}"#;
        let message = run_with_input(job);
        match message {
            WorkerMessage::Error { error } => {
                assert!(!error.message.is_empty());
                assert!(!error.kind.is_empty());
            }
            WorkerMessage::Ok { .. } => panic!("expected error message"),
        }
    }
}
