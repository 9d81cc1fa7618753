use std::io::{self, PipeReader, Read};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::debug;

use crate::error::{JudgeError, Result};

const TRUNCATION_NOTICE: &str = "\n[output truncated]\n";

/// How a sandboxed child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The child exited on its own; `output` is stdout and stderr merged.
    Exited {
        success: bool,
        code: Option<i32>,
        output: String,
    },
    /// The wall-clock bound elapsed and the child was killed. Whatever it
    /// printed is discarded.
    TimedOut { elapsed: Duration },
}

/// Spawn `cmd`, merge its stdout and stderr into one pipe, and wait for it
/// for at most `limit`.
///
/// At most `max_output_bytes` of output are kept; the rest is drained so the
/// child never blocks on a full pipe.
pub async fn run_with_timeout(
    mut cmd: Command,
    limit: Duration,
    max_output_bytes: usize,
) -> Result<ProcessOutcome> {
    let (reader, writer) = io::pipe()
        .map_err(|e| JudgeError::Spawn(format!("cannot create output pipe: {}", e)))?;
    let stderr_writer = writer
        .try_clone()
        .map_err(|e| JudgeError::Spawn(format!("cannot create output pipe: {}", e)))?;

    cmd.stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr_writer)
        .kill_on_drop(true);

    let started = Instant::now();
    let deadline = tokio::time::Instant::now()
        .checked_add(limit)
        .ok_or_else(|| JudgeError::Spawn(format!("timeout of {:?} is out of range", limit)))?;
    let mut child = cmd.spawn().map_err(|e| JudgeError::Spawn(e.to_string()))?;
    // The parent's write ends live in `cmd`; the reader only sees EOF once they are gone.
    drop(cmd);

    debug!(pid = ?child.id(), limit_ms = limit.as_millis() as u64, "Sandbox process started");

    let collector = tokio::task::spawn_blocking(move || collect(reader, max_output_bytes));

    let waited = tokio::time::timeout_at(deadline, async {
        let status = child.wait().await?;
        let output = collector
            .await
            .map_err(|e| JudgeError::Spawn(format!("output collector failed: {}", e)))??;
        Ok::<_, JudgeError>((status, output))
    })
    .await;

    match waited {
        Ok(result) => {
            let (status, output) = result?;
            debug!(
                code = ?status.code(),
                output_len = output.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Sandbox process exited"
            );
            Ok(ProcessOutcome::Exited {
                success: status.success(),
                code: status.code(),
                output,
            })
        }
        Err(_) => {
            if let Err(e) = child.kill().await {
                debug!(error = %e, "Kill after timeout failed; process already gone");
            }
            let elapsed = started.elapsed();
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Sandbox process timed out; partial output discarded"
            );
            Ok(ProcessOutcome::TimedOut { elapsed })
        }
    }
}

fn collect(mut reader: PipeReader, max_output_bytes: usize) -> io::Result<String> {
    let mut buf = Vec::new();
    reader
        .by_ref()
        .take(max_output_bytes as u64)
        .read_to_end(&mut buf)?;
    let overflow = io::copy(&mut reader, &mut io::sink())?;

    let mut output = String::from_utf8_lossy(&buf).into_owned();
    if overflow > 0 {
        output.push_str(TRUNCATION_NOTICE);
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr_in_order() {
        let outcome = run_with_timeout(
            sh("echo one; echo two 1>&2; echo three; exit 3"),
            Duration::from_secs(5),
            1024,
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ProcessOutcome::Exited {
                success: false,
                code: Some(3),
                output: "one\ntwo\nthree\n".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_times_out_and_discards_output() {
        let started = Instant::now();
        let outcome = run_with_timeout(sh("echo early; exec sleep 30"), Duration::from_millis(300), 1024)
            .await
            .unwrap();

        assert!(matches!(outcome, ProcessOutcome::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let outcome = run_with_timeout(
            sh("i=0; while [ $i -lt 200 ]; do echo 0123456789; i=$((i+1)); done"),
            Duration::from_secs(5),
            100,
        )
        .await
        .unwrap();

        match outcome {
            ProcessOutcome::Exited { success, output, .. } => {
                assert!(success);
                assert!(output.starts_with("0123456789\n"));
                assert!(output.ends_with(TRUNCATION_NOTICE));
                assert_eq!(output.len(), 100 + TRUNCATION_NOTICE.len());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_is_an_error() {
        let err = run_with_timeout(sh("exit 0"), Duration::MAX, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Spawn(_)));
        assert!(err.to_string().contains("out of range"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let err = run_with_timeout(
            Command::new("/nonexistent/pyjudge-interpreter"),
            Duration::from_secs(1),
            1024,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JudgeError::Spawn(_)));
    }
}
