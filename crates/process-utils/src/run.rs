use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Number of trailing output lines kept per stream.
pub const DEFAULT_TAIL_LINES: usize = 20;

/// How a deadline-bound child process ended.
#[derive(Debug)]
pub enum CommandOutcome {
    /// The child exited on its own.
    Exited {
        status: ExitStatus,
        stdout_tail: String,
        stderr_tail: String,
        elapsed: Duration,
    },
    /// The deadline passed; the child was killed.
    TimedOut { elapsed: Duration },
}

impl CommandOutcome {
    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Exited { elapsed, .. } | Self::TimedOut { elapsed } => *elapsed,
        }
    }
}

/// Spawn `cmd`, wait at most `timeout` for it and kill it if it overruns.
///
/// Stdout and stderr are piped and drained concurrently so a chatty child
/// cannot block on a full pipe. Only the last [`DEFAULT_TAIL_LINES`] lines of
/// each stream are returned. Spawn failures surface as `Err`.
///
/// The deadline covers draining the pipes too: a child that exits but leaves
/// a background process holding its output open is reported as timed out.
pub async fn run_with_timeout(mut cmd: Command, timeout: Duration) -> io::Result<CommandOutcome> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let deadline = started + timeout;
    let mut child = cmd.spawn()?;
    debug!(pid = ?child.id(), "Spawned child process");

    let mut stdout_task = drain_tail(child.stdout.take(), DEFAULT_TAIL_LINES);
    let mut stderr_task = drain_tail(child.stderr.take(), DEFAULT_TAIL_LINES);

    let status = match timeout_at(deadline, child.wait()).await {
        Ok(status) => status?,
        Err(_) => {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill timed-out child process");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Ok(CommandOutcome::TimedOut {
                elapsed: started.elapsed(),
            });
        }
    };

    let drained = timeout_at(deadline, async {
        tokio::join!(&mut stdout_task, &mut stderr_task)
    })
    .await;

    match drained {
        Ok((stdout_tail, stderr_tail)) => Ok(CommandOutcome::Exited {
            status,
            stdout_tail: stdout_tail.unwrap_or_default(),
            stderr_tail: stderr_tail.unwrap_or_default(),
            elapsed: started.elapsed(),
        }),
        Err(_) => {
            warn!(
                ?status,
                "Child exited but its output stayed open past the deadline"
            );
            stdout_task.abort();
            stderr_task.abort();
            Ok(CommandOutcome::TimedOut {
                elapsed: started.elapsed(),
            })
        }
    }
}

fn drain_tail<R>(stream: Option<R>, max_lines: usize) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stream) = stream else {
            return String::new();
        };
        let mut lines = BufReader::new(stream).lines();
        let mut tail = VecDeque::with_capacity(max_lines);
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == max_lines {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = crate::tokio_command("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_exit_status_and_output() {
        let outcome = run_with_timeout(sh("echo hello; echo oops >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap();

        match outcome {
            CommandOutcome::Exited {
                status,
                stdout_tail,
                stderr_tail,
                ..
            } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stdout_tail, "hello");
                assert_eq!(stderr_tail, "oops");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn keeps_only_the_tail() {
        let outcome = run_with_timeout(
            sh("i=0; while [ $i -lt 50 ]; do echo line$i; i=$((i+1)); done"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let CommandOutcome::Exited { stdout_tail, .. } = outcome else {
            panic!("expected exit");
        };
        let lines: Vec<&str> = stdout_tail.lines().collect();
        assert_eq!(lines.len(), DEFAULT_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"line49"));
    }

    #[tokio::test]
    async fn kills_on_timeout() {
        let outcome = run_with_timeout(sh("sleep 10"), Duration::from_millis(200))
            .await
            .unwrap();

        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
        assert!(outcome.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_covers_output_held_by_leftover_process() {
        // The shell exits at once; the backgrounded sleep keeps stdout open.
        let outcome = tokio::time::timeout(
            Duration::from_secs(4),
            run_with_timeout(sh("sleep 6 & exit 0"), Duration::from_millis(500)),
        )
        .await
        .expect("run_with_timeout overran its own deadline")
        .unwrap();

        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
        assert!(outcome.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let cmd = crate::tokio_command("/definitely/not/a/real/binary");
        assert!(run_with_timeout(cmd, Duration::from_secs(1)).await.is_err());
    }
}
