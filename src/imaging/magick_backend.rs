//! Process executor for the ImageMagick engine.
//!
//! The command is spawned directly from its argv (no shell), so paths with
//! spaces or shell metacharacters need no escaping. Both output pipes are
//! drained on helper threads while the main thread polls for exit, which keeps
//! a chatty engine from blocking on a full pipe.
//!
//! When the deadline passes the child is killed and reaped before
//! [`BackendError::Timeout`] is returned. The same deadline bounds collecting
//! the pipe output: a helper process the engine started can keep the pipes
//! open after the engine itself exits, and that also counts as a timeout. The
//! reader threads are left to finish on their own.

use super::backend::{BackendError, ExecOutput, Executor};
use super::params::EngineCommand;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs compiled commands as child processes with a wall-clock deadline.
pub struct MagickExecutor {
    poll_interval: Duration,
}

impl MagickExecutor {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl Default for MagickExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error just truncates what we report.
            let _ = pipe.read_to_end(&mut buf);
        }
        // The receiver is gone once the run has timed out.
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

impl Executor for MagickExecutor {
    fn execute(
        &self,
        command: &EngineCommand,
        timeout: Duration,
    ) -> Result<ExecOutput, BackendError> {
        log::debug!("exec: {command}");

        let mut child = Command::new(&command.program)
            .args(command.argv())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: command.program.clone(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        drain(child.stdout.take(), Stream::Stdout, tx.clone());
        drain(child.stderr.take(), Stream::Stderr, tx);

        let deadline = Instant::now() + timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "`{}` exceeded {}ms, killing pid {}",
                    command.program,
                    timeout.as_millis(),
                    child.id()
                );
                // The child may have exited between try_wait and kill.
                let _ = child.kill();
                child.wait()?;
                return Err(BackendError::Timeout { timeout });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        };

        let mut output = ExecOutput::default();
        for _ in 0..2 {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok((Stream::Stdout, text)) => output.stdout = text,
                Ok((Stream::Stderr, text)) => output.stderr = text,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "`{}` exited but its output pipes stayed open past {}ms",
                        command.program,
                        timeout.as_millis()
                    );
                    return Err(BackendError::Timeout { timeout });
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !status.success() {
            return Err(BackendError::EngineFailed {
                status: status.code(),
                stderr: output.stderr,
            });
        }

        Ok(output)
    }
}
