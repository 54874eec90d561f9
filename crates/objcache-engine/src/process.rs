use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// A running batch process.
///
/// Owns the child; its stdin and stdout are handed to the writer and reader
/// loops at spawn time. Stderr is drained into `warn!` events so the pipe
/// never fills. Dropping the handle kills the child.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    program: String,
}

impl ProcessHandle {
    /// Start `config.program` with `config.args` in `config.repository`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(config: &EngineConfig) -> EngineResult<(Self, ChildStdin, ChildStdout)> {
        let spawn_error = |source: io::Error| EngineError::Spawn {
            program: config.program.clone(),
            source,
        };

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .current_dir(&config.repository)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(io::Error::other("stdout was not captured")))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(config.program.clone(), stderr));
        }

        info!(
            program = %config.program,
            args = ?config.args,
            repository = %config.repository.display(),
            pid = child.id(),
            "batch process started"
        );
        let handle = Self {
            child,
            program: config.program.clone(),
        };
        Ok((handle, stdin, stdout))
    }

    /// OS process id, while the child is running.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the child and wait for it, closing its pipes.
    ///
    /// Returns the exit status. Terminating an already exited child just
    /// reports its status.
    pub async fn terminate(&mut self) -> EngineResult<ExitStatus> {
        if let Some(status) = self.child.try_wait().map_err(EngineError::Terminate)? {
            debug!(program = %self.program, %status, "batch process already exited");
            return Ok(status);
        }
        self.child.start_kill().map_err(EngineError::Terminate)?;
        let status = self.child.wait().await.map_err(EngineError::Terminate)?;
        info!(program = %self.program, %status, "batch process terminated");
        Ok(status)
    }
}

async fn drain_stderr(program: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(program = %program, "{line}"),
            Ok(None) => break,
            Err(err) => {
                debug!(program = %program, error = %err, "stderr closed");
                break;
            }
        }
    }
}
