//! Local subprocess runner.

use async_trait::async_trait;
use binsmith_core::{CommandOutput, CommandRunner, CommandSpec, ExecutionBudget, RunError};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands as child processes of this process.
///
/// The child inherits the parent environment plus `CommandSpec::env`. On unix
/// it leads its own process group. When the budget runs out the whole group is
/// killed, so compiler and linker subprocesses die with the toolchain, and the
/// child is reaped before `run` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        budget: &ExecutionBudget,
    ) -> Result<CommandOutput, RunError> {
        if let Some(reason) = budget.interruption() {
            return Err(RunError::Interrupted(reason));
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        command.process_group(0);

        debug!(command = %spec.command_line(), dir = ?spec.current_dir, "Spawning process");

        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let finished = async {
                tokio::try_join!(read_pipe(stdout), read_pipe(stderr), child.wait())
            };
            tokio::select! {
                result = finished => Ok(result),
                reason = budget.expired() => Err(reason),
            }
        };

        match outcome {
            Ok(result) => {
                let (stdout, stderr, status) = result?;
                debug!(
                    command = %spec.command_line(),
                    code = ?status.code(),
                    stdout = %stdout.trim_end(),
                    stderr = %stderr.trim_end(),
                    "Process exited"
                );
                Ok(CommandOutput {
                    status: status.code(),
                    stdout,
                    stderr,
                })
            }
            Err(reason) => {
                warn!(command = %spec.command_line(), pid = ?pid, %reason, "Killing process");
                #[cfg(unix)]
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(pid = ?pid, error = %e, "Failed to kill process");
                }
                Err(RunError::Interrupted(reason))
            }
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!(pgid = pid, error = %e, "Failed to kill process group");
    }
}

async fn read_pipe<R>(pipe: Option<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
