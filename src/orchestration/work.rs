//! The work function the engine runs for each task.
//!
//! Any `Fn(TaskContext) -> impl Future<Output = Result<Option<String>>>`
//! is a `Work`. `ShellWork` is the implementation used by the CLI: it runs
//! the task's `command` through `sh -c`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::model::TaskSpec;
use crate::{nlog_trace, Error, Result};

/// Everything a work function learns about the invocation.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub batch_id: u32,
    pub task: TaskSpec,
    /// 1 for the first attempt, incremented on every retry.
    pub attempt: u32,
    /// Cancelled when the engine is asked to stop. Long-running work should
    /// watch it; the engine never forcibly stops work in flight.
    pub cancel: CancellationToken,
}

/// A unit of work the engine can invoke for a task.
///
/// `Ok(output)` completes the task with an optional result string; any
/// `Err` is a failed attempt handed to the error strategy.
pub trait Work: Send + Sync + 'static {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'static, Result<Option<String>>>;
}

impl<F, Fut> Work for F
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>>> + Send + 'static,
{
    fn run(&self, ctx: TaskContext) -> BoxFuture<'static, Result<Option<String>>> {
        self(ctx).boxed()
    }
}

pub type SharedWork = Arc<dyn Work>;

/// Wrap a work function for sharing across batches and spawned tasks.
pub fn shared<W: Work>(work: W) -> SharedWork {
    Arc::new(work)
}

/// Runs `TaskSpec::command` with `sh -c` in a working directory.
///
/// The child is killed if the work future is dropped or the run is
/// cancelled. Trimmed stdout becomes the task result.
#[derive(Debug, Clone)]
pub struct ShellWork {
    cwd: PathBuf,
    shell: String,
}

impl ShellWork {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            shell: "sh".to_string(),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    async fn execute(cwd: PathBuf, shell: String, ctx: TaskContext) -> Result<Option<String>> {
        let command = ctx.task.command.clone().ok_or_else(|| {
            Error::Validation(format!("task {} has no command", ctx.task.id))
        })?;
        nlog_trace!(
            "ShellWork task={} attempt={} command={}",
            ctx.task.id,
            ctx.attempt,
            command
        );

        let child = Command::new(&shell)
            .arg("-c")
            .arg(&command)
            .current_dir(&cwd)
            .env("NEXUS_TASK_ID", &ctx.task.id)
            .env("NEXUS_TASK_ATTEMPT", ctx.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = ctx.cancel.cancelled() => {
                return Err(Error::execution(format!("task {} cancelled", ctx.task.id)));
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((!stdout.is_empty()).then_some(stdout))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(Error::execution(if stderr.is_empty() {
                format!("command exited with {code}")
            } else {
                format!("command exited with {code}: {stderr}")
            }))
        }
    }
}

impl Work for ShellWork {
    fn run(&self, ctx: TaskContext) -> BoxFuture<'static, Result<Option<String>>> {
        Self::execute(self.cwd.clone(), self.shell.clone(), ctx).boxed()
    }
}
