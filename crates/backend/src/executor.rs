//! Asynchronous execution of backend shell commands.

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`CommandRunner::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<CommandOutput, LaunchError>> + Send + 'a>>;

/// Captured result of a backend command that actually ran.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Process exit code (`None` if terminated by a signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` if the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The command could not be launched at all, as distinct from a command
/// that ran and exited non-zero. Callers must treat both as generic
/// failures.
#[derive(Debug, thiserror::Error)]
#[error("failed to launch backend command: {0}")]
pub struct LaunchError(#[from] std::io::Error);

/// Seam between the storage bridge and the operating system.
///
/// Tests substitute a scripted runner; production uses [`ShellRunner`].
pub trait CommandRunner: Send + Sync + 'static {
    /// Runs `command` through a shell and captures its output.
    fn run(&self, command: String) -> RunFuture<'_>;
}

/// Runs commands via `sh -c` on a tokio-managed child process.
///
/// The await suspends only the calling task, so many commands may be in
/// flight concurrently and a hung backend call stalls only the connection
/// that issued it.
#[derive(Debug, Default, Clone)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, command: String) -> RunFuture<'_> {
        Box::pin(async move {
            tracing::debug!(%command, "executing backend command");
            let output = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .output()
                .await?;

            Ok(CommandOutput {
                exit_code: output.status.code(),
                // Undecodable bytes become replacement characters; output
                // decoding can never fail.
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = ShellRunner.run("printf hello".into()).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
        assert!(out.stderr.is_empty());
    }

    #[tokio::test]
    async fn captures_nonzero_exit() {
        let out = ShellRunner.run("exit 3".into()).await.unwrap();
        assert!(!out.success());
        assert_eq!(out.exit_code, Some(3));
    }

    #[tokio::test]
    async fn captures_stderr() {
        let out = ShellRunner
            .run("printf oops >&2; exit 1".into())
            .await
            .unwrap();
        assert_eq!(out.stderr, "oops");
        assert_eq!(out.exit_code, Some(1));
    }

    #[tokio::test]
    async fn undecodable_output_is_replaced_not_fatal() {
        let out = ShellRunner.run(r"printf '\377\376ok'".into()).await.unwrap();
        assert!(out.success());
        assert!(out.stdout.ends_with("ok"));
        assert!(out.stdout.contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn many_commands_run_concurrently() {
        // Four 200ms sleeps in parallel should finish well under 800ms.
        let start = std::time::Instant::now();
        let (a, b, c, d) = tokio::join!(
            ShellRunner.run("sleep 0.2".into()),
            ShellRunner.run("sleep 0.2".into()),
            ShellRunner.run("sleep 0.2".into()),
            ShellRunner.run("sleep 0.2".into()),
        );
        for out in [a, b, c, d] {
            assert!(out.unwrap().success());
        }
        assert!(start.elapsed() < std::time::Duration::from_millis(700));
    }
}
