use std::process::{Output, Stdio};

use crate::gcloud::GcloudError;

/// Abstraction over gcloud CLI execution.
///
/// Production code uses [`RealExecutor`]; tests substitute mockall mocks.
#[allow(async_fn_in_trait)]
pub trait GcloudExecutor: Send + Sync {
    /// Run a command and capture stdout.
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError>;

    /// Run a command with its output attached to the terminal.
    async fn exec_streaming(&self, args: &[String]) -> Result<(), GcloudError>;

    /// Run a command with `stdin_data` piped to its stdin.
    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, GcloudError>;
}

/// Executes the `gcloud` binary found on PATH.
pub struct RealExecutor;

fn gcloud(args: &[String]) -> tokio::process::Command {
    tracing::debug!(?args, "gcloud");
    let mut cmd = tokio::process::Command::new("gcloud");
    cmd.args(args);
    cmd
}

fn captured(args: &[String], output: Output) -> Result<String, GcloudError> {
    if output.status.success() {
        return String::from_utf8(output.stdout).map_err(|e| GcloudError::InvalidUtf8 { source: e });
    }
    Err(GcloudError::CommandFailed {
        args: args.to_vec(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}

impl GcloudExecutor for RealExecutor {
    async fn exec(&self, args: &[String]) -> Result<String, GcloudError> {
        let output = gcloud(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| GcloudError::NotFound { source: e })?;

        captured(args, output)
    }

    async fn exec_streaming(&self, args: &[String]) -> Result<(), GcloudError> {
        let status = gcloud(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| GcloudError::NotFound { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(GcloudError::CommandFailed {
                args: args.to_vec(),
                stderr: format!("exit status: {status}"),
            })
        }
    }

    async fn exec_with_stdin(
        &self,
        args: &[String],
        stdin_data: &[u8],
    ) -> Result<String, GcloudError> {
        use tokio::io::AsyncWriteExt;

        let mut child = gcloud(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GcloudError::NotFound { source: e })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(stdin_data)
                .await
                .map_err(|e| GcloudError::StdinWrite { source: e })?;
            stdin
                .shutdown()
                .await
                .map_err(|e| GcloudError::StdinWrite { source: e })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| GcloudError::NotFound { source: e })?;

        captured(args, output)
    }
}
