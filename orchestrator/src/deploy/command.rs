//! External process invocation

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished child process
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Best single-line explanation of a failure
    pub fn failure_reason(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return last_line(stderr).to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return last_line(stdout).to_string();
        }
        "process exited with a non-zero status".to_string()
    }
}

fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

/// Run `program args..` to completion and capture its output
///
/// The child is killed if the returned future is dropped, so wrapping this
/// call in `tokio::time::timeout` does not leave stray processes behind.
pub async fn run(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<CommandOutput, std::io::Error> {
    debug!("Running: {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    let output = command.output().await?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
