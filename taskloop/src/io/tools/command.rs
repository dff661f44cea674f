//! Shell command execution with a wall-clock limit.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use super::{Tool, ToolArgs, optional_str, required_str, resolve};
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Runs a shell command and reports its exit code and output.
#[derive(Debug, Clone)]
pub struct ExecuteCommandTool {
    root: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ExecuteCommandTool {
    pub fn new(root: PathBuf, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            root,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Tool for ExecuteCommandTool {
    fn name(&self) -> &'static str {
        "execute_command_tool"
    }

    fn description(&self) -> &'static str {
        "Run a shell command. Args: command, working_directory (default workspace root)."
    }

    fn run(&self, args: &ToolArgs) -> Result<String> {
        let command = required_str(args, "command")?;
        let workdir = match optional_str(args, "working_directory")? {
            Some(dir) => resolve(&self.root, dir),
            None => self.root.clone(),
        };
        if !workdir.is_dir() {
            bail!("working directory {} does not exist", workdir.display());
        }
        info!(command, workdir = %workdir.display(), "executing command");

        let output = run_command_with_timeout(
            shell(command, workdir),
            None,
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run {command:?}"))?;

        if output.timed_out {
            bail!(
                "command timed out after {}s{}",
                self.timeout.as_secs_f64(),
                render_streams(&output)
            );
        }
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let secs = output.elapsed.as_secs_f64();
        if !output.status.success() {
            bail!(
                "command exited with code {code} after {secs:.2}s{}",
                render_streams(&output)
            );
        }
        Ok(format!("Exit code: {code} ({secs:.2}s){}", render_streams(&output)))
    }
}

#[cfg(unix)]
fn shell(command: &str, workdir: PathBuf) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).current_dir(workdir);
    cmd
}

#[cfg(windows)]
fn shell(command: &str, workdir: PathBuf) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command).current_dir(workdir);
    cmd
}

fn render_streams(output: &CommandOutput) -> String {
    let mut buf = String::new();
    let stdout = output.stdout_lossy();
    let stderr = output.stderr_lossy();
    if !stdout.trim().is_empty() {
        buf.push_str("\nSTDOUT:\n");
        buf.push_str(stdout.trim_end());
        buf.push_str(&output.stdout_truncated_notice());
    }
    if !stderr.trim().is_empty() {
        buf.push_str("\nSTDERR:\n");
        buf.push_str(stderr.trim_end());
        buf.push_str(&output.stderr_truncated_notice());
    }
    buf
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Instant;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap_or_default()
    }

    fn tool(root: PathBuf, timeout: Duration) -> ExecuteCommandTool {
        ExecuteCommandTool::new(root, timeout, 4096)
    }

    #[test]
    fn reports_exit_code_and_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = tool(temp.path().to_path_buf(), Duration::from_secs(5))
            .invoke(&args(json!({"command": "echo hello"})));
        let (status, streams) = out.split_once('\n').expect("two parts");
        assert!(status.starts_with("Exit code: 0 ("), "{status}");
        assert!(status.ends_with("s)"), "{status}");
        assert_eq!(streams, "STDOUT:\nhello");
    }

    #[test]
    fn runs_in_working_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(temp.path().join("sub")).expect("mkdir");
        std::fs::write(temp.path().join("sub/marker.txt"), "").expect("write");
        let out = tool(temp.path().to_path_buf(), Duration::from_secs(5))
            .invoke(&args(json!({"command": "ls", "working_directory": "sub"})));
        assert!(out.contains("marker.txt"), "{out}");
    }

    #[test]
    fn non_zero_exit_is_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = tool(temp.path().to_path_buf(), Duration::from_secs(5))
            .invoke(&args(json!({"command": "echo boom >&2; exit 4"})));
        assert!(out.starts_with("Error: command exited with code 4 after "), "{out}");
        assert!(out.contains("STDERR:\nboom"));
    }

    #[test]
    fn sleeping_command_times_out_promptly() {
        let temp = tempfile::tempdir().expect("tempdir");
        let start = Instant::now();
        let out = tool(temp.path().to_path_buf(), Duration::from_millis(500))
            .invoke(&args(json!({"command": "sleep 10"})));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(out.starts_with("Error: command timed out after 0.5s"), "{out}");
    }

    #[test]
    fn missing_working_directory_is_error_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = tool(temp.path().to_path_buf(), Duration::from_secs(5))
            .invoke(&args(json!({"command": "true", "working_directory": "absent"})));
        assert!(out.contains("does not exist"), "{out}");
    }
}
