//! CLI tests for `taskloop init`, `run` and `tools`.
//!
//! Spawns the binary against a temp workspace using the offline backend.

use std::fs;
use std::process::Command;

use taskloop::exit_codes;
use taskloop::io::config::{AgentConfig, write_config};
use taskloop::response::AgentResponse;

fn offline_config(root: &std::path::Path) -> std::path::PathBuf {
    let mut cfg = AgentConfig::default();
    cfg.tools.workspace_root = root.to_path_buf();
    let path = root.join("taskloop.toml");
    write_config(&path, &cfg).expect("write config");
    path
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("taskloop init");
    assert_eq!(status.code(), Some(exit_codes::OK));
    assert!(temp.path().join("taskloop.toml").exists());

    let status = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("taskloop init again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));
}

#[test]
fn offline_run_lists_directory_and_completes() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("marker.txt"), "x").expect("write");
    let config = offline_config(temp.path());
    let output_path = temp.path().join("response.json");

    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .args(["run", "list the directory", "--config"])
        .arg(&config)
        .arg("--output")
        .arg(&output_path)
        .output()
        .expect("taskloop run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let response: AgentResponse =
        serde_json::from_slice(&output.stdout).expect("response json on stdout");
    assert!(response.success);
    let data = response.data.expect("data");
    assert_eq!(data.results.len(), 1);
    assert!(data.results[0].result.contains("FILE: marker.txt"));

    let written: AgentResponse =
        serde_json::from_str(&fs::read_to_string(&output_path).expect("read output"))
            .expect("parse output");
    assert_eq!(written, AgentResponse { data: Some(data), ..response });
}

#[test]
fn offline_run_writes_hello_world_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = offline_config(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .args(["run", "create a hello world file", "--config"])
        .arg(&config)
        .output()
        .expect("taskloop run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let response: AgentResponse =
        serde_json::from_slice(&output.stdout).expect("response json on stdout");
    assert!(response.success);
    let written = fs::read_to_string(temp.path().join("hello_world.py")).expect("hello_world.py");
    assert_eq!(written, "print(\"Hello, World!\")\n");
}

#[test]
fn offline_run_with_unusable_command_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = offline_config(temp.path());

    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .args(["run", "run the tests", "--config"])
        .arg(&config)
        .output()
        .expect("taskloop run");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let response: AgentResponse =
        serde_json::from_slice(&output.stdout).expect("response json on stdout");
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Step 1 failed after 3 attempts"));
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = temp.path().join("taskloop.toml");
    fs::write(&config, "[loop]\nreview_window = 0\n").expect("write");

    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .args(["run", "anything", "--config"])
        .arg(&config)
        .output()
        .expect("taskloop run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("review_window"));
}

#[test]
fn tools_lists_registry() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(temp.path())
        .arg("tools")
        .output()
        .expect("taskloop tools");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<&str> = stdout
        .lines()
        .filter_map(|l| l.split('\t').next())
        .collect();
    assert_eq!(
        names,
        vec![
            "list_directory_tool",
            "read_file_tool",
            "write_file_tool",
            "search_text_tool",
            "execute_command_tool",
        ]
    );
}
