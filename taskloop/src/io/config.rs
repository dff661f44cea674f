//! Agent configuration stored in `taskloop.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "taskloop.toml";

/// Agent configuration (TOML).
///
/// Missing tables and fields fall back to defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub model: ModelConfig,
    pub tools: ToolsConfig,
    #[serde(rename = "loop")]
    pub loop_: LoopConfig,
    pub server: ServerConfig,
}

/// Which language model backs the planner, executor and reviewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// OpenAI-compatible `/chat/completions` endpoint.
    OpenAi,
    /// `codex exec` subprocess.
    Codex,
    /// Deterministic keyword heuristics; no network.
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackend,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::Offline,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            request_timeout_secs: 120,
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Relative tool paths resolve against this directory.
    pub workspace_root: PathBuf,
    /// Wall-clock limit for `execute_command_tool`.
    pub command_timeout_secs: u64,
    /// Truncate file contents and command output beyond this many bytes.
    pub output_limit_bytes: usize,
    pub max_list_entries: usize,
    pub max_search_matches: usize,
    /// `search_text_tool` skips files larger than this.
    pub max_search_file_bytes: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from("."),
            command_timeout_secs: 30,
            output_limit_bytes: 20_000,
            max_list_entries: 100,
            max_search_matches: 50,
            max_search_file_bytes: 1_048_576,
        }
    }
}

impl ToolsConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Number of trailing transcript entries shown to the reviewer.
    pub review_window: usize,
    /// Runs allowed for a single step before the execution fails.
    pub max_step_attempts: u32,
    /// Executor runs allowed per task on top of one run per planned step.
    /// Long plans that never repeat a step stay within the limit.
    pub max_iterations: u32,
    /// Maximum bytes for a rendered prompt before dropping sections.
    pub prompt_budget_bytes: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            review_window: 3,
            max_step_attempts: 3,
            max_iterations: 50,
            prompt_budget_bytes: 40_000,
        }
    }
}

impl LoopConfig {
    /// Total executor runs allowed for a plan of `steps` steps.
    pub fn iteration_limit(&self, steps: usize) -> u32 {
        u32::try_from(steps)
            .unwrap_or(u32::MAX)
            .saturating_add(self.max_iterations)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.request_timeout_secs == 0 {
            return Err(anyhow!("model.request_timeout_secs must be > 0"));
        }
        if self.model.backend == ModelBackend::OpenAi {
            if self.model.base_url.trim().is_empty() {
                return Err(anyhow!("model.base_url must be set for the openai backend"));
            }
            if self.model.model.trim().is_empty() {
                return Err(anyhow!("model.model must be set for the openai backend"));
            }
        }
        if self.tools.command_timeout_secs == 0 {
            return Err(anyhow!("tools.command_timeout_secs must be > 0"));
        }
        if self.tools.output_limit_bytes == 0 {
            return Err(anyhow!("tools.output_limit_bytes must be > 0"));
        }
        if self.tools.max_list_entries == 0 || self.tools.max_search_matches == 0 {
            return Err(anyhow!(
                "tools.max_list_entries and tools.max_search_matches must be > 0"
            ));
        }
        if self.tools.max_search_file_bytes == 0 {
            return Err(anyhow!("tools.max_search_file_bytes must be > 0"));
        }
        if self.loop_.review_window == 0 {
            return Err(anyhow!("loop.review_window must be > 0"));
        }
        if self.loop_.max_step_attempts == 0 {
            return Err(anyhow!("loop.max_step_attempts must be > 0"));
        }
        if self.loop_.max_iterations == 0 {
            return Err(anyhow!("loop.max_iterations must be > 0"));
        }
        if self.loop_.prompt_budget_bytes == 0 {
            return Err(anyhow!("loop.prompt_budget_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
