//! Fixed toolbox the step executor draws on.
//!
//! Tools take named JSON arguments and always return text. Failures never
//! escape as `Err`; [`Tool::invoke`] renders them as an `Error: ...` string the
//! model can read in the transcript.

pub mod command;
pub mod fs;
pub mod search;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::io::config::ToolsConfig;

pub use command::ExecuteCommandTool;
pub use fs::{ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use search::SearchTextTool;

/// Named arguments passed to a tool.
pub type ToolArgs = Map<String, Value>;

/// A capability the executor can call by name.
pub trait Tool: Send + Sync {
    /// Stable identifier used in `Step::tools_needed`.
    fn name(&self) -> &'static str;

    /// One-line summary including the accepted argument names.
    fn description(&self) -> &'static str;

    /// Perform the side effect and describe the outcome.
    fn run(&self, args: &ToolArgs) -> Result<String>;

    /// Run the tool, rendering any failure as `Error: ...`.
    #[instrument(skip_all, fields(tool = self.name()))]
    fn invoke(&self, args: &ToolArgs) -> String {
        match self.run(args) {
            Ok(out) => out,
            Err(err) => {
                debug!(err = %format!("{err:#}"), "tool failed");
                format!("Error: {err:#}")
            }
        }
    }
}

/// Ordered set of tools with unique names.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five standard tools, rooted at `cfg.workspace_root`.
    pub fn from_config(cfg: &ToolsConfig) -> Self {
        let root = cfg.workspace_root.clone();
        Self {
            tools: vec![
                Box::new(ListDirectoryTool::new(root.clone(), cfg.max_list_entries)),
                Box::new(ReadFileTool::new(root.clone(), cfg.output_limit_bytes)),
                Box::new(WriteFileTool::new(root.clone())),
                Box::new(SearchTextTool::new(
                    root.clone(),
                    cfg.max_search_matches,
                    cfg.max_search_file_bytes,
                )),
                Box::new(ExecuteCommandTool::new(
                    root,
                    cfg.command_timeout(),
                    cfg.output_limit_bytes,
                )),
            ],
        }
    }

    /// Add a tool. Names must be unique.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        if self.get(tool.name()).is_some() {
            bail!("tool {} is already registered", tool.name());
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.iter().find(|t| t.name() == name)
    }

    /// Invoke `name`, or `None` if no such tool is registered.
    pub fn invoke(&self, name: &str, args: &ToolArgs) -> Option<String> {
        self.get(name).map(|tool| tool.invoke(args))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(args: &'a ToolArgs, key: &str) -> Result<&'a str> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(anyhow!("argument {key} must be a string, got {other}")),
        None => Err(anyhow!("missing argument {key}")),
    }
}

/// Fetch an optional string argument; empty strings count as absent.
pub(crate) fn optional_str<'a>(args: &'a ToolArgs, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(anyhow!("argument {key} must be a string, got {other}")),
    }
}

/// Resolve `path` against `root` unless it is already absolute.
pub(crate) fn resolve(root: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    }
}
