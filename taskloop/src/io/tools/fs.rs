//! Filesystem tools: list, read and write.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use super::{Tool, ToolArgs, optional_str, required_str, resolve};

/// Lists one directory level as `DIR: name` / `FILE: name` lines.
#[derive(Debug, Clone)]
pub struct ListDirectoryTool {
    root: PathBuf,
    max_entries: usize,
}

impl ListDirectoryTool {
    pub fn new(root: PathBuf, max_entries: usize) -> Self {
        Self { root, max_entries }
    }
}

impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory_tool"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory. Args: directory_path (default \".\")."
    }

    fn run(&self, args: &ToolArgs) -> Result<String> {
        let requested = optional_str(args, "directory_path")?.unwrap_or(".");
        let dir = resolve(&self.root, requested);
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
            let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
            let is_dir = entry
                .file_type()
                .with_context(|| format!("stat {}", entry.path().display()))?
                .is_dir();
            entries.push((is_dir, entry.file_name().to_string_lossy().into_owned()));
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));

        let total = entries.len();
        let mut out = format!("Contents of {} ({total} entries):", dir.display());
        if total == 0 {
            out.push_str("\n(empty)");
        }
        for (is_dir, name) in entries.iter().take(self.max_entries) {
            let kind = if *is_dir { "DIR" } else { "FILE" };
            out.push_str(&format!("\n{kind}: {name}"));
        }
        if total > self.max_entries {
            out.push_str(&format!("\n... {} more entries", total - self.max_entries));
        }
        Ok(out)
    }
}

/// Returns a file's text, truncated to a byte limit.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    root: PathBuf,
    limit_bytes: usize,
}

impl ReadFileTool {
    pub fn new(root: PathBuf, limit_bytes: usize) -> Self {
        Self { root, limit_bytes }
    }
}

impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file_tool"
    }

    fn description(&self) -> &'static str {
        "Read a UTF-8 text file. Args: file_path."
    }

    fn run(&self, args: &ToolArgs) -> Result<String> {
        let path = resolve(&self.root, required_str(args, "file_path")?);
        let bytes = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
        let mut text = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
        if text.len() > self.limit_bytes {
            let dropped = text.len() - floor_char_boundary(&text, self.limit_bytes);
            text.truncate(text.len() - dropped);
            text.push_str(&format!("\n[truncated {dropped} bytes]"));
        }
        Ok(text)
    }
}

/// Creates or overwrites a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct WriteFileTool {
    root: PathBuf,
}

impl WriteFileTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file_tool"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a text file. Args: file_path, content."
    }

    fn run(&self, args: &ToolArgs) -> Result<String> {
        let path = resolve(&self.root, required_str(args, "file_path")?);
        let content = required_str(args, "content")?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut idx = max.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
