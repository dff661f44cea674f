//! Regex search across text files under a directory.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use super::{Tool, ToolArgs, optional_str, required_str, resolve};

const SKIPPED_DIRS: [&str; 3] = ["target", "node_modules", "__pycache__"];

/// Reports matching lines as `path:line: text`.
///
/// Entries that cannot be walked or read are skipped, as are files larger
/// than `max_file_bytes`.
#[derive(Debug, Clone)]
pub struct SearchTextTool {
    root: PathBuf,
    max_matches: usize,
    max_file_bytes: u64,
}

impl SearchTextTool {
    pub fn new(root: PathBuf, max_matches: usize, max_file_bytes: u64) -> Self {
        Self {
            root,
            max_matches,
            max_file_bytes,
        }
    }
}

impl Tool for SearchTextTool {
    fn name(&self) -> &'static str {
        "search_text_tool"
    }

    fn description(&self) -> &'static str {
        "Search files for a regex. Args: pattern, directory_path (default \".\"), file_pattern (file name suffix such as \".rs\")."
    }

    fn run(&self, args: &ToolArgs) -> Result<String> {
        let pattern = required_str(args, "pattern")?;
        let re = Regex::new(pattern).with_context(|| format!("invalid pattern {pattern:?}"))?;
        let dir = resolve(
            &self.root,
            optional_str(args, "directory_path")?.unwrap_or("."),
        );
        let suffix = optional_str(args, "file_pattern")?.map(|s| s.trim_start_matches('*'));
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }

        let mut matches = Vec::new();
        let mut total = 0usize;
        let mut oversized = 0usize;
        let walker = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(err = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if let Some(suffix) = suffix
                && !name.ends_with(suffix)
            {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > self.max_file_bytes {
                debug!(path = %entry.path().display(), size, "skipping oversized file");
                oversized += 1;
                continue;
            }
            let Ok(text) = fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "skipping unreadable or binary file");
                continue;
            };
            let rel = entry.path().strip_prefix(&dir).unwrap_or(entry.path());
            for (idx, line) in text.lines().enumerate() {
                if re.is_match(line) {
                    total += 1;
                    if matches.len() < self.max_matches {
                        matches.push(format!("{}:{}: {}", rel.display(), idx + 1, line.trim()));
                    }
                }
            }
        }

        let mut out = if total == 0 {
            format!("No matches for {pattern:?} in {}", dir.display())
        } else {
            let mut out = format!("{total} matches for {pattern:?}:\n{}", matches.join("\n"));
            if total > matches.len() {
                out.push_str(&format!("\n... {} more matches", total - matches.len()));
            }
            out
        };
        if oversized > 0 {
            out.push_str(&format!(
                "\n[skipped {oversized} files larger than {} bytes]",
                self.max_file_bytes
            ));
        }
        Ok(out)
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.contains(&name.as_ref())
}
