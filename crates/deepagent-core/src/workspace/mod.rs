//! Mock filesystem shared between the main agent and its sub-agents
//!
//! Every path maps to an append-only list of snapshots. Index 0 is the
//! original write; later entries are edits or commit messages interleaved
//! with full content. The current content is always the last snapshot.

pub mod permissions;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::WorkspaceError;

pub use permissions::{PermissionScope, ANY_PATH};

/// Default number of lines returned by a read.
pub const DEFAULT_READ_LIMIT: usize = 2000;

/// Lines longer than this are cut when formatted for reading.
pub const MAX_LINE_CHARS: usize = 2000;

/// Returned instead of content when the file holds only whitespace.
pub const EMPTY_FILE_REMINDER: &str = "System reminder: File exists but has empty contents";

/// Directory name that selects top-level paths in [`Workspace::list`].
pub const ROOT_DIR: &str = "root";

/// Snapshot history of a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHistory {
    snapshots: Vec<String>,
}

impl FileHistory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            snapshots: vec![content.into()],
        }
    }

    /// Latest content.
    pub fn current(&self) -> &str {
        self.snapshots.last().map(String::as_str).unwrap_or_default()
    }

    pub fn snapshots(&self) -> &[String] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// All snapshots joined by newline, read as one virtual document.
    pub fn joined(&self) -> String {
        self.snapshots.join("\n")
    }

    fn push(&mut self, snapshot: String) {
        self.snapshots.push(snapshot);
    }
}

/// Result of a successful [`Workspace::edit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOutcome {
    pub replacements: usize,
}

/// Path to history mapping emulating a filesystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workspace {
    files: BTreeMap<String, FileHistory>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace `path` with a single snapshot. Prior history is discarded.
    pub fn write(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), FileHistory::new(content));
    }

    /// Read the latest snapshot in `cat -n` format.
    pub fn read(&self, path: &str, offset: usize, limit: usize) -> Result<String, WorkspaceError> {
        let file = self.require(path)?;
        format_lines(file.current(), offset, limit)
    }

    /// Read every snapshot joined by newline, in `cat -n` format.
    pub fn read_history(
        &self,
        path: &str,
        offset: usize,
        limit: usize,
    ) -> Result<String, WorkspaceError> {
        let file = self.require(path)?;
        format_lines(&file.joined(), offset, limit)
    }

    /// Replace `old` with `new` in the latest snapshot and append the result.
    ///
    /// Without `replace_all` the match must be unique. History is left
    /// untouched on every error path.
    pub fn edit(
        &mut self,
        path: &str,
        old: &str,
        new: &str,
        replace_all: bool,
    ) -> Result<EditOutcome, WorkspaceError> {
        let file = self
            .files
            .get_mut(path)
            .ok_or_else(|| WorkspaceError::NotFound {
                path: path.to_string(),
            })?;
        let content = file.current();

        let count = if old.is_empty() {
            0
        } else {
            content.matches(old).count()
        };
        if count == 0 {
            return Err(WorkspaceError::StringNotFound {
                needle: old.to_string(),
            });
        }
        if count > 1 && !replace_all {
            return Err(WorkspaceError::AmbiguousMatch {
                needle: old.to_string(),
                count,
            });
        }

        let (updated, replacements) = if replace_all {
            (content.replace(old, new), count)
        } else {
            (content.replacen(old, new, 1), 1)
        };
        file.push(updated);

        Ok(EditOutcome { replacements })
    }

    /// Append a commit message and then the full new content.
    pub fn edit_with_commit(
        &mut self,
        path: &str,
        commit_message: &str,
        new_content: &str,
    ) -> Result<(), WorkspaceError> {
        let file = self
            .files
            .get_mut(path)
            .ok_or_else(|| WorkspaceError::NotFound {
                path: path.to_string(),
            })?;
        file.push(commit_message.to_string());
        file.push(new_content.to_string());
        Ok(())
    }

    /// List paths under a first-level directory.
    ///
    /// `""` lists everything, `"root"` lists paths without a `/`, anything
    /// else matches on the first `/`-delimited segment.
    pub fn list(&self, dir: &str) -> Vec<String> {
        self.files
            .keys()
            .filter(|path| dir_matches(path, dir))
            .cloned()
            .collect()
    }

    pub fn get(&self, path: &str) -> Option<&FileHistory> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn history_len(&self, path: &str) -> usize {
        self.files.get(path).map(FileHistory::len).unwrap_or(0)
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileHistory)> {
        self.files.iter()
    }

    /// Copy of this workspace holding only `paths` that exist.
    pub fn select<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> Workspace {
        let files = paths
            .into_iter()
            .filter_map(|p| self.files.get(p).map(|f| (p.to_string(), f.clone())))
            .collect();
        Workspace { files }
    }

    /// Merge `other` into `self`, replacing whole histories per path.
    ///
    /// Returns the paths that were written.
    pub fn merge(&mut self, other: Workspace) -> Vec<String> {
        let mut touched = Vec::with_capacity(other.files.len());
        for (path, history) in other.files {
            touched.push(path.clone());
            self.files.insert(path, history);
        }
        touched
    }

    fn require(&self, path: &str) -> Result<&FileHistory, WorkspaceError> {
        self.files.get(path).ok_or_else(|| WorkspaceError::NotFound {
            path: path.to_string(),
        })
    }
}

fn dir_matches(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    match path.split_once('/') {
        Some((first, _)) => first == dir,
        None => dir == ROOT_DIR,
    }
}

/// Format `content` as numbered lines: a 6-wide right-aligned 1-based line
/// number, a tab, then the line cut to [`MAX_LINE_CHARS`].
pub fn format_lines(content: &str, offset: usize, limit: usize) -> Result<String, WorkspaceError> {
    if content.trim().is_empty() {
        return Ok(EMPTY_FILE_REMINDER.to_string());
    }

    let lines: Vec<&str> = content.lines().collect();
    if offset >= lines.len() {
        return Err(WorkspaceError::OffsetOutOfRange {
            offset,
            total: lines.len(),
        });
    }

    let end = offset.saturating_add(limit).min(lines.len());
    let formatted: Vec<String> = lines[offset..end]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{}", offset + i + 1, truncate_chars(line, MAX_LINE_CHARS)))
        .collect();

    Ok(formatted.join("\n"))
}

fn truncate_chars(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
