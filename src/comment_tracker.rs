//! Tracks `selfieonce` / `SELFIEWRITE` line comments per test source file.
//!
//! The scan result is cached per path for the whole run; files marked `selfieonce` are
//! remembered so the marker can be stripped when the suite finishes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use log::debug;

use crate::call::CallStack;
use crate::layout::SnapshotFileLayout;
use crate::literals::Language;
use crate::source_file::line_comments;

pub const ONCE: &str = "selfieonce";
pub const FOREVER: &str = "SELFIEWRITE";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WritableComment {
    NoComment,
    Once,
    Forever,
}

impl WritableComment {
    pub fn writable(self) -> bool {
        self != WritableComment::NoComment
    }
}

#[derive(Default)]
pub struct CommentTracker {
    cache: Mutex<BTreeMap<PathBuf, WritableComment>>,
}

impl CommentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source files seen so far that carry a `selfieonce` marker.
    pub fn paths_with_once(&self) -> Vec<PathBuf> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .iter()
            .filter(|(_, c)| **c == WritableComment::Once)
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn has_writable_comment(&self, call: &CallStack, layout: &SnapshotFileLayout) -> Result<bool> {
        let path = layout.source_path_for_call(&call.location);
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(comment) = cache.get(&path) {
                return Ok(comment.writable());
            }
        }
        // scan without holding the lock
        let (comment, _) = comment_and_line(&path, layout)?;
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let comment = *cache.entry(path).or_insert(comment);
        Ok(comment.writable())
    }

    /// The marker as written in `path` and its 1-based line.
    pub fn comment_string(&self, path: &Path, layout: &SnapshotFileLayout) -> Result<(String, usize)> {
        let language = Language::from_filename(&path.to_string_lossy())?;
        let prefix = language.line_comment();
        match comment_and_line(path, layout)? {
            (WritableComment::NoComment, _) => Err(anyhow!(
                "no `{}{}` or `{}{}` comment in {}",
                prefix,
                ONCE,
                prefix,
                FOREVER,
                path.display()
            )),
            (WritableComment::Once, line) => Ok((format!("{}{}", prefix, ONCE), line)),
            (WritableComment::Forever, line) => Ok((format!("{}{}", prefix, FOREVER), line)),
        }
    }
}

/// Reads `path` through the layout's filesystem and scans it. A source file that cannot
/// be found (e.g. generated code) has no comment.
pub fn comment_and_line(path: &Path, layout: &SnapshotFileLayout) -> Result<(WritableComment, usize)> {
    if !layout.fs().file_exists(path) {
        debug!("comment scan: {} not found, treating as uncommented", path.display());
        return Ok((WritableComment::NoComment, 0));
    }
    let language = Language::from_filename(&path.to_string_lossy())?;
    let content = layout.fs().file_read(path)?;
    Ok(scan(&content, language))
}

/// A `selfieonce` marker anywhere wins over `SELFIEWRITE`. Markers inside strings or
/// block comments do not count.
pub fn scan(content: &str, language: Language) -> (WritableComment, usize) {
    let prefix = language.line_comment();
    let mut forever = None;
    for range in line_comments(content, language) {
        let body = content[range.clone()][prefix.len()..].trim();
        let line = 1 + content[..range.start].matches('\n').count();
        if body == ONCE {
            return (WritableComment::Once, line);
        }
        if body == FOREVER && forever.is_none() {
            forever = Some(line);
        }
    }
    match forever {
        Some(line) => (WritableComment::Forever, line),
        None => (WritableComment::NoComment, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_markers_with_and_without_space() {
        let src = "fn a() {}\n// selfieonce\n";
        assert_eq!(scan(src, Language::Rust), (WritableComment::Once, 2));
        let src = "x = 1  #SELFIEWRITE\n";
        assert_eq!(scan(src, Language::Python), (WritableComment::Forever, 1));
    }

    #[test]
    fn once_wins_over_forever() {
        let src = "//SELFIEWRITE\nlet a = 1;\n//selfieonce\n";
        assert_eq!(scan(src, Language::Rust), (WritableComment::Once, 3));
    }

    #[test]
    fn ignores_markers_in_strings_and_other_text() {
        let src = "let s = \"//selfieonce\";\n/* //SELFIEWRITE */\n// selfieonce please\n";
        assert_eq!(scan(src, Language::Rust), (WritableComment::NoComment, 0));
    }
}
