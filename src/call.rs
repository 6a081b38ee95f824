//! Call-site capture.
//!
//! A `CallStack` is captured once, at the public assertion boundary, with
//! `#[track_caller]`, and then passed explicitly to every layer below. It is the
//! identity used for inline-write deduplication and the anchor for source rewriting.

use std::fmt;
use std::path::{Path, PathBuf};

/// File path (as reported by the compiler, usually relative to the crate root) and 1-based line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallLocation {
    path: PathBuf,
    line: usize,
}

impl CallLocation {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }

    #[track_caller]
    pub fn caller() -> Self {
        let loc = std::panic::Location::caller();
        Self::new(loc.file(), loc.line() as usize)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn with_line(&self, line: usize) -> Self {
        Self::new(self.path.clone(), line)
    }

    pub fn same_path_as(&self, other: &CallLocation) -> bool {
        self.path == other.path
    }

    /// `path:line`, clickable in most terminals and IDEs.
    pub fn ide_link(&self) -> String {
        format!("{}:{}", self.path.display(), self.line)
    }
}

impl fmt::Display for CallLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ide_link())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallStack {
    pub location: CallLocation,
    pub rest_of_stack: Vec<CallLocation>,
}

impl CallStack {
    #[track_caller]
    pub fn capture() -> Self {
        Self::from_location(CallLocation::caller())
    }

    pub fn from_location(location: CallLocation) -> Self {
        Self {
            location,
            rest_of_stack: Vec::new(),
        }
    }

    pub fn ide_link(&self) -> String {
        self.location.ide_link()
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location.ide_link())?;
        for frame in &self.rest_of_stack {
            write!(f, "\n  called from {}", frame.ide_link())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_points_at_this_file() {
        let line = line!() as usize + 1;
        let stack = CallStack::capture();
        assert_eq!(stack.location.line(), line);
        assert_eq!(stack.location.file_name(), Some("call.rs"));
        assert!(stack.ide_link().ends_with(&format!("call.rs:{}", line)));
    }

    #[test]
    fn ordered_by_path_then_line() {
        let a = CallLocation::new("a.rs", 9);
        let b = CallLocation::new("a.rs", 10);
        let c = CallLocation::new("b.rs", 1);
        assert!(a < b && b < c);
        assert!(a.same_path_as(&b));
        assert_eq!(a.with_line(3).ide_link(), "a.rs:3");
    }
}
