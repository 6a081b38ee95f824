//! Режим работы движка: interactive / readonly / overwrite.
//!
//! - interactive: пишет только `_TODO` вызовы и файлы с комментарием `selfieonce`/`SELFIEWRITE`.
//! - readonly: ничего не пишет; комментарий-маркер в исходнике является ошибкой (CI).
//! - overwrite: пишет всё.

use std::fmt;
use std::str::FromStr;

use crate::call::CallStack;
use crate::comment_tracker::CommentTracker;
use crate::error::{Result, SelfieError};
use crate::layout::SnapshotFileLayout;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    Interactive,
    Readonly,
    Overwrite,
}

impl Mode {
    /// Whether a write at `call` is allowed. Readonly mode refuses loudly when the source
    /// still carries a writable comment, since that comment must never reach CI.
    pub fn can_write(
        self,
        is_todo: bool,
        call: &CallStack,
        comments: &CommentTracker,
        layout: &SnapshotFileLayout,
    ) -> anyhow::Result<bool> {
        match self {
            Mode::Interactive => Ok(is_todo || comments.has_writable_comment(call, layout)?),
            Mode::Readonly => {
                if comments.has_writable_comment(call, layout)? {
                    let path = layout.source_path_for_call(&call.location);
                    let (comment, line) = comments.comment_string(&path, layout)?;
                    Err(SelfieError::ModeViolation(format!(
                        "Selfie is in readonly mode, so `{}` is illegal at {}",
                        comment,
                        call.location.with_line(line).ide_link()
                    ))
                    .into())
                } else {
                    Ok(false)
                }
            }
            Mode::Overwrite => Ok(true),
        }
    }

    pub fn msg_snapshot_not_found(self) -> String {
        self.msg("Snapshot not found")
    }

    pub fn msg_snapshot_not_found_no_such_file(self, file: &str) -> String {
        self.msg(&format!("Snapshot not found: no such file {}", file))
    }

    pub fn msg_snapshot_mismatch(self, expected: &str, actual: &str) -> String {
        self.msg(&mismatch_headline(expected, actual))
    }

    pub fn msg_snapshot_mismatch_binary(self, expected: &[u8], actual: &[u8]) -> String {
        let headline = match expected.iter().zip(actual).position(|(e, a)| e != a) {
            Some(idx) => format!("Snapshot mismatch at byte {}", idx),
            None => format!(
                "Snapshot mismatch: expected {} bytes, found {}",
                expected.len(),
                actual.len()
            ),
        };
        self.msg(&headline)
    }

    /// The file on disk differs from what the test produced, but only in a way the
    /// version-control line-ending conversion could cause.
    pub fn msg_vcs_mismatch(self) -> String {
        self.msg("Snapshot mismatch, only line endings differ (check your VCS newline settings)")
    }

    fn msg(self, headline: &str) -> String {
        match self {
            Mode::Interactive => format!(
                "{}\n- update this snapshot by adding `_TODO` to the function name\n- update all snapshots in this file by adding `//selfieonce` or `//SELFIEWRITE`",
                headline
            ),
            Mode::Readonly => headline.to_string(),
            Mode::Overwrite => format!(
                "{}\n(didn't expect this to ever happen in overwrite mode)",
                headline
            ),
        }
    }
}

impl FromStr for Mode {
    type Err = SelfieError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" => Ok(Mode::Interactive),
            "readonly" => Ok(Mode::Readonly),
            "overwrite" => Ok(Mode::Overwrite),
            other => Err(SelfieError::invalid(format!(
                "Unknown selfie mode `{}`, expected interactive, readonly or overwrite",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Interactive => "interactive",
            Mode::Readonly => "readonly",
            Mode::Overwrite => "overwrite",
        })
    }
}

/// `Snapshot mismatch at L{line}:C{col}` followed by the first differing line of each
/// side, or a `line(s) added/removed` headline when one side is a prefix of the other
/// up to a line boundary.
pub fn mismatch_headline(expected: &str, actual: &str) -> String {
    let exp: Vec<char> = expected.chars().collect();
    let act: Vec<char> = actual.chars().collect();
    let mut line = 1usize;
    let mut col = 1usize;
    let mut line_start = 0usize;
    let mut idx = 0usize;
    while idx < exp.len() && idx < act.len() {
        if exp[idx] != act[idx] {
            return format!(
                "Snapshot mismatch at L{}:C{}\n-{}\n+{}",
                line,
                col,
                line_from(&exp, line_start),
                line_from(&act, line_start)
            );
        }
        if exp[idx] == '\n' {
            line += 1;
            col = 1;
            line_start = idx + 1;
        } else {
            col += 1;
        }
        idx += 1;
    }
    let at_line_boundary = idx == 0 || exp[idx - 1] == '\n';
    if exp.len() != act.len() && at_line_boundary {
        let (longer, sign, what) = if act.len() > exp.len() {
            (&act, '+', "added")
        } else {
            (&exp, '-', "removed")
        };
        return format!(
            "Snapshot mismatch at L{}:C1 - line(s) {}\n{}{}",
            line,
            what,
            sign,
            line_from(longer, idx)
        );
    }
    format!(
        "Snapshot mismatch at L{}:C{}\n-{}\n+{}",
        line,
        col,
        line_from(&exp, line_start),
        line_from(&act, line_start)
    )
}

fn line_from(chars: &[char], start: usize) -> String {
    chars
        .iter()
        .skip(start)
        .take_while(|c| **c != '\n')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes_case_insensitively() {
        assert_eq!("Readonly".parse::<Mode>().unwrap(), Mode::Readonly);
        assert_eq!(" overwrite ".parse::<Mode>().unwrap(), Mode::Overwrite);
        let err = "loud".parse::<Mode>().unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn headline_points_at_first_difference() {
        assert_eq!(
            mismatch_headline("abc\ndef\n", "abc\ndxf\n"),
            "Snapshot mismatch at L2:C2\n-def\n+dxf"
        );
    }

    #[test]
    fn headline_reports_added_and_removed_lines() {
        assert_eq!(
            mismatch_headline("a\n", "a\nb\n"),
            "Snapshot mismatch at L2:C1 - line(s) added\n+b"
        );
        assert_eq!(
            mismatch_headline("a\nb\n", "a\n"),
            "Snapshot mismatch at L2:C1 - line(s) removed\n-b"
        );
    }

    #[test]
    fn readonly_message_is_bare() {
        assert_eq!(Mode::Readonly.msg_snapshot_not_found(), "Snapshot not found");
        assert!(Mode::Interactive
            .msg_snapshot_not_found()
            .contains("adding `_TODO`"));
        assert!(Mode::Overwrite
            .msg_snapshot_not_found()
            .ends_with("overwrite mode)"));
    }
}
