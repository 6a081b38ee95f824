//! Source literal rewriter.
//!
//! `SourceFile` holds one test source file with newlines normalised to `\n` (the
//! original convention is restored by `as_string`). `parse_to_be_like(line)` finds the
//! first inline-assertion call on a line and delimits its single scalar argument;
//! the returned `ToBeLiteral` can parse that argument or replace it.

use std::ops::Range;

use crate::error::{Result, SelfieError};
use crate::literals::{rust_raw_hashes, EscapeLeadingWhitespace, Language, LiteralFormat, Literal, LiteralValue};

const TRIPLE_QUOTE: &str = "\"\"\"";

/// Call tokens that carry a single literal argument.
pub const TO_BE_LIKES: [&str; 4] = [".to_be(", ".to_be_TODO(", ".to_be_base64(", ".to_be_base64_TODO("];

pub struct SourceFile {
    name: String,
    unix_newlines: bool,
    content: String,
    language: Language,
    escape_leading_whitespace: EscapeLeadingWhitespace,
}

impl SourceFile {
    /// `name` only needs the extension (it picks the language).
    pub fn new(name: &str, content: &str) -> Result<Self> {
        let language = Language::from_filename(name)?;
        let unix_newlines = !content.contains('\r');
        let content = content.replace("\r\n", "\n");
        Ok(Self {
            name: name.to_string(),
            unix_newlines,
            escape_leading_whitespace: EscapeLeadingWhitespace::appropriate_for(&content),
            content,
            language,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Content with the file's original newline convention.
    pub fn as_string(&self) -> String {
        if self.unix_newlines {
            self.content.clone()
        } else {
            self.content.replace('\n', "\r\n")
        }
    }

    /// Byte range of 1-based `line`, without its newline.
    pub fn unix_line(&self, line: usize) -> Result<Range<usize>> {
        if line == 0 {
            return Err(out_of_range(line));
        }
        let mut start = 0;
        for _ in 1..line {
            match self.content[start..].find('\n') {
                Some(idx) => start += idx + 1,
                None => return Err(out_of_range(line)),
            }
        }
        let end = self.content[start..]
            .find('\n')
            .map_or(self.content.len(), |idx| start + idx);
        Ok(start..end)
    }

    /// 1-based line containing byte `offset`.
    pub fn base_line_at_offset(&self, offset: usize) -> usize {
        1 + self.content[..offset.min(self.content.len())]
            .bytes()
            .filter(|b| *b == b'\n')
            .count()
    }

    fn char_at(&self, idx: usize) -> Option<char> {
        self.content.get(idx..).and_then(|s| s.chars().next())
    }

    pub fn replace_on_line(&mut self, line: usize, find: &str, replace: &str) -> Result<()> {
        if find.contains('\n') || replace.contains('\n') {
            return Err(SelfieError::invalid("replace_on_line works within a single line"));
        }
        let range = self.unix_line(line)?;
        let idx = self.content[range.clone()].find(find).ok_or_else(|| {
            SelfieError::RewriteScan(format!(
                "Expected to find `{}` on line {}, but there was only `{}`",
                find,
                line,
                &self.content[range.clone()]
            ))
        })?;
        let start = range.start + idx;
        self.content.replace_range(start..start + find.len(), replace);
        Ok(())
    }

    /// Removes every `selfieonce` line comment. Code before the comment stays; a line that
    /// held only the comment becomes empty. Markers inside strings or block comments are ignored.
    pub fn remove_selfie_once_comments(&mut self) -> usize {
        let mut removals = Vec::new();
        for comment in line_comments(&self.content, self.language) {
            let prefix = self.language.line_comment();
            let text = self.content[comment.clone()][prefix.len()..].trim();
            if text != "selfieonce" {
                continue;
            }
            let line_start = self.content[..comment.start].rfind('\n').map_or(0, |i| i + 1);
            let before = &self.content[line_start..comment.start];
            let from = line_start + before.trim_end().len();
            removals.push(from..comment.end);
        }
        for range in removals.iter().rev() {
            self.content.replace_range(range.clone(), "");
        }
        removals.len()
    }

    /// Locates the first `.to_be(`-like call on `line` and its argument.
    pub fn parse_to_be_like(&mut self, line: usize) -> Result<ToBeLiteral<'_>> {
        let range = self.unix_line(line)?;
        let line_text = &self.content[range.clone()];
        let (idx, token) = TO_BE_LIKES
            .iter()
            .filter_map(|t| line_text.find(t).map(|i| (i, *t)))
            .min_by_key(|(i, _)| *i)
            .ok_or_else(|| {
                SelfieError::RewriteScan(format!(
                    "Expected to find inline assertion on line {}, but there was only `{}`",
                    line, line_text
                ))
            })?;
        let call_start = range.start + idx;
        let unclosed_call = || {
            SelfieError::RewriteScan(format!(
                "Appears to be an unclosed function call `{})` on line {}",
                token, line
            ))
        };

        let mut arg_start = call_start + token.len();
        loop {
            match self.char_at(arg_start) {
                None => return Err(unclosed_call()),
                Some(c) if c.is_whitespace() => arg_start += c.len_utf8(),
                Some(_) => break,
            }
        }

        let rest = &self.content[arg_start..];
        let end_arg = if self.language == Language::Python && rest.starts_with(TRIPLE_QUOTE) {
            scan_string_end(&self.content, arg_start + TRIPLE_QUOTE.len(), TRIPLE_QUOTE).ok_or_else(|| {
                SelfieError::RewriteScan(format!(
                    "Appears to be an unclosed multiline string literal `{}` on line {}",
                    TRIPLE_QUOTE, line
                ))
            })?
        } else if let Some(hashes) = rust_raw_hashes(rest).filter(|_| self.language == Language::Rust) {
            // raw strings have no escapes: the first `"` followed by the same number of `#` closes
            let close = format!("\"{}", "#".repeat(hashes));
            let body = arg_start + hashes + 2;
            self.content[body..]
                .find(close.as_str())
                .map(|i| body + i + close.len())
                .ok_or_else(|| {
                    SelfieError::RewriteScan(format!(
                        "Appears to be an unclosed raw string literal `r{}\"` on line {}",
                        "#".repeat(hashes),
                        line
                    ))
                })?
        } else if rest.starts_with('"') {
            scan_string_end(&self.content, arg_start + 1, "\"").ok_or_else(|| {
                SelfieError::RewriteScan(format!(
                    "Appears to be an unclosed string literal `\"` on line {}",
                    line
                ))
            })?
        } else {
            // bare literal or `Debug` expression: ends at whitespace or `)` outside brackets and quotes,
            // except that `Name { .. }` continues across the space before its brace
            let unclosed = || {
                SelfieError::RewriteScan(format!(
                    "Appears to be an unclosed literal on line {}",
                    line
                ))
            };
            let mut end = arg_start;
            let mut depth = 0usize;
            loop {
                match self.char_at(end) {
                    None => return Err(unclosed()),
                    Some(')') if depth == 0 => break,
                    Some(c) if depth == 0 && c.is_whitespace() => {
                        let gap = self.content[end..].len() - self.content[end..].trim_start().len();
                        if self.char_at(end + gap) != Some('{') {
                            break;
                        }
                        end += gap;
                    }
                    Some(c @ ('(' | '[' | '{')) => {
                        depth += 1;
                        end += c.len_utf8();
                    }
                    Some(c @ (')' | ']' | '}')) => {
                        depth = depth.saturating_sub(1);
                        end += c.len_utf8();
                    }
                    Some(q @ ('"' | '\'')) => {
                        let close = if q == '"' { "\"" } else { "'" };
                        end = scan_string_end(&self.content, end + 1, close).ok_or_else(unclosed)?;
                    }
                    Some(c) => end += c.len_utf8(),
                }
            }
            end
        };

        let mut end_paren = end_arg;
        loop {
            match self.char_at(end_paren) {
                None => {
                    return Err(SelfieError::RewriteScan(format!(
                        "Appears to be an unclosed function call `{})` starting at line {}",
                        token, line
                    )))
                }
                Some(')') => break,
                Some(c) if c.is_whitespace() => end_paren += c.len_utf8(),
                Some(c) => {
                    return Err(SelfieError::RewriteScan(format!(
                        "Non-primitive literal in `{})` starting at line {}: error for character `{}` on line {}",
                        token,
                        line,
                        c,
                        self.base_line_at_offset(end_paren)
                    )))
                }
            }
        }

        Ok(ToBeLiteral {
            dot_fun_open_paren: token.replace("_TODO", ""),
            call: call_start..end_paren + 1,
            arg: arg_start..end_arg,
            file: self,
        })
    }
}

fn out_of_range(line: usize) -> SelfieError {
    SelfieError::RewriteScan(format!("Line {} is out of range for this file", line))
}

/// Byte offset just past the closing `close`, honouring backslash escapes.
fn scan_string_end(content: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    let close = close.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(close) {
            return Some(i + close.len());
        }
        i += 1;
    }
    None
}

/// The call span and argument span of one inline assertion, borrowed from its file.
pub struct ToBeLiteral<'a> {
    file: &'a mut SourceFile,
    dot_fun_open_paren: String,
    call: Range<usize>,
    arg: Range<usize>,
}

impl ToBeLiteral<'_> {
    /// The whole `.to_be(ARG)` text.
    pub fn function_call_plus_arg(&self) -> &str {
        &self.file.content[self.call.clone()]
    }

    pub fn arg(&self) -> &str {
        &self.file.content[self.arg.clone()]
    }

    pub fn parse_literal(&self, format: LiteralFormat) -> Result<Literal> {
        format.parse(self.arg(), self.file.language)
    }

    /// Replaces the call with the encoded `actual` value, after checking that the
    /// encoding parses back to the same value. Returns the change in line count.
    pub fn set_literal_and_get_newline_delta(self, literal: &LiteralValue) -> Result<isize> {
        let language = self.file.language;
        let encoded = literal
            .actual
            .encode(language, self.file.escape_leading_whitespace)?;
        let round_tripped = literal.format().parse(&encoded, language);
        if round_tripped.as_ref().ok() != Some(&literal.actual) {
            let shown = match &round_tripped {
                Ok(v) => v.to_string(),
                Err(e) => format!("<parse error: {}>", e),
            };
            return Err(SelfieError::Consistency(format!(
                "There is an error in {:?}, the following value isn't round tripping.\n\
                 Please report this as a bug, along with the data below.\n\
                 ```\nORIGINAL\n{}\nROUNDTRIPPED\n{}\nENCODED ORIGINAL\n{}\n```\n",
                literal.format(),
                literal.actual,
                shown,
                encoded
            )));
        }
        let existing = count_newlines(self.function_call_plus_arg());
        let added = count_newlines(&encoded);
        let replacement = format!("{}{})", self.dot_fun_open_paren, encoded);
        self.file.content.replace_range(self.call.clone(), &replacement);
        Ok(added as isize - existing as isize)
    }
}

fn count_newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

// ----- comment lexer -----

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    LineComment(usize),
    BlockComment(u32),
    Str(&'static str),
    RawStr(usize),
}

/// Byte ranges of every line comment (prefix included, newline excluded), skipping
/// anything inside string literals and block comments.
pub(crate) fn line_comments(content: &str, language: Language) -> Vec<Range<usize>> {
    let chars: Vec<(usize, char)> = content.char_indices().collect();
    let at = |i: usize| chars.get(i).map(|(_, c)| *c);
    let starts = |i: usize, s: &str| chars.get(i).map_or(false, |(b, _)| content[*b..].starts_with(s));
    let mut out = Vec::new();
    let mut state = Lex::Code;
    let mut i = 0;
    while i < chars.len() {
        let (byte, c) = chars[i];
        match state {
            Lex::LineComment(start) => {
                if c == '\n' {
                    out.push(start..byte);
                    state = Lex::Code;
                }
                i += 1;
            }
            Lex::BlockComment(depth) => {
                if starts(i, "*/") {
                    state = if depth <= 1 { Lex::Code } else { Lex::BlockComment(depth - 1) };
                    i += 2;
                } else if starts(i, "/*") {
                    state = Lex::BlockComment(depth + 1);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            Lex::Str(close) => {
                if c == '\\' {
                    i += 2;
                } else if starts(i, close) {
                    state = Lex::Code;
                    i += close.chars().count();
                } else {
                    i += 1;
                }
            }
            Lex::RawStr(hashes) => {
                let closes = c == '"'
                    && content[byte + 1..].bytes().take(hashes).filter(|b| *b == b'#').count() == hashes;
                if closes {
                    state = Lex::Code;
                    i += 1 + hashes;
                } else {
                    i += 1;
                }
            }
            Lex::Code => match language {
                Language::Rust => {
                    if starts(i, "//") {
                        state = Lex::LineComment(byte);
                        i += 2;
                    } else if starts(i, "/*") {
                        state = Lex::BlockComment(1);
                        i += 2;
                    } else if let Some(hashes) = rust_raw_hashes(&content[byte..]) {
                        state = Lex::RawStr(hashes);
                        i += hashes + 2;
                    } else if c == '"' {
                        state = Lex::Str("\"");
                        i += 1;
                    } else if c == '\'' {
                        // char literal or lifetime
                        i += match (at(i + 1), at(i + 2)) {
                            (Some('\\'), _) => {
                                let mut j = i + 3;
                                while j < chars.len() && at(j) != Some('\'') {
                                    j += 1;
                                }
                                j + 1 - i
                            }
                            (Some(_), Some('\'')) => 3,
                            _ => 1,
                        };
                    } else {
                        i += 1;
                    }
                }
                Language::Python => {
                    if c == '#' {
                        state = Lex::LineComment(byte);
                        i += 1;
                    } else if starts(i, "\"\"\"") {
                        state = Lex::Str("\"\"\"");
                        i += 3;
                    } else if starts(i, "'''") {
                        state = Lex::Str("'''");
                        i += 3;
                    } else if c == '"' {
                        state = Lex::Str("\"");
                        i += 1;
                    } else if c == '\'' {
                        state = Lex::Str("'");
                        i += 1;
                    } else {
                        i += 1;
                    }
                }
            },
        }
    }
    if let Lex::LineComment(start) = state {
        out.push(start..content.len());
    }
    out
}
