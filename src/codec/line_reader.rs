//! Line splitter over a fully buffered file.
//!
//! Splits on `\n`, drops a trailing `\r`, and counts lines (1-based) for error
//! reporting. The newline convention is decided once, from the first `\n`.

#[derive(Debug, Clone)]
pub struct LineReader<'a> {
    content: &'a str,
    pos: usize,
    line_number: usize,
    unix_newlines: bool,
}

impl<'a> LineReader<'a> {
    pub fn for_string(content: &'a str) -> Self {
        let unix_newlines = match content.find('\n') {
            Some(idx) => !content[..idx].ends_with('\r'),
            None => true,
        };
        Self {
            content,
            pos: 0,
            line_number: 0,
            unix_newlines,
        }
    }

    pub fn unix_newlines(&self) -> bool {
        self.unix_newlines
    }

    /// Number of the line most recently returned by `read_line`.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn read_line(&mut self) -> Option<&'a str> {
        if self.pos >= self.content.len() {
            return None;
        }
        let rest = &self.content[self.pos..];
        let (line, advance) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], idx + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        self.line_number += 1;
        Some(line.strip_suffix('\r').unwrap_or(line))
    }
}
