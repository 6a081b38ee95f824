//! codec/reader — последовательное чтение записей снапшотов.
//!
//! Назначение:
//! - `SnapshotValueReader`: one entry at a time (header + body), with a
//!   non-consuming `peek_entry()` / `peek_key()` and a consuming `next_value()`.
//! - `SnapshotReader`: groups a root entry with the facet entries that follow it.
//!
//! The header is split on its structural `[` `]` before names are unescaped, so a
//! key that itself contains brackets survives the round trip.
//!
//! Every failure is `SelfieError::Parse` with the 1-based line of the offending input.

use crate::error::{Result, SelfieError};
use crate::snapshot::{Snapshot, SnapshotValue};

use super::{
    body_escaper, decode_base64_lines, name_escaper, LineReader, BODY_MARKER, END_OF_FILE,
    END_OF_FILE_FACET, FLAG_BASE64, HEADER_CHAR, HEADER_END, HEADER_START,
};

/// Unescaped key of one entry: `root` or `root[facet]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryKey {
    pub root: String,
    pub facet: Option<String>,
}

impl EntryKey {
    pub fn is_end_of_file(&self) -> bool {
        self.root.is_empty() && self.facet.as_deref() == Some(END_OF_FILE_FACET)
    }

    /// Human-readable form, as it appears (unescaped) in a header.
    pub fn display(&self) -> String {
        match &self.facet {
            Some(f) => format!("{}[{}]", self.root, f),
            None => self.root.clone(),
        }
    }
}

struct Header<'a> {
    raw_key: &'a str,
    base64_len: Option<usize>,
}

pub struct SnapshotValueReader<'a> {
    lines: LineReader<'a>,
    line: Option<&'a str>,
}

impl<'a> SnapshotValueReader<'a> {
    pub fn of(content: &'a str) -> Self {
        Self {
            lines: LineReader::for_string(content),
            line: None,
        }
    }

    pub fn unix_newlines(&self) -> bool {
        self.lines.unix_newlines()
    }

    pub fn line_number(&self) -> usize {
        self.lines.line_number()
    }

    pub(crate) fn err(&self, message: impl Into<String>) -> SelfieError {
        SelfieError::parse(self.lines.line_number(), message)
    }

    fn next_line(&mut self) -> Option<&'a str> {
        if self.line.is_none() {
            self.line = self.lines.read_line();
        }
        self.line
    }

    fn reset_line(&mut self) {
        self.line = None;
    }

    fn parse_header(&self, line: &'a str) -> Result<Header<'a>> {
        let after_start = line
            .strip_prefix(HEADER_START)
            .ok_or_else(|| self.err(format!("Expected to start with '{}'", HEADER_START)))?;
        let end = after_start
            .find(HEADER_END)
            .ok_or_else(|| self.err(format!("Expected to contain '{}'", HEADER_END)))?;
        let raw_key = &after_start[..end];
        if raw_key.starts_with(' ') {
            return Err(self.err(format!("Leading spaces are disallowed: '{}'", raw_key)));
        }
        if raw_key.ends_with(' ') {
            return Err(self.err(format!("Trailing spaces are disallowed: '{}'", raw_key)));
        }
        let rest = &after_start[end + HEADER_END.len()..];
        let base64_len = if rest.is_empty() {
            None
        } else {
            let n = rest
                .strip_prefix(FLAG_BASE64)
                .and_then(|r| r.strip_suffix(" bytes"))
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| self.err(format!("Unexpected content after header: '{}'", rest)))?;
            Some(n)
        };
        Ok(Header { raw_key, base64_len })
    }

    fn unescape_name(&self, raw: &str) -> Result<String> {
        name_escaper()
            .unescape(raw)
            .map(|s| s.into_owned())
            .map_err(|e| self.err(e.to_string()))
    }

    fn split_key(&self, raw: &str) -> Result<EntryKey> {
        match raw.find('[') {
            None => Ok(EntryKey {
                root: self.unescape_name(raw)?,
                facet: None,
            }),
            Some(open) => {
                let facet_raw = raw[open + 1..]
                    .strip_suffix(']')
                    .ok_or_else(|| self.err(format!("Missing ] in {}", raw)))?;
                Ok(EntryKey {
                    root: self.unescape_name(&raw[..open])?,
                    facet: Some(self.unescape_name(facet_raw)?),
                })
            }
        }
    }

    /// Key of the next entry without consuming it; `None` at end of input.
    pub fn peek_entry(&mut self) -> Result<Option<EntryKey>> {
        let line = match self.next_line() {
            Some(l) => l,
            None => return Ok(None),
        };
        let header = self.parse_header(line)?;
        if header.raw_key == END_OF_FILE {
            return Ok(Some(EntryKey {
                root: String::new(),
                facet: Some(END_OF_FILE_FACET.to_string()),
            }));
        }
        self.split_key(header.raw_key).map(Some)
    }

    /// Display form of the next key (`root` or `root[facet]`).
    pub fn peek_key(&mut self) -> Result<Option<String>> {
        Ok(self.peek_entry()?.map(|k| {
            if k.is_end_of_file() {
                END_OF_FILE.to_string()
            } else {
                k.display()
            }
        }))
    }

    /// Consumes the next entry and returns its value.
    pub fn next_value(&mut self) -> Result<SnapshotValue> {
        let line = self
            .next_line()
            .ok_or_else(|| self.err("Expected an entry header, found end of input"))?;
        let header = self.parse_header(line)?;
        self.reset_line();

        let mut body = String::new();
        while let Some(line) = self.next_line() {
            if line.starts_with(HEADER_START) {
                break;
            }
            self.reset_line();
            match line.strip_prefix(BODY_MARKER) {
                Some(rest) => {
                    body.push(HEADER_CHAR);
                    body.push_str(rest);
                }
                None => body.push_str(line),
            }
            body.push('\n');
        }
        body.pop();

        match header.base64_len {
            Some(expected) => {
                let bytes = decode_base64_lines(&body)
                    .map_err(|e| self.err(format!("Invalid base64: {}", e)))?;
                if bytes.len() != expected {
                    return Err(self.err(format!(
                        "Expected {} bytes of base64 data, found {}",
                        expected,
                        bytes.len()
                    )));
                }
                Ok(SnapshotValue::binary(bytes))
            }
            None => {
                let text = body_escaper()
                    .unescape(&body)
                    .map_err(|e| self.err(e.to_string()))?;
                Ok(SnapshotValue::string(text))
            }
        }
    }
}

/// Reads whole snapshots: a root entry plus its facets.
pub struct SnapshotReader<'a> {
    values: SnapshotValueReader<'a>,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(values: SnapshotValueReader<'a>) -> Self {
        Self { values }
    }

    pub fn of(content: &'a str) -> Self {
        Self::new(SnapshotValueReader::of(content))
    }

    pub fn values(&mut self) -> &mut SnapshotValueReader<'a> {
        &mut self.values
    }

    /// Root key of the next snapshot; `None` at the end-of-file sentinel or end of input.
    pub fn peek_key(&mut self) -> Result<Option<String>> {
        match self.values.peek_entry()? {
            None => Ok(None),
            Some(k) if k.is_end_of_file() => Ok(None),
            Some(k) if k.facet.is_some() => Err(self.values.err(format!(
                "Missing root snapshot, square brackets not allowed: '{}'",
                k.display()
            ))),
            Some(k) => Ok(Some(k.root)),
        }
    }

    pub fn next_snapshot(&mut self) -> Result<Snapshot> {
        let root = self
            .peek_key()?
            .ok_or_else(|| self.values.err("Expected a snapshot, found end of file"))?;
        let mut snapshot = Snapshot::of(self.values.next_value()?);
        loop {
            let key = match self.values.peek_entry()? {
                Some(k) if !k.is_end_of_file() => k,
                _ => return Ok(snapshot),
            };
            let facet = match &key.facet {
                Some(f) => f.clone(),
                None => return Ok(snapshot),
            };
            if key.root != root {
                return Err(self.values.err(format!(
                    "Expected '{}' to come after '{}', not '{}'",
                    key.display(),
                    key.root,
                    root
                )));
            }
            let value = self.values.next_value()?;
            snapshot = snapshot
                .plus_facet(&facet, value)
                .map_err(|e| self.values.err(e.to_string()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peek_does_not_consume() {
        let mut r = SnapshotValueReader::of("╔═ a ═╗\nbody\n╔═ a[f] ═╗\nfacet\n");
        assert_eq!(r.peek_key().unwrap().as_deref(), Some("a"));
        assert_eq!(r.peek_key().unwrap().as_deref(), Some("a"));
        assert_eq!(r.next_value().unwrap(), SnapshotValue::string("body"));
        assert_eq!(r.peek_key().unwrap().as_deref(), Some("a[f]"));
        assert_eq!(r.next_value().unwrap(), SnapshotValue::string("facet"));
        assert_eq!(r.peek_key().unwrap(), None);
    }

    #[test]
    fn empty_and_multiline_bodies() {
        let mut r = SnapshotValueReader::of("╔═ e ═╗\n\n╔═ m ═╗\nline1\nline2\n\n╔═ [end of file] ═╗\n");
        assert_eq!(r.next_value().unwrap(), SnapshotValue::string(""));
        assert_eq!(r.next_value().unwrap(), SnapshotValue::string("line1\nline2\n"));
        assert_eq!(r.peek_key().unwrap().as_deref(), Some(END_OF_FILE));
    }

    #[test]
    fn marker_line_restores_header_char() {
        let mut r = SnapshotValueReader::of("╔═ k ═╗\nbefore\n\u{10441}═ not a header ═╗\n");
        assert_eq!(
            r.next_value().unwrap(),
            SnapshotValue::string("before\n╔═ not a header ═╗")
        );
    }

    #[test]
    fn header_errors_carry_line_numbers() {
        let mut r = SnapshotValueReader::of("╔═ ok ═╗\nx\n╔═  bad ═╗\n");
        r.next_value().unwrap();
        match r.peek_entry().unwrap_err() {
            SelfieError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("Leading spaces are disallowed"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut r = SnapshotValueReader::of("not a header\n");
        assert!(matches!(r.peek_entry(), Err(SelfieError::Parse { line: 1, .. })));
    }

    #[test]
    fn facet_must_follow_its_root() {
        let text = "╔═ a ═╗\nA\n╔═ b[f] ═╗\nF\n";
        let err = SnapshotReader::of(text).next_snapshot().unwrap_err();
        assert!(err
            .to_string()
            .contains("Expected 'b[f]' to come after 'b', not 'a'"));
    }

    #[test]
    fn base64_length_is_checked() {
        let mut r = SnapshotValueReader::of("╔═ b ═╗ base64 length 4 bytes\nc2Fk\n");
        assert!(r.next_value().is_err());
    }
}
