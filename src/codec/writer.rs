//! codec/writer — serialisation of single entries.
//!
//! Output always uses `\n`; `SnapshotFile::serialize` converts to `\r\n` when the
//! file tree uses windows newlines.

use crate::snapshot::SnapshotValue;

use super::{
    body_escaper, encode_base64_lines, name_escaper, BODY_MARKER, END_OF_FILE_FACET,
    FLAG_BASE64, HEADER_CHAR, HEADER_END, HEADER_START,
};

/// Appends `╔═ key[facet] ═╗` plus the body.
pub fn write_entry(out: &mut String, key: &str, facet: Option<&str>, value: &SnapshotValue) {
    out.push_str(HEADER_START);
    out.push_str(&name_escaper().escape(key));
    if let Some(f) = facet {
        out.push('[');
        out.push_str(&name_escaper().escape(f));
        out.push(']');
    }
    out.push_str(HEADER_END);
    match value {
        SnapshotValue::Binary(bytes) => {
            out.push_str(FLAG_BASE64);
            out.push_str(&bytes.len().to_string());
            out.push_str(" bytes\n");
            out.push_str(&encode_base64_lines(bytes));
        }
        SnapshotValue::String(text) => {
            out.push('\n');
            push_body(out, text);
        }
    }
    out.push('\n');
}

/// The sentinel entry: a header with no body.
pub fn write_end_of_file(out: &mut String) {
    out.push_str(HEADER_START);
    out.push('[');
    out.push_str(END_OF_FILE_FACET);
    out.push(']');
    out.push_str(HEADER_END);
    out.push('\n');
}

fn push_body(out: &mut String, text: &str) {
    let escaped = body_escaper().escape(text);
    let mut first = true;
    for line in escaped.split('\n') {
        if !first {
            out.push('\n');
        }
        first = false;
        match line.strip_prefix(HEADER_CHAR) {
            Some(rest) => {
                out.push(BODY_MARKER);
                out.push_str(rest);
            }
            None => out.push_str(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SnapshotValueReader;

    #[test]
    fn header_with_escaped_names() {
        let mut out = String::new();
        write_entry(&mut out, "a[1]", Some("tab\there"), &SnapshotValue::string("v"));
        assert_eq!(out, "╔═ a\\(1\\)[tab\\there] ═╗\nv\n");
    }

    #[test]
    fn structural_text_in_body_roundtrips() {
        let body = "╔═ fake ═╗\n╔\n\u{10441} and \u{10443}";
        let mut out = String::new();
        write_entry(&mut out, "k", None, &SnapshotValue::string(body));
        assert!(!out[out.find('\n').unwrap() + 1..].contains("\n╔"));
        let mut r = SnapshotValueReader::of(&out);
        assert_eq!(r.next_value().unwrap(), SnapshotValue::string(body));
    }

    #[test]
    fn binary_body_is_wrapped_base64() {
        let bytes: Vec<u8> = (0..200u8).collect();
        let mut out = String::new();
        write_entry(&mut out, "bin", None, &SnapshotValue::binary(bytes.clone()));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "╔═ bin ═╗ base64 length 200 bytes");
        assert!(lines[1..].iter().all(|l| l.len() <= 76));
        let mut r = SnapshotValueReader::of(&out);
        assert_eq!(r.next_value().unwrap(), SnapshotValue::binary(bytes));
    }
}
