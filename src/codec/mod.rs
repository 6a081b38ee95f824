//! codec — текстовый формат файлов снапшотов.
//!
//! Layout of one entry:
//!
//! ```text
//! ╔═ key ═╗
//! body line 1
//! body line 2
//! ╔═ key[facet] ═╗ base64 length 3 bytes
//! c2Fk
//! ╔═ [end of file] ═╗
//! ```
//!
//! - Keys and facet names go through `name_escaper()`, so no escaped name can
//!   contain a structural `[`, `]` or box-drawing character.
//! - String bodies go through `body_escaper()`; a body line that would start with
//!   `╔` is written starting with the private-use marker `𐑁` instead.
//! - Binary bodies are base64 in 76-column lines.

pub mod line_reader;
pub mod reader;
pub mod writer;

use std::sync::OnceLock;

use crate::escape::PerCharacterEscaper;

pub use line_reader::LineReader;
pub use reader::{EntryKey, SnapshotReader, SnapshotValueReader};
pub use writer::{write_end_of_file, write_entry};

pub const HEADER_START: &str = "╔═ ";
pub const HEADER_END: &str = " ═╗";
pub const FLAG_BASE64: &str = " base64 length ";
pub const END_OF_FILE: &str = "[end of file]";
pub(crate) const END_OF_FILE_FACET: &str = "end of file";

pub(crate) const HEADER_CHAR: char = '╔';
pub(crate) const BODY_ESCAPE: char = '\u{10443}';
pub(crate) const BODY_MARKER: char = '\u{10441}';

const BASE64_LINE: usize = 76;

pub fn name_escaper() -> &'static PerCharacterEscaper {
    static ESC: OnceLock<PerCharacterEscaper> = OnceLock::new();
    ESC.get_or_init(|| {
        PerCharacterEscaper::specified_escape(
            '\\',
            &[
                ('[', '('),
                (']', ')'),
                ('\n', 'n'),
                ('\t', 't'),
                ('╔', '┌'),
                ('╗', '┐'),
                ('═', '─'),
            ],
        )
    })
}

pub fn body_escaper() -> &'static PerCharacterEscaper {
    static ESC: OnceLock<PerCharacterEscaper> = OnceLock::new();
    ESC.get_or_init(|| PerCharacterEscaper::self_escape(BODY_ESCAPE, &[BODY_MARKER]))
}

pub(crate) fn encode_base64_lines(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let flat = STANDARD.encode(bytes);
    let mut out = String::with_capacity(flat.len() + flat.len() / BASE64_LINE + 1);
    for (i, chunk) in flat.as_bytes().chunks(BASE64_LINE).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // base64 alphabet is ASCII
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    out
}

pub(crate) fn decode_base64_lines(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    let cleaned: String = text.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    STANDARD.decode(cleaned.as_bytes())
}

/// `\n` → `\r\n`, for files that use windows newlines.
pub fn to_windows_newlines(s: &str) -> String {
    s.replace('\n', "\r\n")
}
