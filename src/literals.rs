//! Literal formats for inline snapshots.
//!
//! - `Literal` is the closed set of scalar kinds an inline assertion can carry.
//! - `Literal::encode` renders source text for a `Language`; `LiteralFormat::parse`
//!   reads it back. For every representable value, `parse(encode(v)) == v`.
//! - Integers are grouped with `_` every three digits; `parse` strips the separators.

use std::fmt;
use std::path::Path;

use crate::error::{Result, SelfieError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
}

impl Language {
    pub fn from_filename(name: &str) -> Result<Self> {
        match Path::new(name).extension().and_then(|e| e.to_str()) {
            Some("rs") => Ok(Language::Rust),
            Some("py") => Ok(Language::Python),
            _ => Err(SelfieError::invalid(format!(
                "Unknown language for file {}",
                name
            ))),
        }
    }

    pub fn line_comment(self) -> &'static str {
        match self {
            Language::Rust => "//",
            Language::Python => "#",
        }
    }

    fn bool_literal(self, b: bool) -> &'static str {
        match (self, b) {
            (Language::Rust, true) => "true",
            (Language::Rust, false) => "false",
            (Language::Python, true) => "True",
            (Language::Python, false) => "False",
        }
    }
}

/// Which leading whitespace of a multi-line literal's lines gets escaped, so a
/// formatter re-indenting the file can't change the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeLeadingWhitespace {
    Always,
    Never,
    OnlyOnSpace,
    OnlyOnTab,
}

impl EscapeLeadingWhitespace {
    /// Files indented with spaces only need tabs escaped, and vice versa.
    pub fn appropriate_for(file_content: &str) -> Self {
        let mut common: Option<char> = None;
        for line in file_content.lines() {
            let ws: Vec<char> = line.chars().take_while(|c| c.is_whitespace()).collect();
            if ws.is_empty() {
                continue;
            }
            let kind = if ws.iter().all(|c| *c == ' ') {
                ' '
            } else if ws.iter().all(|c| *c == '\t') {
                '\t'
            } else {
                'm'
            };
            common = match common {
                None => Some(kind),
                Some(prev) if prev == kind => Some(prev),
                Some(_) => Some('m'),
            };
        }
        match common {
            Some(' ') => EscapeLeadingWhitespace::OnlyOnTab,
            Some('\t') => EscapeLeadingWhitespace::OnlyOnSpace,
            _ => EscapeLeadingWhitespace::Always,
        }
    }

    fn escapes_space(self) -> bool {
        matches!(
            self,
            EscapeLeadingWhitespace::Always | EscapeLeadingWhitespace::OnlyOnSpace
        )
    }

    fn escapes_tab(self) -> bool {
        matches!(
            self,
            EscapeLeadingWhitespace::Always | EscapeLeadingWhitespace::OnlyOnTab
        )
    }

    /// Replaces the first character of `line` with `space` or `tab` when the policy says so.
    pub fn escape_line(self, line: &str, space: &str, tab: &str) -> String {
        if let Some(rest) = line.strip_prefix(' ') {
            if self.escapes_space() {
                return format!("{}{}", space, rest);
            }
        } else if let Some(rest) = line.strip_prefix('\t') {
            if self.escapes_tab() {
                return format!("{}{}", tab, rest);
            }
        }
        line.to_string()
    }
}

/// A `_TODO` call with no literal argument of its own; persisting it just renames the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TodoStub {
    ToMatchDisk,
    ToBeFile,
}

impl TodoStub {
    pub fn method_name(self) -> &'static str {
        match self {
            TodoStub::ToMatchDisk => "to_match_disk",
            TodoStub::ToBeFile => "to_be_file",
        }
    }

    pub fn create_literal(self) -> LiteralValue {
        LiteralValue::new(None, Literal::Todo(self))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiteralFormat {
    Int,
    Str,
    Bool,
    Repr,
    Todo,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    Str(String),
    Bool(bool),
    /// Opaque source expression, written and read verbatim.
    Repr(String),
    Todo(TodoStub),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Repr(r) => f.write_str(r),
            Literal::Todo(t) => write!(f, "{}_TODO", t.method_name()),
        }
    }
}

impl Literal {
    pub fn format(&self) -> LiteralFormat {
        match self {
            Literal::Int(_) => LiteralFormat::Int,
            Literal::Str(_) => LiteralFormat::Str,
            Literal::Bool(_) => LiteralFormat::Bool,
            Literal::Repr(_) => LiteralFormat::Repr,
            Literal::Todo(_) => LiteralFormat::Todo,
        }
    }

    pub fn encode(&self, language: Language, esc: EscapeLeadingWhitespace) -> Result<String> {
        match self {
            Literal::Int(v) => Ok(encode_int(*v)),
            Literal::Bool(b) => Ok(language.bool_literal(*b).to_string()),
            Literal::Repr(r) => Ok(r.clone()),
            Literal::Str(s) => Ok(match language {
                Language::Rust => encode_rust_str(s, esc),
                Language::Python if s.contains('\n') => encode_python_multi(s, esc),
                Language::Python => encode_python_single(s),
            }),
            Literal::Todo(t) => Err(SelfieError::invalid(format!(
                "`{}_TODO` has no literal to encode",
                t.method_name()
            ))),
        }
    }
}

impl LiteralFormat {
    pub fn parse(self, text: &str, language: Language) -> Result<Literal> {
        let text = text.trim();
        match self {
            LiteralFormat::Int => parse_int(text).map(Literal::Int),
            LiteralFormat::Bool => match text {
                t if t == language.bool_literal(true) => Ok(Literal::Bool(true)),
                t if t == language.bool_literal(false) => Ok(Literal::Bool(false)),
                _ => Err(SelfieError::invalid(format!(
                    "Not a boolean literal: `{}`",
                    text
                ))),
            },
            LiteralFormat::Repr => Ok(Literal::Repr(text.to_string())),
            LiteralFormat::Str => match language {
                Language::Rust => parse_rust_str(text).map(Literal::Str),
                Language::Python => parse_python_str(text).map(Literal::Str),
            },
            LiteralFormat::Todo => Err(SelfieError::invalid(
                "A `_TODO` call has no literal to parse",
            )),
        }
    }
}

/// One inline write: `expected` is what the source held (None for a first-time
/// `_TODO` write), `actual` is what should be there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiteralValue {
    pub expected: Option<Literal>,
    pub actual: Literal,
}

impl LiteralValue {
    pub fn new(expected: Option<Literal>, actual: Literal) -> Self {
        Self { expected, actual }
    }

    pub fn format(&self) -> LiteralFormat {
        self.actual.format()
    }
}

// ----- integers -----

fn encode_int(value: i64) -> String {
    fn push_grouped(out: &mut String, v: u64) {
        if v >= 1000 {
            push_grouped(out, v / 1000);
            out.push('_');
            out.push_str(&format!("{:03}", v % 1000));
        } else {
            out.push_str(&v.to_string());
        }
    }
    let mut out = String::new();
    if value < 0 {
        out.push('-');
    }
    push_grouped(&mut out, value.unsigned_abs());
    out
}

const INT_SUFFIXES: [&str; 12] = [
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize",
];

fn parse_int(text: &str) -> Result<i64> {
    let mut digits = text;
    for suffix in INT_SUFFIXES {
        if let Some(d) = digits.strip_suffix(suffix) {
            digits = d;
            break;
        }
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    cleaned
        .parse::<i64>()
        .map_err(|_| SelfieError::invalid(format!("Not an integer literal: `{}`", text)))
}

// ----- rust strings -----

fn encode_rust_str(value: &str, esc: EscapeLeadingWhitespace) -> String {
    let lines: Vec<&str> = value.split('\n').collect();
    let last = lines.len() - 1;
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let chars: Vec<char> = line.chars().collect();
        for (j, &c) in chars.iter().enumerate() {
            match c {
                '\\' => out.push_str("\\\\"),
                '"' => out.push_str("\\\""),
                '\t' => out.push_str("\\t"),
                '\r' => out.push_str("\\r"),
                '\0' => out.push_str("\\0"),
                ' ' if i > 0 && j == 0 && esc.escapes_space() => out.push_str("\\x20"),
                ' ' if i < last && j + 1 == chars.len() => out.push_str("\\x20"),
                c if c.is_control() => out.push_str(&format!("\\u{{{:x}}}", c as u32)),
                c => out.push(c),
            }
        }
    }
    out.push('"');
    out
}

/// Number of `#` in a Rust raw string opener (`r"`, `r#"`, ...), if `text` starts with one.
pub(crate) fn rust_raw_hashes(text: &str) -> Option<usize> {
    let after_r = text.strip_prefix('r')?;
    let hashes = after_r.bytes().take_while(|b| *b == b'#').count();
    after_r[hashes..].starts_with('"').then_some(hashes)
}

fn parse_rust_str(text: &str) -> Result<String> {
    if let Some(hashes) = rust_raw_hashes(text) {
        let close = format!("\"{}", "#".repeat(hashes));
        return text[hashes + 2..]
            .strip_suffix(close.as_str())
            .filter(|inner| !inner.contains(close.as_str()))
            .map(str::to_string)
            .ok_or_else(|| SelfieError::invalid(format!("Not a raw string literal: `{}`", text)));
    }
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .filter(|_| text.len() >= 2)
        .ok_or_else(|| SelfieError::invalid(format!("Not a string literal: `{}`", text)))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let bad = || SelfieError::invalid(format!("Invalid escape in string literal `{}`", text));
        match chars.next().ok_or_else(bad)? {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '0' => out.push('\0'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad())?;
                out.push(char::from_u32(code).ok_or_else(bad)?);
            }
            'u' => {
                if chars.next() != Some('{') {
                    return Err(bad());
                }
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let code = u32::from_str_radix(&hex.replace('_', ""), 16).map_err(|_| bad())?;
                out.push(char::from_u32(code).ok_or_else(bad)?);
            }
            '\n' => {
                while chars.peek().map_or(false, |c| c.is_whitespace()) {
                    chars.next();
                }
            }
            _ => return Err(bad()),
        }
    }
    Ok(out)
}

// ----- python strings -----

fn push_python_char(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{8}' => out.push_str("\\b"),
        '\u{c}' => out.push_str("\\f"),
        c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}

fn encode_python_single(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => push_python_char(&mut out, c),
        }
    }
    out.push('"');
    out
}

fn encode_python_multi(value: &str, esc: EscapeLeadingWhitespace) -> String {
    let mut body = String::with_capacity(value.len() + 8);
    for (i, line) in value.split('\n').enumerate() {
        if i > 0 {
            body.push('\n');
        }
        let chars: Vec<char> = line.chars().collect();
        let mut escaped = String::with_capacity(line.len());
        for (j, &c) in chars.iter().enumerate() {
            let is_last = j + 1 == chars.len();
            match c {
                ' ' if is_last => escaped.push_str("\\u0020"),
                '\t' if is_last => escaped.push_str("\\t"),
                '\t' => escaped.push('\t'),
                c => push_python_char(&mut escaped, c),
            }
        }
        body.push_str(&esc.escape_line(&escaped, "\\u0020", "\\t"));
    }
    // a final quote would merge with the closing delimiter
    let ends_with_quote = body.ends_with('"');
    if ends_with_quote {
        body.pop();
    }
    let mut body = body.replace("\"\"\"", "\\\"\\\"\\\"");
    if ends_with_quote {
        body.push_str("\\\"");
    }
    format!("\"\"\"{}\"\"\"", body)
}

fn parse_python_str(text: &str) -> Result<String> {
    let not_a_string = || SelfieError::invalid(format!("Not a string literal: `{}`", text));
    let inner = if text.len() >= 6 && text.starts_with("\"\"\"") && text.ends_with("\"\"\"") {
        &text[3..text.len() - 3]
    } else if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        &text[1..text.len() - 1]
    } else {
        return Err(not_a_string());
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let bad = || SelfieError::invalid(format!("Invalid escape in string literal `{}`", text));
        let next = chars.next().ok_or_else(bad)?;
        match next {
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '\'' => out.push('\''),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            'a' => out.push('\u{7}'),
            '0' => out.push('\0'),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let len = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = chars.by_ref().take(len).collect();
                let code = u32::from_str_radix(&hex, 16).map_err(|_| bad())?;
                out.push(char::from_u32(code).ok_or_else(bad)?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEVER: EscapeLeadingWhitespace = EscapeLeadingWhitespace::Never;

    fn roundtrip(lit: Literal, language: Language) {
        let encoded = lit.encode(language, EscapeLeadingWhitespace::Always).unwrap();
        let parsed = lit.format().parse(&encoded, language).unwrap();
        assert_eq!(parsed, lit, "encoded as {}", encoded);
    }

    #[test]
    fn int_grouping() {
        for (v, s) in [
            (0, "0"),
            (999, "999"),
            (1000, "1_000"),
            (-1000, "-1_000"),
            (1001, "1_001"),
            (10_010, "10_010"),
            (2_400_500, "2_400_500"),
            (i64::MIN, "-9_223_372_036_854_775_808"),
        ] {
            assert_eq!(Literal::Int(v).encode(Language::Rust, NEVER).unwrap(), s);
            assert_eq!(parse_int(s).unwrap(), v);
        }
        assert_eq!(parse_int("42u32").unwrap(), 42);
        assert!(parse_int("4x2").is_err());
    }

    #[test]
    fn booleans_per_language() {
        assert_eq!(Literal::Bool(true).encode(Language::Python, NEVER).unwrap(), "True");
        assert_eq!(Literal::Bool(false).encode(Language::Rust, NEVER).unwrap(), "false");
        assert!(LiteralFormat::Bool.parse("True", Language::Rust).is_err());
    }

    #[test]
    fn python_strings() {
        assert_eq!(encode_python_single("1\n\tABC"), "\"1\\n\\tABC\"");
        assert_eq!(encode_python_single("\\"), "\"\\\\\"");
        assert_eq!(
            encode_python_multi("  leading\ntrailing  ", NEVER),
            "\"\"\"  leading\ntrailing \\u0020\"\"\""
        );
        assert_eq!(
            parse_python_str("\"\"\"\n  123  \n  abc\t\"\"\"").unwrap(),
            "\n  123  \n  abc\t"
        );
        assert_eq!(parse_python_str("\"1\\n\\tABC\"").unwrap(), "1\n\tABC");
    }

    #[test]
    fn rust_strings() {
        assert_eq!(encode_rust_str("7", NEVER), "\"7\"");
        assert_eq!(encode_rust_str("a\"b\\", NEVER), "\"a\\\"b\\\\\"");
        assert_eq!(encode_rust_str("a \n b", EscapeLeadingWhitespace::Always), "\"a\\x20\n\\x20b\"");
        assert_eq!(parse_rust_str("\"line\\\n    continued\"").unwrap(), "linecontinued");
        assert_eq!(parse_rust_str("\"\\u{1F600}\"").unwrap(), "\u{1F600}");
    }

    #[test]
    fn strings_roundtrip_in_both_languages() {
        let samples = [
            "",
            "plain",
            "multi\nline\n",
            "  indented\n\tand tabbed\t\nend ",
            "quotes \" and \"\"\" triple",
            "ends with quote\"",
            "ends with two quotes\"\"",
            "back\\slash\\",
            "ctrl \u{1} \r \0 chars",
        ];
        for s in samples {
            roundtrip(Literal::Str(s.to_string()), Language::Rust);
            roundtrip(Literal::Str(s.to_string()), Language::Python);
        }
    }

    #[test]
    fn repr_is_written_verbatim() {
        for text in ["Some(3)", "[1, 2]", "Point { x: 1, y: -2 }", "(\"a b\", 'c')"] {
            let lit = Literal::Repr(text.to_string());
            assert_eq!(lit.encode(Language::Rust, NEVER).unwrap(), text);
            assert_eq!(lit.format(), LiteralFormat::Repr);
            roundtrip(lit.clone(), Language::Rust);
            roundtrip(lit, Language::Python);
        }
        // whitespace around the argument is not part of the value
        assert_eq!(
            LiteralFormat::Repr.parse("  Some(3) ", Language::Rust).unwrap(),
            Literal::Repr("Some(3)".into())
        );
    }

    #[test]
    fn rust_raw_strings_parse() {
        assert_eq!(parse_rust_str("r\"a\\n\"").unwrap(), "a\\n");
        assert_eq!(parse_rust_str("r#\"say \"hi\"\"#").unwrap(), "say \"hi\"");
        assert_eq!(parse_rust_str("r\"\"").unwrap(), "");
        assert!(parse_rust_str("r#\"open\"").is_err());
        assert!(parse_rust_str("r#\"a\"#b\"#").is_err());
        assert_eq!(rust_raw_hashes("r##\"x"), Some(2));
        assert_eq!(rust_raw_hashes("r#type"), None);
        assert_eq!(rust_raw_hashes("\"x\""), None);
    }

    // ----- randomized round-trip -----

    #[test]
    fn random_ints_roundtrip() {
        use oorandom::Rand64;

        let mut rng = Rand64::new(0x1_2345);
        let mut values = vec![i64::MIN, i64::MAX, 0, -1, 999, -1000];
        values.extend((0..2000).map(|_| rng.rand_u64() as i64));
        // малые значения тоже: группировка по три цифры
        values.extend((0..500).map(|_| rng.rand_range(0..100_000) as i64 - 50_000));
        for v in values {
            let encoded = encode_int(v);
            assert_eq!(parse_int(&encoded).unwrap(), v, "encoded as {}", encoded);
            roundtrip(Literal::Int(v), Language::Rust);
            roundtrip(Literal::Int(v), Language::Python);
        }
    }

    #[test]
    fn random_strings_roundtrip() {
        use oorandom::Rand64;

        const POOL: &[char] = &[
            'a', 'Z', ' ', ' ', '\n', '\n', '\t', '"', '\\', '\'', 'é', '\r', '\u{1}', '\0', '#',
        ];
        let policies = [
            EscapeLeadingWhitespace::Always,
            EscapeLeadingWhitespace::Never,
            EscapeLeadingWhitespace::OnlyOnSpace,
            EscapeLeadingWhitespace::OnlyOnTab,
        ];
        let mut rng = Rand64::new(0x5_7a1e);
        for _ in 0..2000 {
            let len = rng.rand_range(0..20);
            let value: String = (0..len)
                .map(|_| POOL[rng.rand_range(0..POOL.len() as u64) as usize])
                .collect();
            let esc = policies[rng.rand_range(0..policies.len() as u64) as usize];
            let lit = Literal::Str(value);
            for language in [Language::Rust, Language::Python] {
                let encoded = lit.encode(language, esc).unwrap();
                let parsed = LiteralFormat::Str.parse(&encoded, language).unwrap();
                assert_eq!(parsed, lit, "{:?} encoded as {}", language, encoded);
            }
        }
    }

    #[test]
    fn leading_whitespace_policy() {
        assert_eq!(
            EscapeLeadingWhitespace::appropriate_for("a\n  b\n    c\n"),
            EscapeLeadingWhitespace::OnlyOnTab
        );
        assert_eq!(
            EscapeLeadingWhitespace::appropriate_for("a\n\tb\n"),
            EscapeLeadingWhitespace::OnlyOnSpace
        );
        assert_eq!(
            EscapeLeadingWhitespace::appropriate_for("  a\n\tb\n"),
            EscapeLeadingWhitespace::Always
        );
        assert_eq!(
            EscapeLeadingWhitespace::OnlyOnTab.escape_line("\tx", "S", "T"),
            "Tx"
        );
        assert_eq!(
            EscapeLeadingWhitespace::OnlyOnTab.escape_line(" x", "S", "T"),
            " x"
        );
    }

    #[test]
    fn language_from_filename() {
        assert_eq!(Language::from_filename("tests/a.rs").unwrap(), Language::Rust);
        assert_eq!(Language::from_filename("test_a.py").unwrap(), Language::Python);
        assert!(Language::from_filename("A.kt").is_err());
    }
}
