//! Per-character escaper.
//!
//! Every character of a configured set is written as `escape_char + substitute`.
//! `escape` borrows the input when nothing needs escaping, so callers can skip the
//! allocation (and compare by pointer if they care). `unescape` is the exact inverse;
//! its only failure is a dangling escape character at the end of the input.

use std::borrow::Cow;

use crate::error::{Result, SelfieError};

#[derive(Debug, Clone)]
pub struct PerCharacterEscaper {
    escape_char: char,
    /// (raw, substitute) pairs; the escape char itself is always present.
    pairs: Vec<(char, char)>,
}

impl PerCharacterEscaper {
    /// Every character in `others` (and the escape char) escapes to itself.
    pub fn self_escape(escape_char: char, others: &[char]) -> Self {
        let mut pairs = vec![(escape_char, escape_char)];
        for &c in others {
            if c != escape_char {
                pairs.push((c, c));
            }
        }
        Self { escape_char, pairs }
    }

    /// Arbitrary substitution: `raw` is written as `escape_char + substitute`.
    /// Unless `pairs` says otherwise, the escape char escapes to itself.
    pub fn specified_escape(escape_char: char, pairs: &[(char, char)]) -> Self {
        let mut all = Vec::with_capacity(pairs.len() + 1);
        if !pairs.iter().any(|(raw, _)| *raw == escape_char) {
            all.push((escape_char, escape_char));
        }
        all.extend_from_slice(pairs);
        Self {
            escape_char,
            pairs: all,
        }
    }

    pub fn escape_char(&self) -> char {
        self.escape_char
    }

    fn substitute_for(&self, raw: char) -> Option<char> {
        self.pairs.iter().find(|(r, _)| *r == raw).map(|(_, s)| *s)
    }

    fn raw_for(&self, substitute: char) -> Option<char> {
        self.pairs.iter().find(|(_, s)| *s == substitute).map(|(r, _)| *r)
    }

    pub fn escape<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let start = match input
            .char_indices()
            .find(|(_, c)| self.substitute_for(*c).is_some())
        {
            Some((idx, _)) => idx,
            None => return Cow::Borrowed(input),
        };
        let mut out = String::with_capacity(input.len() + 8);
        out.push_str(&input[..start]);
        for c in input[start..].chars() {
            match self.substitute_for(c) {
                Some(sub) => {
                    out.push(self.escape_char);
                    out.push(sub);
                }
                None => out.push(c),
            }
        }
        Cow::Owned(out)
    }

    /// An escape followed by a character that is not a known substitute yields that
    /// character unchanged.
    pub fn unescape<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let start = match input.find(self.escape_char) {
            Some(idx) => idx,
            None => return Ok(Cow::Borrowed(input)),
        };
        let mut out = String::with_capacity(input.len());
        out.push_str(&input[..start]);
        let mut chars = input[start..].chars();
        while let Some(c) = chars.next() {
            if c != self.escape_char {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some(next) => out.push(self.raw_for(next).unwrap_or(next)),
                None => {
                    return Err(SelfieError::invalid(format!(
                        "Escape character '{}' can't be the last character in a string.",
                        self.escape_char
                    )))
                }
            }
        }
        Ok(Cow::Owned(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> PerCharacterEscaper {
        PerCharacterEscaper::specified_escape('\\', &[('[', '('), (']', ')'), ('\n', 'n')])
    }

    #[test]
    fn self_escape_roundtrip() {
        let esc = PerCharacterEscaper::self_escape('`', &['#']);
        assert_eq!(esc.escape("a#b`c"), "a`#b``c");
        assert_eq!(esc.unescape("a`#b``c").unwrap(), "a#b`c");
        // unknown substitute passes through
        assert_eq!(esc.unescape("`x").unwrap(), "x");
    }

    #[test]
    fn escape_borrows_when_clean() {
        let input = "plain text";
        match names().escape(input) {
            Cow::Borrowed(s) => assert!(std::ptr::eq(s, input)),
            Cow::Owned(_) => panic!("expected the input back"),
        }
        assert!(matches!(names().unescape(input).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn specified_pairs() {
        let esc = names();
        assert_eq!(esc.escape("a[b]\nc\\"), "a\\(b\\)\\nc\\\\");
        assert_eq!(esc.unescape("a\\(b\\)\\nc\\\\").unwrap(), "a[b]\nc\\");
        // raw parens are not special
        assert_eq!(esc.escape("f(x)"), "f(x)");
    }

    #[test]
    fn random_strings_roundtrip() {
        use oorandom::Rand64;

        const POOL: &[char] = &[
            'a', 'Z', ' ', '\\', '[', ']', '(', ')', '\n', '\t', '╔', '═', '╗', '┌', '`', '#',
        ];
        let names = PerCharacterEscaper::specified_escape(
            '\\',
            &[('[', '('), (']', ')'), ('\n', 'n'), ('\t', 't'), ('╔', '┌'), ('╗', '┐'), ('═', '─')],
        );
        let body = PerCharacterEscaper::self_escape('`', &['#', '╔']);
        let mut rng = Rand64::new(0xe5c_a9e);
        for _ in 0..2000 {
            let len = rng.rand_range(0..24);
            let input: String = (0..len)
                .map(|_| POOL[rng.rand_range(0..POOL.len() as u64) as usize])
                .collect();
            for esc in [&names, &body] {
                let escaped = esc.escape(&input);
                assert_eq!(esc.unescape(&escaped).unwrap(), input, "escaped as {:?}", escaped);
            }
            // structural characters never survive name escaping
            let escaped = names.escape(&input);
            assert!(!escaped.contains(['[', ']', '\n', '╔', '═', '╗']), "{:?}", escaped);
        }
    }

    #[test]
    fn dangling_escape_is_an_error() {
        let err = names().unescape("abc\\").unwrap_err();
        assert!(err
            .to_string()
            .contains("Escape character '\\' can't be the last character in a string."));
    }
}
