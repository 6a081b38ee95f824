//! Snapshot values and the snapshot aggregate (subject + named facets).

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SelfieError};
use crate::ordered_map::OrderedMap;

/// `\r\n` and a lone `\r` both become `\n`; the snapshot file format has no way to keep a bare `\r`.
pub(crate) fn unix_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

/// A string or binary value. Strings are normalised to `\n` at construction.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SnapshotValue {
    String(Arc<str>),
    Binary(Arc<[u8]>),
}

impl SnapshotValue {
    pub fn string(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        if s.contains('\r') {
            SnapshotValue::String(Arc::from(unix_newlines(s)))
        } else {
            SnapshotValue::String(Arc::from(s))
        }
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        SnapshotValue::Binary(Arc::from(bytes.into()))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, SnapshotValue::Binary(_))
    }

    pub fn value_string(&self) -> Result<&str> {
        match self {
            SnapshotValue::String(s) => Ok(&s[..]),
            SnapshotValue::Binary(_) => Err(SelfieError::invalid("This is a binary value.")),
        }
    }

    pub fn value_binary(&self) -> Result<&[u8]> {
        match self {
            SnapshotValue::Binary(b) => Ok(&b[..]),
            SnapshotValue::String(_) => Err(SelfieError::invalid("This is not a binary value.")),
        }
    }
}

impl fmt::Debug for SnapshotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotValue::String(s) => write!(f, "String({:?})", s),
            SnapshotValue::Binary(b) => write!(f, "Binary({} bytes)", b.len()),
        }
    }
}

impl From<&str> for SnapshotValue {
    fn from(s: &str) -> Self {
        SnapshotValue::string(s)
    }
}

impl From<String> for SnapshotValue {
    fn from(s: String) -> Self {
        SnapshotValue::string(s)
    }
}

impl From<&[u8]> for SnapshotValue {
    fn from(b: &[u8]) -> Self {
        SnapshotValue::binary(b)
    }
}

impl From<Vec<u8>> for SnapshotValue {
    fn from(b: Vec<u8>) -> Self {
        SnapshotValue::binary(b)
    }
}

/// One subject plus zero or more facets. The facet key `""` is the subject and
/// never appears in `facets`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    subject: SnapshotValue,
    facets: OrderedMap<String, SnapshotValue>,
}

impl Snapshot {
    pub fn of(subject: impl Into<SnapshotValue>) -> Self {
        Self {
            subject: subject.into(),
            facets: OrderedMap::empty(),
        }
    }

    pub fn subject(&self) -> &SnapshotValue {
        &self.subject
    }

    pub fn facets(&self) -> &OrderedMap<String, SnapshotValue> {
        &self.facets
    }

    /// Adds a new facet. The empty key and an existing key are both errors.
    pub fn plus_facet(&self, key: &str, value: impl Into<SnapshotValue>) -> Result<Self> {
        if key.is_empty() {
            return Err(SelfieError::invalid(
                "The empty string is reserved for the subject.",
            ));
        }
        Ok(Self {
            subject: self.subject.clone(),
            facets: self.facets.plus(unix_newlines(key), value.into())?,
        })
    }

    /// Adds or replaces a facet; the key `""` replaces the subject.
    pub fn plus_or_replace(&self, key: &str, value: impl Into<SnapshotValue>) -> Self {
        if key.is_empty() {
            Self {
                subject: value.into(),
                facets: self.facets.clone(),
            }
        } else {
            Self {
                subject: self.subject.clone(),
                facets: self.facets.plus_or_replace(unix_newlines(key), value.into()),
            }
        }
    }

    pub fn subject_or_facet_maybe(&self, key: &str) -> Option<&SnapshotValue> {
        if key.is_empty() {
            Some(&self.subject)
        } else {
            self.facets.get(&key.to_string())
        }
    }

    pub fn subject_or_facet(&self, key: &str) -> Result<&SnapshotValue> {
        self.subject_or_facet_maybe(key).ok_or_else(|| {
            let known: Vec<&str> = self.facets.keys().map(String::as_str).collect();
            SelfieError::invalid(format!("'{}' not found in {:?}", key, known))
        })
    }

    /// Subject first (under `""`), then facets in key order.
    pub fn all_entries(&self) -> impl Iterator<Item = (&str, &SnapshotValue)> {
        std::iter::once(("", &self.subject))
            .chain(self.facets.iter().map(|(k, v)| (k.as_str(), v)))
    }

    /// Inverse of `all_entries`. A missing subject defaults to the empty string.
    pub fn of_entries<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, SnapshotValue)>,
        S: AsRef<str>,
    {
        let mut root: Option<SnapshotValue> = None;
        let mut facets = Vec::new();
        for (key, value) in entries {
            let key = key.as_ref();
            if key.is_empty() {
                if let Some(first) = &root {
                    return Err(SelfieError::invalid(format!(
                        "Duplicate root snapshot value.\n     first: {:?}\n    second: {:?}",
                        first, value
                    )));
                }
                root = Some(value);
            } else {
                facets.push((unix_newlines(key), value));
            }
        }
        Ok(Self {
            subject: root.unwrap_or_else(|| SnapshotValue::string("")),
            facets: OrderedMap::of(facets)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_unix_normalised() {
        let v = SnapshotValue::string("a\r\nb");
        assert_eq!(v.value_string().unwrap(), "a\nb");
        assert!(v.value_binary().is_err());

        // одиночный \r тоже становится \n
        assert_eq!(SnapshotValue::string("a\r").value_string().unwrap(), "a\n");
        assert_eq!(SnapshotValue::from("x\ry\r\n").value_string().unwrap(), "x\ny\n");
    }

    #[test]
    fn facets_and_subject() {
        let s = Snapshot::of("root")
            .plus_facet("b", "B")
            .unwrap()
            .plus_facet("a", "A")
            .unwrap();
        assert!(s.plus_facet("", "x").is_err());
        assert!(s.plus_facet("a", "again").is_err());
        let keys: Vec<&str> = s.all_entries().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["", "a", "b"]);

        let replaced = s.plus_or_replace("", "new root").plus_or_replace("a", "A2");
        assert_eq!(replaced.subject().value_string().unwrap(), "new root");
        assert_eq!(
            replaced.subject_or_facet("a").unwrap().value_string().unwrap(),
            "A2"
        );
        assert!(replaced.subject_or_facet("zzz").is_err());
    }

    #[test]
    fn of_entries_inverts_all_entries() {
        let s = Snapshot::of("root").plus_facet("x", vec![1u8, 2]).unwrap();
        let entries: Vec<(String, SnapshotValue)> = s
            .all_entries()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        assert_eq!(Snapshot::of_entries(entries).unwrap(), s);

        let dup = vec![("", SnapshotValue::string("a")), ("", SnapshotValue::string("b"))];
        assert!(Snapshot::of_entries(dup).is_err());

        let no_root = Snapshot::of_entries(vec![("f", SnapshotValue::string("v"))]).unwrap();
        assert_eq!(no_root.subject().value_string().unwrap(), "");
    }
}
