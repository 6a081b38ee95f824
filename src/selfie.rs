//! Assertion API.
//!
//! ```ignore
//! let disk = system.test_start(file!(), "renders_home")?;
//! expect_selfie(&disk, render_home()).to_match_disk()?;
//! expect_selfie_int(&disk, 1 + 1).to_be(2)?;
//! expect_selfie(&disk, greeting()).to_be_TODO()?;
//! expect_selfie_repr(&disk, &lookup("a")).to_be(Some(3))?;
//! ```
//!
//! Every assertion is `#[track_caller]`: the call site is captured once here and passed
//! down explicitly. Inline `_TODO` calls and writable comments produce writes that are
//! applied to the sources by `SnapshotSystem::finished_all_tests`.

use std::fmt::Debug;
use std::ops::Deref;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::call::CallStack;
use crate::codec::write_entry;
use crate::error::SelfieError;
use crate::literals::{Literal, LiteralValue, TodoStub};
use crate::mode::Mode;
use crate::snapshot::{Snapshot, SnapshotValue};
use crate::system::{DiskStorage, TestDisk};

pub fn expect_selfie<'a>(disk: &'a TestDisk, actual: impl AsRef<str>) -> StringSelfie<'a> {
    StringSelfie::new(disk, Snapshot::of(actual.as_ref()))
}

pub fn expect_selfie_snapshot(disk: &TestDisk, actual: Snapshot) -> StringSelfie<'_> {
    StringSelfie::new(disk, actual)
}

/// Pretty-printed JSON as the subject.
pub fn expect_selfie_json<'a, T: Serialize + ?Sized>(disk: &'a TestDisk, actual: &T) -> Result<StringSelfie<'a>> {
    let json = serde_json::to_string_pretty(actual).context("serialize selfie as json")?;
    Ok(StringSelfie::new(disk, Snapshot::of(json)))
}

pub fn expect_selfie_bytes<'a>(disk: &'a TestDisk, actual: impl AsRef<[u8]>) -> BinarySelfie<'a> {
    BinarySelfie {
        inner: DiskSelfie {
            disk,
            actual: Snapshot::of(actual.as_ref()),
        },
    }
}

pub fn expect_selfie_int(disk: &TestDisk, actual: i64) -> IntSelfie<'_> {
    IntSelfie { disk, actual }
}

pub fn expect_selfie_bool(disk: &TestDisk, actual: bool) -> BoolSelfie<'_> {
    BoolSelfie { disk, actual }
}

/// Compares the single-line `Debug` text of `actual` with a source expression.
pub fn expect_selfie_repr<'a, T: Debug + ?Sized>(disk: &'a TestDisk, actual: &T) -> ReprSelfie<'a> {
    ReprSelfie {
        disk,
        actual: format!("{:?}", actual),
    }
}

/// Keeps disk snapshots of the running test without asserting them. No subs keeps all.
pub fn preserve_selfies_on_disk(disk: &TestDisk, subs: &[&str]) -> Result<()> {
    if subs.is_empty() {
        disk.keep(None)
    } else {
        for sub in subs {
            disk.keep(Some(sub))?;
        }
        Ok(())
    }
}

// ----- disk -----

pub struct DiskSelfie<'a> {
    disk: &'a TestDisk,
    actual: Snapshot,
}

impl<'a> DiskSelfie<'a> {
    pub fn actual(&self) -> &Snapshot {
        &self.actual
    }

    #[track_caller]
    pub fn to_match_disk(&self) -> Result<&Self> {
        self.match_disk("", CallStack::capture())
    }

    #[track_caller]
    pub fn to_match_disk_sub(&self, sub: &str) -> Result<&Self> {
        self.match_disk(sub, CallStack::capture())
    }

    #[track_caller]
    pub fn to_match_disk_TODO(&self) -> Result<&Self> {
        self.match_disk_todo("", CallStack::capture())
    }

    #[track_caller]
    pub fn to_match_disk_sub_TODO(&self, sub: &str) -> Result<&Self> {
        self.match_disk_todo(sub, CallStack::capture())
    }

    fn match_disk(&self, sub: &str, call: CallStack) -> Result<&Self> {
        let system = self.disk.system();
        if system.can_write(false, &call)? {
            self.disk.write_disk(&self.actual, sub, &call)?;
        } else {
            let expected = self.disk.read_disk(sub, &call)?;
            assert_equal(self.disk, expected.as_ref(), &self.actual, system.mode())?;
        }
        Ok(self)
    }

    fn match_disk_todo(&self, sub: &str, call: CallStack) -> Result<&Self> {
        let system = self.disk.system();
        if system.can_write(true, &call)? {
            self.disk.write_disk(&self.actual, sub, &call)?;
            system.write_inline(TodoStub::ToMatchDisk.create_literal(), &call)?;
            Ok(self)
        } else {
            Err(SelfieError::ModeViolation(format!(
                "Can't call `to_match_disk_TODO` in {} mode!",
                Mode::Readonly
            ))
            .into())
        }
    }
}

fn assert_equal(disk: &TestDisk, expected: Option<&Snapshot>, actual: &Snapshot, mode: Mode) -> Result<()> {
    let expected = match expected {
        Some(e) => e,
        None => {
            let message = if disk.snapshot_file_exists() {
                mode.msg_snapshot_not_found()
            } else {
                mode.msg_snapshot_not_found_no_such_file(&disk.snapshot_path().display().to_string())
            };
            return Err(SelfieError::SnapshotNotFound {
                message,
                file: disk.snapshot_path().to_path_buf(),
            }
            .into());
        }
    };
    if expected == actual {
        return Ok(());
    }
    let mut keys: Vec<&str> = std::iter::once("")
        .chain(expected.facets().keys().map(String::as_str))
        .chain(actual.facets().keys().map(String::as_str))
        .filter(|k| expected.subject_or_facet_maybe(k) != actual.subject_or_facet_maybe(k))
        .collect();
    keys.sort_unstable();
    keys.dedup();
    let expected_text = serialize_only_facets(expected, &keys);
    let actual_text = serialize_only_facets(actual, &keys);
    Err(SelfieError::SnapshotMismatch {
        message: mode.msg_snapshot_mismatch(&expected_text, &actual_text),
        expected: expected_text,
        actual: actual_text,
    }
    .into())
}

/// The listed facets in snapshot-file form; a leading subject loses its empty header.
pub fn serialize_only_facets(snapshot: &Snapshot, keys: &[&str]) -> String {
    const EMPTY_KEY_AND_FACET: &str = "╔═  ═╗\n";
    let mut out = String::new();
    for key in keys {
        if key.is_empty() {
            write_entry(&mut out, "", None, snapshot.subject());
        } else if let Some(value) = snapshot.subject_or_facet_maybe(key) {
            write_entry(&mut out, "", Some(key), value);
        }
    }
    match out.strip_prefix(EMPTY_KEY_AND_FACET) {
        Some(rest) => rest.to_string(),
        None => out,
    }
}

// ----- inline -----

/// Shared inline path: equal values only validate the source, different values are either
/// recorded as a write or reported as a mismatch depending on the mode.
fn to_be_inline(disk: &TestDisk, call: &CallStack, expected: Option<Literal>, actual: Literal) -> Result<()> {
    let system = disk.system();
    if expected.as_ref() == Some(&actual) {
        system.can_write(false, call)?;
        return Ok(());
    }
    if system.can_write(expected.is_none(), call)? {
        return system.write_inline(LiteralValue::new(expected, actual), call);
    }
    match expected {
        None => Err(SelfieError::ModeViolation(format!(
            "Can't call `to_be_TODO` in {} mode!",
            Mode::Readonly
        ))
        .into()),
        Some(expected) => {
            let (exp, act) = (literal_text(&expected), literal_text(&actual));
            Err(SelfieError::SnapshotMismatch {
                message: system.mode().msg_snapshot_mismatch(&exp, &act),
                expected: exp,
                actual: act,
            }
            .into())
        }
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct StringSelfie<'a> {
    inner: DiskSelfie<'a>,
    only_facets: Option<Vec<String>>,
}

impl<'a> Deref for StringSelfie<'a> {
    type Target = DiskSelfie<'a>;

    fn deref(&self) -> &DiskSelfie<'a> {
        &self.inner
    }
}

impl<'a> StringSelfie<'a> {
    fn new(disk: &'a TestDisk, actual: Snapshot) -> Self {
        Self {
            inner: DiskSelfie { disk, actual },
            only_facets: None,
        }
    }

    /// Narrows inline comparisons to one facet (`""` is the subject).
    pub fn facet(&self, name: &str) -> Result<StringSelfie<'a>> {
        self.facets(&[name])
    }

    /// Narrows inline comparisons to the listed facets; the subject, if listed, comes first.
    pub fn facets(&self, names: &[&str]) -> Result<StringSelfie<'a>> {
        if names.is_empty() {
            return Err(SelfieError::invalid("Must have at least one facet to display, this was empty.").into());
        }
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| self.inner.actual.subject_or_facet_maybe(n).is_none())
            .collect();
        if !missing.is_empty() {
            let available: Vec<&String> = self.inner.actual.facets().keys().collect();
            return Err(SelfieError::invalid(format!(
                "The following facets were not found in the snapshot: {:?}\navailable facets are: {:?}",
                missing, available
            ))
            .into());
        }
        if let Some(idx) = names.iter().position(|n| n.is_empty()) {
            if idx != 0 {
                return Err(SelfieError::invalid(format!(
                    "If you're going to specify the subject facet (\"\"), you should put it first, this was {:?}",
                    names
                ))
                .into());
            }
        }
        Ok(StringSelfie {
            inner: DiskSelfie {
                disk: self.inner.disk,
                actual: self.inner.actual.clone(),
            },
            only_facets: Some(names.iter().map(|n| n.to_string()).collect()),
        })
    }

    /// The text inline assertions compare against.
    pub fn actual_string(&self) -> Result<String> {
        let actual = &self.inner.actual;
        let single = match &self.only_facets {
            None if actual.facets().is_empty() => Some(""),
            Some(only) if only.len() == 1 => Some(only[0].as_str()),
            _ => None,
        };
        match single {
            Some(key) => {
                let value = actual.subject_or_facet(key)?;
                if value.is_binary() {
                    return Err(SelfieError::invalid(format!(
                        "'{}' is binary, compare it with expect_selfie_bytes(..).to_be_base64",
                        key
                    ))
                    .into());
                }
                Ok(value.value_string()?.to_string())
            }
            None => {
                let keys: Vec<String> = match &self.only_facets {
                    Some(only) => only.clone(),
                    None => std::iter::once(String::new())
                        .chain(actual.facets().keys().cloned())
                        .collect(),
                };
                let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
                Ok(serialize_only_facets(actual, &keys))
            }
        }
    }

    #[track_caller]
    pub fn to_be(&self, expected: &str) -> Result<String> {
        let call = CallStack::capture();
        let actual = self.actual_string()?;
        to_be_inline(
            self.inner.disk,
            &call,
            Some(Literal::Str(expected.to_string())),
            Literal::Str(actual.clone()),
        )?;
        Ok(actual)
    }

    #[track_caller]
    pub fn to_be_TODO(&self) -> Result<String> {
        let call = CallStack::capture();
        let actual = self.actual_string()?;
        to_be_inline(self.inner.disk, &call, None, Literal::Str(actual.clone()))?;
        Ok(actual)
    }
}

pub struct BinarySelfie<'a> {
    inner: DiskSelfie<'a>,
}

impl<'a> Deref for BinarySelfie<'a> {
    type Target = DiskSelfie<'a>;

    fn deref(&self) -> &DiskSelfie<'a> {
        &self.inner
    }
}

impl BinarySelfie<'_> {
    fn actual_bytes(&self) -> Result<&[u8]> {
        Ok(self.inner.actual.subject().value_binary()?)
    }

    fn actual_base64(&self) -> Result<String> {
        Ok(STANDARD.encode(self.actual_bytes()?))
    }

    #[track_caller]
    pub fn to_be_base64(&self, expected: &str) -> Result<String> {
        let call = CallStack::capture();
        let actual = self.actual_base64()?;
        to_be_inline(
            self.inner.disk,
            &call,
            Some(Literal::Str(expected.to_string())),
            Literal::Str(actual.clone()),
        )?;
        Ok(actual)
    }

    #[track_caller]
    pub fn to_be_base64_TODO(&self) -> Result<String> {
        let call = CallStack::capture();
        let actual = self.actual_base64()?;
        to_be_inline(self.inner.disk, &call, None, Literal::Str(actual.clone()))?;
        Ok(actual)
    }

    /// Compares against (or writes) a file; relative paths resolve against the project root.
    #[track_caller]
    pub fn to_be_file(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let call = CallStack::capture();
        self.to_be_file_impl(path.as_ref(), &call, false)
    }

    #[track_caller]
    pub fn to_be_file_TODO(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let call = CallStack::capture();
        self.to_be_file_impl(path.as_ref(), &call, true)
    }

    fn to_be_file_impl(&self, path: &Path, call: &CallStack, is_todo: bool) -> Result<Vec<u8>> {
        let system = self.inner.disk.system();
        let writable = system.can_write(is_todo, call)?;
        let actual = self.actual_bytes()?.to_vec();
        let resolved = system.layout().resolve(path);
        if writable {
            if is_todo {
                system.write_inline(TodoStub::ToBeFile.create_literal(), call)?;
            }
            system.write_to_be_file(&resolved, &actual, call)?;
            return Ok(actual);
        }
        if is_todo {
            return Err(SelfieError::ModeViolation(format!(
                "Can't call `to_be_file_TODO` in {} mode!",
                Mode::Readonly
            ))
            .into());
        }
        if !system.fs().file_exists(&resolved) {
            return Err(SelfieError::SnapshotNotFound {
                message: system
                    .mode()
                    .msg_snapshot_not_found_no_such_file(&resolved.display().to_string()),
                file: resolved,
            }
            .into());
        }
        let expected = system.fs().file_read_binary(&resolved)?;
        if expected == actual {
            return Ok(actual);
        }
        Err(SelfieError::SnapshotMismatch {
            message: system.mode().msg_snapshot_mismatch_binary(&expected, &actual),
            expected: format!("{:?}\n", SnapshotValue::binary(expected.clone())),
            actual: format!("{:?}\n", SnapshotValue::binary(actual)),
        }
        .into())
    }
}

pub struct IntSelfie<'a> {
    disk: &'a TestDisk,
    actual: i64,
}

impl IntSelfie<'_> {
    #[track_caller]
    pub fn to_be(&self, expected: i64) -> Result<i64> {
        let call = CallStack::capture();
        to_be_inline(self.disk, &call, Some(Literal::Int(expected)), Literal::Int(self.actual))?;
        Ok(self.actual)
    }

    #[track_caller]
    pub fn to_be_TODO(&self) -> Result<i64> {
        let call = CallStack::capture();
        to_be_inline(self.disk, &call, None, Literal::Int(self.actual))?;
        Ok(self.actual)
    }
}

pub struct BoolSelfie<'a> {
    disk: &'a TestDisk,
    actual: bool,
}

impl BoolSelfie<'_> {
    #[track_caller]
    pub fn to_be(&self, expected: bool) -> Result<bool> {
        let call = CallStack::capture();
        to_be_inline(self.disk, &call, Some(Literal::Bool(expected)), Literal::Bool(self.actual))?;
        Ok(self.actual)
    }

    #[track_caller]
    pub fn to_be_TODO(&self) -> Result<bool> {
        let call = CallStack::capture();
        to_be_inline(self.disk, &call, None, Literal::Bool(self.actual))?;
        Ok(self.actual)
    }
}

/// `to_be(expr)` holds when `format!("{:?}", expr)` equals the actual `Debug` text, so the
/// source keeps a real Rust expression such as `Some(3)` or `[1, 2]`.
pub struct ReprSelfie<'a> {
    disk: &'a TestDisk,
    actual: String,
}

impl ReprSelfie<'_> {
    #[track_caller]
    pub fn to_be<E: Debug>(&self, expected: E) -> Result<String> {
        let call = CallStack::capture();
        let expected = Literal::Repr(format!("{:?}", expected));
        to_be_inline(self.disk, &call, Some(expected), Literal::Repr(self.actual.clone()))?;
        Ok(self.actual.clone())
    }

    #[track_caller]
    pub fn to_be_TODO(&self) -> Result<String> {
        let call = CallStack::capture();
        to_be_inline(self.disk, &call, None, Literal::Repr(self.actual.clone()))?;
        Ok(self.actual.clone())
    }
}
