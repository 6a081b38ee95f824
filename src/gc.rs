//! gc — поиск устаревших снапшотов.
//!
//! Per test, `WithinTestGC` records which suffixes (`""` for the test's own key,
//! `/name` for sub-snapshots) were validated this run, or "keep all" when the test
//! failed or never ran. `find_stale_snapshots_within` walks the on-disk keys and the
//! test roots in parallel (both sorted slash-first) and returns the stale indices.

use std::cmp::Ordering;

use crate::ordered_map::{slash_first_cmp, OrderedMap, OrderedSet};
use crate::snapshot::Snapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithinTestGC {
    /// `None` means keep everything.
    suffixes_to_keep: Option<OrderedSet<String>>,
}

impl Default for WithinTestGC {
    fn default() -> Self {
        Self {
            suffixes_to_keep: Some(OrderedSet::empty()),
        }
    }
}

impl WithinTestGC {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keeping_all() -> Self {
        Self {
            suffixes_to_keep: None,
        }
    }

    pub fn keep_suffix(&mut self, suffix: &str) {
        if let Some(set) = &self.suffixes_to_keep {
            self.suffixes_to_keep = Some(set.plus_or_this(suffix.to_string()));
        }
    }

    /// Irreversible for the rest of the run.
    pub fn keep_all(&mut self) {
        self.suffixes_to_keep = None;
    }

    pub fn keeps(&self, suffix: &str) -> bool {
        match &self.suffixes_to_keep {
            None => true,
            Some(set) => set.contains(&suffix.to_string()),
        }
    }

    pub fn is_keep_all(&self) -> bool {
        self.suffixes_to_keep.is_none()
    }

    pub fn succeeded_and_used_no_snapshots(&self) -> bool {
        matches!(&self.suffixes_to_keep, Some(set) if set.is_empty())
    }
}

/// Indices (ascending) of `snapshots` entries that no test justified.
///
/// Tests in `tests_that_didnt_run` are treated as keep-all; if a name appears in
/// both inputs, what was observed during the run wins.
pub fn find_stale_snapshots_within<I, S>(
    snapshots: &OrderedMap<String, Snapshot>,
    tests_that_ran: &OrderedMap<String, WithinTestGC>,
    tests_that_didnt_run: I,
) -> Vec<usize>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut total = tests_that_ran.clone();
    for name in tests_that_didnt_run {
        total = total.plus_or_noop(name.into(), WithinTestGC::keeping_all());
    }
    let roots: Vec<(&String, &WithinTestGC)> = total.iter().collect();
    let keys: Vec<&String> = snapshots.keys().collect();

    let mut stale = Vec::new();
    let mut gc_idx = 0;
    let mut key_idx = 0;
    while key_idx < keys.len() && gc_idx < roots.len() {
        let key = keys[key_idx].as_str();
        let (root, gc) = (roots[gc_idx].0.as_str(), roots[gc_idx].1);
        if let Some(suffix) = key.strip_prefix(root) {
            if suffix.is_empty() || suffix.starts_with('/') {
                if !gc.keeps(suffix) {
                    stale.push(key_idx);
                }
                key_idx += 1;
            } else {
                // longer key with a non-slash continuation belongs to a later root
                gc_idx += 1;
            }
        } else if slash_first_cmp(root, key) == Ordering::Less {
            gc_idx += 1;
        } else {
            // no root owns this key
            stale.push(key_idx);
            key_idx += 1;
        }
    }
    stale.extend(key_idx..keys.len());
    stale
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snaps(keys: &[&str]) -> OrderedMap<String, Snapshot> {
        OrderedMap::of(keys.iter().map(|k| (k.to_string(), Snapshot::of(*k)))).unwrap()
    }

    #[test]
    fn subject_dropped_but_sub_kept() {
        let mut a = WithinTestGC::new();
        a.keep_suffix("/x");
        let ran = OrderedMap::of(vec![
            ("A".to_string(), a),
            ("B".to_string(), WithinTestGC::keeping_all()),
        ])
        .unwrap();
        let stale = find_stale_snapshots_within(&snaps(&["A", "A/x", "B"]), &ran, Vec::<String>::new());
        assert_eq!(stale, vec![0]);
    }

    #[test]
    fn tests_that_did_not_run_keep_everything() {
        let ran = OrderedMap::of(vec![("A".to_string(), WithinTestGC::new())]).unwrap();
        let stale = find_stale_snapshots_within(&snaps(&["A", "A/sub", "B", "B/sub", "C"]), &ran, ["B"]);
        // A ran and kept nothing, B did not run, C is unknown
        assert_eq!(stale, vec![0, 1, 4]);
    }

    #[test]
    fn prefix_without_slash_is_a_different_test() {
        let mut ab = WithinTestGC::new();
        ab.keep_suffix("");
        let ran = OrderedMap::of(vec![
            ("a".to_string(), WithinTestGC::new()),
            ("ab".to_string(), ab),
        ])
        .unwrap();
        let stale = find_stale_snapshots_within(&snaps(&["a", "ab", "ab/x"]), &ran, Vec::<String>::new());
        assert_eq!(stale, vec![0, 2]);
    }

    #[test]
    fn keep_all_is_sticky() {
        let mut gc = WithinTestGC::new();
        assert!(gc.succeeded_and_used_no_snapshots());
        gc.keep_all();
        gc.keep_suffix("/x");
        assert!(gc.is_keep_all());
        assert!(gc.keeps("/anything"));
        assert!(!gc.succeeded_and_used_no_snapshots());
    }
}
