//! Immutable sorted association list with binary search.
//!
//! - Keys are unique and strictly ascending under `KeyOrder`.
//! - Every "mutation" returns a new instance; the backing storage is shared
//!   copy-on-write through an `Arc`, and the empty map owns no storage at all.
//! - String keys sort with `/` before every other character, so `a/b` groups
//!   right after `a` and before `a!` or `aa`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SelfieError};

/// Total order used by `OrderedMap`.
pub trait KeyOrder {
    fn key_cmp(&self, other: &Self) -> Ordering;
}

impl KeyOrder for String {
    fn key_cmp(&self, other: &Self) -> Ordering {
        slash_first_cmp(self, other)
    }
}

/// String comparison where `/` sorts before all other characters.
pub fn slash_first_cmp(a: &str, b: &str) -> Ordering {
    let map = |c: char| if c == '/' { '\0' } else { c };
    a.chars().map(map).cmp(b.chars().map(map))
}

pub struct OrderedMap<K, V> {
    data: Option<Arc<Vec<(K, V)>>>,
}

impl<K, V> Clone for OrderedMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
        }
    }
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K, V> OrderedMap<K, V> {
    pub const fn empty() -> Self {
        Self { data: None }
    }

    fn entries(&self) -> &[(K, V)] {
        match &self.data {
            Some(v) => v.as_slice(),
            None => &[],
        }
    }

    fn from_vec(v: Vec<(K, V)>) -> Self {
        if v.is_empty() {
            Self::empty()
        } else {
            Self { data: Some(Arc::new(v)) }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries().iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries().iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries().iter().map(|(_, v)| v)
    }

    pub fn key_at(&self, idx: usize) -> Option<&K> {
        self.entries().get(idx).map(|(k, _)| k)
    }

    pub fn value_at(&self, idx: usize) -> Option<&V> {
        self.entries().get(idx).map(|(_, v)| v)
    }

    /// True when both maps share the same backing storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.data, &other.data) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<K: KeyOrder + Clone, V: Clone> OrderedMap<K, V> {
    /// Builds a map from unsorted pairs. Fails on a duplicate key.
    pub fn of(pairs: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: fmt::Debug,
    {
        let mut v: Vec<(K, V)> = pairs.into_iter().collect();
        v.sort_by(|a, b| a.0.key_cmp(&b.0));
        for w in v.windows(2) {
            if w[0].0.key_cmp(&w[1].0) == Ordering::Equal {
                return Err(SelfieError::invalid(format!(
                    "Key already exists: {:?}",
                    w[0].0
                )));
            }
        }
        Ok(Self::from_vec(v))
    }

    /// `Ok(idx)` when present, `Err(insertion point)` otherwise.
    pub fn binary_search(&self, key: &K) -> std::result::Result<usize, usize> {
        self.entries().binary_search_by(|(k, _)| k.key_cmp(key))
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.binary_search(key).ok().map(|idx| &self.entries()[idx].1)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.binary_search(key).is_ok()
    }

    fn inserted(&self, idx: usize, key: K, value: V) -> Self {
        let mut v = Vec::with_capacity(self.len() + 1);
        v.extend_from_slice(self.entries());
        v.insert(idx, (key, value));
        Self::from_vec(v)
    }

    fn replaced(&self, idx: usize, value: V) -> Self {
        let mut v = self.entries().to_vec();
        v[idx].1 = value;
        Self::from_vec(v)
    }

    /// Inserts a new key. A key that is already present is an error.
    pub fn plus(&self, key: K, value: V) -> Result<Self>
    where
        K: fmt::Debug,
    {
        match self.binary_search(&key) {
            Ok(_) => Err(SelfieError::invalid(format!(
                "Key already exists: {:?}",
                key
            ))),
            Err(idx) => Ok(self.inserted(idx, key, value)),
        }
    }

    /// Inserts a new key, or returns `self` unchanged when it is already present.
    pub fn plus_or_noop(&self, key: K, value: V) -> Self {
        match self.binary_search(&key) {
            Ok(_) => self.clone(),
            Err(idx) => self.inserted(idx, key, value),
        }
    }

    pub fn plus_or_replace(&self, key: K, value: V) -> Self {
        match self.binary_search(&key) {
            Ok(idx) => self.replaced(idx, value),
            Err(idx) => self.inserted(idx, key, value),
        }
    }

    /// Like `plus_or_replace`, but returns `None` when the map already holds
    /// an equal value for `key`.
    pub fn plus_or_noop_or_replace(&self, key: K, value: V) -> Option<Self>
    where
        V: PartialEq,
    {
        match self.binary_search(&key) {
            Ok(idx) if self.entries()[idx].1 == value => None,
            Ok(idx) => Some(self.replaced(idx, value)),
            Err(idx) => Some(self.inserted(idx, key, value)),
        }
    }

    /// Removes the entries at `indices`, which must be ascending and in range.
    pub fn minus_by_indices(&self, indices: &[usize]) -> Self {
        if indices.is_empty() {
            return self.clone();
        }
        debug_assert!(indices.windows(2).all(|w| w[0] < w[1]));
        let mut next = indices.iter().peekable();
        let mut v = Vec::with_capacity(self.len().saturating_sub(indices.len()));
        for (i, e) in self.entries().iter().enumerate() {
            if next.peek() == Some(&&i) {
                next.next();
            } else {
                v.push(e.clone());
            }
        }
        Self::from_vec(v)
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for OrderedMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries() == other.entries()
    }
}

impl<K: Eq, V: Eq> Eq for OrderedMap<K, V> {}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrderedMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Sorted set on top of `OrderedMap`.
#[derive(Clone, PartialEq, Eq)]
pub struct OrderedSet<K> {
    map: OrderedMap<K, ()>,
}

impl<K> Default for OrderedSet<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K> OrderedSet<K> {
    pub const fn empty() -> Self {
        Self {
            map: OrderedMap::empty(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }
}

impl<K: KeyOrder + Clone> OrderedSet<K> {
    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Adds `key`, or returns `self` when it is already a member.
    pub fn plus_or_this(&self, key: K) -> Self {
        Self {
            map: self.map.plus_or_noop(key, ()),
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for OrderedSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(x: &str) -> String {
        x.to_string()
    }

    #[test]
    fn slash_sorts_first() {
        let mut keys = vec![s("a!"), s("aa"), s("a/b"), s("a"), s("b"), s("a/a")];
        keys.sort_by(|a, b| slash_first_cmp(a, b));
        assert_eq!(keys, vec!["a", "a/a", "a/b", "a!", "aa", "b"]);
    }

    #[test]
    fn plus_keeps_order_and_rejects_duplicates() {
        let m = OrderedMap::empty()
            .plus(s("b"), 2)
            .unwrap()
            .plus(s("a"), 1)
            .unwrap()
            .plus(s("a/x"), 3)
            .unwrap();
        let keys: Vec<&String> = m.keys().collect();
        assert_eq!(keys, vec!["a", "a/x", "b"]);
        assert!(m.plus(s("b"), 9).is_err());
        assert_eq!(m.get(&s("a/x")), Some(&3));
        assert_eq!(m.get(&s("zz")), None);
    }

    #[test]
    fn noop_or_replace_reports_change() {
        let m = OrderedMap::empty().plus(s("k"), 1).unwrap();
        assert!(m.plus_or_noop_or_replace(s("k"), 1).is_none());
        let m2 = m.plus_or_noop_or_replace(s("k"), 2).unwrap();
        assert_eq!(m2.get(&s("k")), Some(&2));
        assert!(m.plus_or_noop(s("k"), 5).ptr_eq(&m));
    }

    #[test]
    fn minus_then_reinsert_reproduces_map() {
        let m = OrderedMap::of(vec![(s("a"), 1), (s("b"), 2), (s("c"), 3)]).unwrap();
        let removed = m.minus_by_indices(&[0, 2]);
        assert_eq!(removed.len(), 1);
        let back = removed.plus(s("a"), 1).unwrap().plus(s("c"), 3).unwrap();
        assert_eq!(back, m);
        assert!(m.minus_by_indices(&[0, 1, 2]).is_empty());
    }

    #[test]
    fn empty_maps_share_nothing() {
        let a: OrderedMap<String, i32> = OrderedMap::empty();
        let b: OrderedMap<String, i32> = OrderedMap::default();
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn random_inserts_stay_sorted_and_reject_duplicates() {
        use oorandom::Rand64;

        const PARTS: &[&str] = &["a", "b", "/", "a/", "!", "z", "/b", " "];
        let mut rng = Rand64::new(0x0dd_3a9);
        for _ in 0..200 {
            let mut map: OrderedMap<String, u64> = OrderedMap::empty();
            let mut model: Vec<(String, u64)> = Vec::new();
            for step in 0..rng.rand_range(0..40) {
                let key: String = (0..rng.rand_range(0..4))
                    .map(|_| PARTS[rng.rand_range(0..PARTS.len() as u64) as usize])
                    .collect();
                match map.plus(key.clone(), step) {
                    Ok(next) => {
                        assert!(model.iter().all(|(k, _)| *k != key), "accepted duplicate {:?}", key);
                        // исходная версия не меняется
                        assert!(!map.contains_key(&key));
                        assert_eq!(next.len(), map.len() + 1);
                        model.push((key, step));
                        map = next;
                    }
                    Err(SelfieError::InvalidArgument(_)) => {
                        assert!(model.iter().any(|(k, _)| *k == key), "rejected new {:?}", key);
                    }
                    Err(other) => panic!("unexpected {:?}", other),
                }
            }
            model.sort_by(|a, b| slash_first_cmp(&a.0, &b.0));
            let got: Vec<(String, u64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
            assert_eq!(got, model);
            for w in got.windows(2) {
                assert_eq!(slash_first_cmp(&w[0].0, &w[1].0), Ordering::Less, "{:?}", w);
            }
            for (k, v) in &model {
                assert_eq!(map.get(k), Some(v));
            }
        }
    }

    #[test]
    fn set_plus_or_this() {
        let set = OrderedSet::empty().plus_or_this(s("/x")).plus_or_this(s(""));
        assert!(set.contains(&s("")));
        assert!(set.contains(&s("/x")));
        assert_eq!(set.plus_or_this(s("/x")).len(), 2);
    }
}
