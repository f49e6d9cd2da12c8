//! In-memory typed transformations.
//!
//! [`Dataset`] stands in for a SQL view: a batch of rows that can be
//! filtered, projected, deduplicated and joined. Operations return a new
//! dataset rather than mutating in place.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// An owned collection of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset<T> {
    rows: Vec<T>,
}

impl<T> Default for Dataset<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> FromIterator<T> for Dataset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for Dataset<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<T> Dataset<T> {
    pub fn from_rows(rows: Vec<T>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    /// Keep rows matching `predicate`.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        let mut predicate = predicate;
        self.rows.into_iter().filter(|row| predicate(row)).collect()
    }

    /// Project rows, dropping those that map to `None`.
    pub fn filter_map<U, F>(&self, f: F) -> Dataset<U>
    where
        F: FnMut(&T) -> Option<U>,
    {
        self.rows.iter().filter_map(f).collect()
    }

    /// Inner equi-join.
    ///
    /// A row whose key is `None` never matches. Each left row is paired with
    /// every right row sharing its key, so duplicate right keys fan out. Output
    /// keeps left order, then right order within a key.
    pub fn inner_join<R, K, LK, RK, C, O>(
        &self,
        right: &Dataset<R>,
        left_key: LK,
        right_key: RK,
        combine: C,
    ) -> Dataset<O>
    where
        K: Eq + Hash,
        LK: Fn(&T) -> Option<K>,
        RK: Fn(&R) -> Option<K>,
        C: Fn(&T, &R) -> O,
    {
        let mut index: HashMap<K, Vec<&R>> = HashMap::new();
        for row in right.iter() {
            if let Some(key) = right_key(row) {
                index.entry(key).or_default().push(row);
            }
        }

        let mut joined = Vec::new();
        for left in &self.rows {
            let Some(matches) = left_key(left).and_then(|key| index.get(&key)) else {
                continue;
            };
            joined.extend(matches.iter().map(|right| combine(left, *right)));
        }
        Dataset::from_rows(joined)
    }
}

impl<T: Ord> Dataset<T> {
    /// Drop duplicate rows (whole-row equality). Result is sorted.
    pub fn distinct(self) -> Self {
        let unique: BTreeSet<T> = self.rows.into_iter().collect();
        unique.into_iter().collect()
    }

    /// Sort rows, keeping duplicates.
    pub fn sorted(mut self) -> Self {
        self.rows.sort();
        self
    }
}
