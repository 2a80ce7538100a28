//! Exact merge of partial results
//!
//! Partials produced by different workers are combined with [`Merge`]. Every
//! implementation in this crate is associative and commutative with
//! `Default` as the identity, so the merged result does not depend on how
//! work was partitioned.

use std::collections::BTreeMap;

pub trait Merge {
    fn merge(&mut self, other: Self);
}

/// Union by key, merging values present on both sides
impl<K: Ord, V: Merge> Merge for BTreeMap<K, V> {
    fn merge(&mut self, other: Self) {
        for (key, value) in other {
            match self.get_mut(&key) {
                Some(existing) => existing.merge(value),
                None => {
                    self.insert(key, value);
                }
            }
        }
    }
}

/// Concatenation; used for per-circuit record lists that only one unit produces
impl<T> Merge for Vec<T> {
    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

/// Fold `parts` into a single value starting from the identity
pub fn merge_all<T, I>(parts: I) -> T
where
    T: Merge + Default,
    I: IntoIterator<Item = T>,
{
    parts.into_iter().fold(T::default(), |mut acc, part| {
        acc.merge(part);
        acc
    })
}
