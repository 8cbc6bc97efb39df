/*
 * Created on Mon Jul 27 2026
 *
 * This file is a part of Flathash
 * Flathash is a concurrent, closure-based hash table built around fine-grained
 * per-group locking, aiming to deliver predictable latency under read-heavy
 * and write-heavy concurrent workloads alike.
 *
 * Copyright (c) 2026, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! A thread-safe set. Identical shape to [`crate::map::ConcurrentMap`], just
//! backed by [`crate::policy::SetPolicy`] instead of
//! [`crate::policy::MapPolicy`].

use core::hash::{BuildHasher, Hash};

use crate::alloc::{Allocator, Global};
use crate::error::TableError;
use crate::hash::{Comparable, FxBuildHasher};
use crate::policy::SetPolicy;
use crate::table::ConcurrentTable;
use crate::TableConfig;

pub struct ConcurrentSet<K, S = FxBuildHasher, A: Allocator = Global> {
    inner: ConcurrentTable<SetPolicy<K>, S, A>,
}

impl<K> ConcurrentSet<K, FxBuildHasher, Global>
where
    K: Hash + Eq + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: ConcurrentTable::new(),
        }
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self {
            inner: ConcurrentTable::with_config(config),
        }
    }
}

impl<K> Default for ConcurrentSet<K, FxBuildHasher, Global>
where
    K: Hash + Eq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S, A> ConcurrentSet<K, S, A>
where
    K: Hash + Eq + 'static,
    S: BuildHasher,
    A: Allocator,
{
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            inner: ConcurrentTable::with_hasher_in(hash_builder, alloc),
        }
    }

    pub fn try_with_config_in(
        config: TableConfig,
        hash_builder: S,
        alloc: A,
    ) -> Result<Self, TableError> {
        Ok(Self {
            inner: ConcurrentTable::try_with_config_in(config, hash_builder, alloc)?,
        })
    }

    /// Inserts `key` if not already present. Returns `true` iff inserted.
    pub fn insert(&self, key: K) -> bool {
        self.inner.try_emplace(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Comparable<K> + ?Sized,
    {
        self.inner.contains(key)
    }

    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        Q: Comparable<K> + ?Sized,
    {
        self.inner.erase(key)
    }

    pub fn remove_if<Q, F>(&self, key: &Q, pred: F) -> bool
    where
        Q: Comparable<K> + ?Sized,
        F: FnMut(&K) -> bool,
    {
        self.inner.erase_if(key, pred)
    }

    pub fn retain<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        self.inner.erase_if_all(|k, _| !pred(k))
    }

    pub fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&K),
    {
        self.inner.cvisit_all(|k, _| f(k))
    }

    pub fn len(&self) -> usize {
        self.inner.size()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn load_factor(&self) -> f32 {
        self.inner.load_factor()
    }

    pub fn reserve(&self, additional: usize) {
        self.inner.reserve(additional)
    }

    pub fn clear(&self) {
        self.inner.clear()
    }

    pub fn merge(&self, other: &Self) {
        self.inner.merge(&other.inner)
    }

    pub fn swap(&self, other: &Self) {
        self.inner.swap(&other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn insert_contains_remove_round_trip() {
        let s: ConcurrentSet<i32> = ConcurrentSet::new();
        assert!(s.insert(1));
        assert!(!s.insert(1));
        assert!(s.contains(&1));
        assert!(s.remove(&1));
        assert!(!s.contains(&1));
    }

    #[test]
    fn heterogeneous_lookup_by_borrowed_str() {
        let s: ConcurrentSet<String> = ConcurrentSet::new();
        s.insert("hello".to_string());
        assert!(s.contains("hello"));
        assert!(!s.contains("goodbye"));
    }

    #[test]
    fn concurrent_dedup_across_threads() {
        let s = Arc::new(ConcurrentSet::<i64>::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = Arc::clone(&s);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    s.insert(i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.len(), 200);
    }
}
