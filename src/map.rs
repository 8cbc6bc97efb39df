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

//! A thread-safe key/value map. A thin façade over [`ConcurrentTable`]; every
//! bit of locking logic lives there, not here (`SPEC_FULL.md` §4.6).

use core::hash::{BuildHasher, Hash};

use crate::alloc::{Allocator, Global};
use crate::error::TableError;
use crate::hash::{Comparable, FxBuildHasher};
use crate::policy::MapPolicy;
use crate::table::ConcurrentTable;
use crate::TableConfig;

/// A concurrent hash map keyed by `K`, storing `V`.
///
/// Cloning a [`ConcurrentMap`] is not supported — wrap it in an [`std::sync::Arc`]
/// to share it across threads, the same way callers are expected to share
/// `skymap`'s tables upstream.
pub struct ConcurrentMap<K, V, S = FxBuildHasher, A: Allocator = Global> {
    inner: ConcurrentTable<MapPolicy<K, V>, S, A>,
}

impl<K, V> ConcurrentMap<K, V, FxBuildHasher, Global>
where
    K: Hash + Eq + 'static,
    V: 'static,
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

impl<K, V> Default for ConcurrentMap<K, V, FxBuildHasher, Global>
where
    K: Hash + Eq + 'static,
    V: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, A> ConcurrentMap<K, V, S, A>
where
    K: Hash + Eq + 'static,
    V: 'static,
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

    /// Inserts `key`/`value` if `key` is not already present. Returns `true`
    /// iff inserted.
    pub fn insert(&self, key: K, value: V) -> bool {
        self.inner.try_emplace((key, value))
    }

    /// Inserts `key`/`value` if absent, otherwise runs `on_existing` against
    /// the existing value. Returns `true` iff a new entry was inserted.
    pub fn insert_or_visit<F>(&self, key: K, value: V, on_existing: F) -> bool
    where
        F: FnMut(&mut V),
    {
        self.inner.insert_or_visit((key, value), on_existing)
    }

    /// Reads the value for `key` under a shared per-group lock.
    pub fn get<Q, R>(&self, key: &Q, f: impl FnOnce(&V) -> R) -> Option<R>
    where
        Q: Comparable<K> + ?Sized,
    {
        self.inner.cvisit(key, f)
    }

    /// Mutates the value for `key` under an exclusive per-group lock.
    pub fn get_mut<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        Q: Comparable<K> + ?Sized,
    {
        self.inner.visit(key, f)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
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

    /// Removes `key` iff `pred` returns `true` for its current value.
    pub fn remove_if<Q, F>(&self, key: &Q, pred: F) -> bool
    where
        Q: Comparable<K> + ?Sized,
        F: FnMut(&V) -> bool,
    {
        self.inner.erase_if(key, pred)
    }

    /// Removes every entry for which `pred` returns `true`. Returns the
    /// number removed.
    pub fn retain<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.inner.erase_if_all(|k, v| !pred(k, v))
    }

    pub fn for_each<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &mut V),
    {
        self.inner.visit_all(f)
    }

    pub fn for_each_shared<F>(&self, f: F) -> usize
    where
        F: FnMut(&K, &V),
    {
        self.inner.cvisit_all(f)
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

    /// Moves every entry of `other` whose key isn't already present in
    /// `self`. See [`ConcurrentTable::merge`] for the locking discipline.
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
    fn insert_get_remove_round_trip() {
        let m: ConcurrentMap<String, i32> = ConcurrentMap::new();
        assert!(m.insert("a".to_string(), 1));
        assert!(!m.insert("a".to_string(), 2));
        assert_eq!(m.get("a", |v| *v), Some(1));
        assert!(m.remove("a"));
        assert!(m.get("a", |v| *v).is_none());
    }

    #[test]
    fn get_mut_updates_in_place() {
        let m: ConcurrentMap<&str, i32> = ConcurrentMap::new();
        m.insert("counter", 0);
        for _ in 0..10 {
            m.get_mut("counter", |v| *v += 1);
        }
        assert_eq!(m.get("counter", |v| *v), Some(10));
    }

    #[test]
    fn retain_keeps_matching_entries() {
        let m: ConcurrentMap<i32, i32> = ConcurrentMap::new();
        for i in 0..20 {
            m.insert(i, i * i);
        }
        m.retain(|k, _| k % 2 == 0);
        assert_eq!(m.len(), 10);
        assert!(m.contains_key(&4));
        assert!(!m.contains_key(&5));
    }

    #[test]
    fn concurrent_inserts_from_many_threads_all_land() {
        let m = Arc::new(ConcurrentMap::<i64, i64>::new());
        let mut handles = Vec::new();
        for t in 0..8 {
            let m = Arc::clone(&m);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    m.insert(t * 500 + i, i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.len(), 4000);
    }
}
