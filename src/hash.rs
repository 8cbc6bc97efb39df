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

//! The default hasher, and heterogeneous lookup.
//!
//! [`Comparable`] is [`PartialEq`] with different expectations: it lets a
//! caller probe a table of `K` with a borrowed query type `Q` (e.g. look up a
//! `HashMap<String, _>` with a `&str`) without allocating a `K` first, as
//! long as the query hashes and compares the same way the owned key would.
//!
//! ☢️ implementations of this trait can trivially violate [`Eq`]'s invariants
//! if the hash/cmp relationship doesn't actually hold between `Self` and `K`.
//! The blanket impl below is the only impl the table itself ever relies on;
//! anything more exotic is the caller's responsibility.

use core::{
    borrow::Borrow,
    hash::{BuildHasher, Hash, Hasher},
};

const ROTATE: u32 = 5;
const PRIME64: u64 = 0x517C_C1B7_2722_0A95;

fn hash64(state: u64, word: u64) -> u64 {
    (state.rotate_left(ROTATE) ^ word).wrapping_mul(PRIME64)
}

/// A small, fast, non-cryptographic hasher. Table throughput depends far
/// more on lock contention than on hash quality, so this favours speed over
/// DoS resistance — callers with adversarial input should supply their own
/// [`BuildHasher`] instead of the default.
#[derive(Debug, Default, Clone, Copy)]
pub struct FxHasher(u64);

impl Hasher for FxHasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, mut bytes: &[u8]) {
        let mut state = self.0;
        while bytes.len() >= 8 {
            state = hash64(
                state,
                u64::from_ne_bytes([
                    bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
                ]),
            );
            bytes = &bytes[8..];
        }
        if bytes.len() >= 4 {
            state = hash64(
                state,
                u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64,
            );
            bytes = &bytes[4..];
        }
        if bytes.len() >= 2 {
            state = hash64(state, u16::from_ne_bytes([bytes[0], bytes[1]]) as u64);
            bytes = &bytes[2..];
        }
        if !bytes.is_empty() {
            state = hash64(state, bytes[0] as u64);
        }
        self.0 = state;
    }

    fn write_u64(&mut self, i: u64) {
        self.0 = hash64(self.0, i);
    }

    fn write_usize(&mut self, i: usize) {
        self.0 = hash64(self.0, i as u64);
    }
}

/// The default [`BuildHasher`] used by [`crate::map::ConcurrentMap`] and
/// [`crate::set::ConcurrentSet`] when no hasher is specified.
#[derive(Debug, Default, Clone, Copy)]
pub struct FxBuildHasher;

impl BuildHasher for FxBuildHasher {
    type Hasher = FxHasher;
    fn build_hasher(&self) -> FxHasher {
        FxHasher::default()
    }
}

/// Heterogeneous equality: `Self` (a borrowed query) can be compared against
/// an owned key `K` without constructing a `K`.
pub trait Comparable<K: ?Sized>: Hash {
    fn cmp_eq(&self, key: &K) -> bool;
}

impl<K: Borrow<T>, T: Eq + Hash + ?Sized> Comparable<K> for T {
    fn cmp_eq(&self, key: &K) -> bool {
        self == key.borrow()
    }
}

/// Computes the hash of `query` under `hash_builder`, for use against a table
/// keyed by `K` (`query` must be `Comparable<K>`).
#[inline]
pub fn hash_one<S: BuildHasher, Q: Hash + ?Sized>(hash_builder: &S, query: &Q) -> u64 {
    let mut hasher = hash_builder.build_hasher();
    query.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_hashes_equal() {
        let b = FxBuildHasher;
        assert_eq!(hash_one(&b, "hello"), hash_one(&b, "hello"));
    }

    #[test]
    fn comparable_matches_borrowed_query() {
        let owned = String::from("abc");
        let query: &str = "abc";
        assert!(Comparable::<String>::cmp_eq(query, &owned));
    }
}
