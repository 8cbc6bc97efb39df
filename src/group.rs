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

//! Group metadata: a 16-byte record describing one group of 15 slots.
//!
//! Unlike the single-threaded swisstable lineage this is derived from, every
//! byte here lives behind its own [`AtomicU8`] — readers never take a lock to
//! inspect tags or the overflow byte, only the per-group access gate (see
//! [`crate::access`]) serializes the writers. `Ordering::Relaxed` is
//! sufficient throughout: the group lock (or, for the overflow byte, the
//! monotonic nature of an OR) supplies whatever happens-before relationship
//! the surrounding algorithm needs.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::bitmask::Bitmask;

/// Number of addressable slots per group.
pub const WIDTH: usize = 15;

/// Tag reserved for an empty slot.
pub const EMPTY: u8 = 0;
/// Tag reserved for a deleted slot. The engine never leaves a tombstone
/// behind (see `engine::erase`, which resets straight to [`EMPTY`]), but the
/// value stays reserved so that a future opportunistic-tombstone scheme (see
/// `SPEC_FULL.md` open questions) has somewhere to live without a tag-space
/// renumbering.
pub const DELETED: u8 = 1;

const ORD: Ordering = Ordering::Relaxed;

/// Derives the 7-bit reduced tag stored per occupied slot from a 64-bit hash.
///
/// `0` and `1` are reserved for [`EMPTY`]/[`DELETED`], so occupied tags are
/// clamped into `2..=127`.
#[inline]
pub fn reduced_tag(hash: u64) -> u8 {
    let low7 = (hash & 0x7f) as u8;
    if low7 < 2 {
        low7 + 2
    } else {
        low7
    }
}

/// Derives the overflow-bit index (`0..8`) for a hash.
#[inline]
pub fn overflow_bit(hash: u64) -> u8 {
    ((hash >> 8) & 0x7) as u8
}

/// A group of 15 tag bytes plus one overflow byte.
pub struct Group {
    tags: [AtomicU8; WIDTH],
    overflow: AtomicU8,
}

impl Group {
    /// A freshly allocated, all-empty group.
    pub fn new_empty() -> Self {
        Self {
            tags: [(); WIDTH].map(|_| AtomicU8::new(EMPTY)),
            overflow: AtomicU8::new(0),
        }
    }

    /// Positions whose tag equals the reduced tag derived from `hash`.
    #[inline]
    pub fn match_hash(&self, hash: u64) -> Bitmask {
        self.match_tag(reduced_tag(hash))
    }

    /// Positions whose tag equals `tag` exactly (`tag` must not be `EMPTY`/`DELETED`
    /// for this to mean "occupied match"). [`Self::match_hash`] is the only
    /// caller outside this module; split out so a hash-independent tag value
    /// can still be matched directly if one is ever needed.
    #[inline]
    pub fn match_tag(&self, tag: u8) -> Bitmask {
        let mut mask = 0u16;
        for (n, slot) in self.tags.iter().enumerate() {
            if slot.load(ORD) == tag {
                mask |= 1 << n;
            }
        }
        Bitmask(mask)
    }

    /// Positions whose tag is empty or deleted — candidates for insertion.
    #[inline]
    pub fn match_available(&self) -> Bitmask {
        let mut mask = 0u16;
        for (n, slot) in self.tags.iter().enumerate() {
            let t = slot.load(ORD);
            if t == EMPTY || t == DELETED {
                mask |= 1 << n;
            }
        }
        Bitmask(mask)
    }

    #[inline]
    pub fn is_occupied(&self, n: usize) -> bool {
        let t = self.tags[n].load(ORD);
        t != EMPTY && t != DELETED
    }

    /// Writes the reduced tag of `hash` at position `n`. Caller must hold the
    /// group's exclusive access gate.
    #[inline]
    pub fn set(&self, n: usize, hash: u64) {
        self.tags[n].store(reduced_tag(hash), ORD);
    }

    /// Clears position `n` back to empty. Caller must hold the group's
    /// exclusive access gate.
    #[inline]
    pub fn reset(&self, n: usize) {
        self.tags[n].store(EMPTY, ORD);
    }

    /// Sets the overflow bit for `hash`. Safe to call without the group lock
    /// (monotonic atomic-OR); see `4.5.3`'s rationale.
    #[inline]
    pub fn mark_overflow(&self, hash: u64) {
        let bit = 1u8 << overflow_bit(hash);
        self.overflow.fetch_or(bit, ORD);
    }

    /// `true` if the overflow bit for `hash` is clear, i.e. lookup may stop
    /// probing past this group for this hash.
    #[inline]
    pub fn is_not_overflowed(&self, hash: u64) -> bool {
        let bit = 1u8 << overflow_bit(hash);
        self.overflow.load(ORD) & bit == 0
    }

    /// Resets every tag to empty and clears the overflow byte. Caller must
    /// hold the group's exclusive access gate; used by `clear`/`rehash`.
    pub fn reset_all(&self) {
        for slot in &self.tags {
            slot.store(EMPTY, ORD);
        }
        self.overflow.store(0, ORD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduced_tag_avoids_reserved_values() {
        for h in 0u64..300 {
            let t = reduced_tag(h);
            assert!(t >= 2, "tag {t} from hash {h} clashes with reserved range");
        }
    }

    #[test]
    fn empty_group_matches_nothing_but_is_fully_available() {
        let g = Group::new_empty();
        assert!(!g.match_hash(42).any_bit_set());
        assert_eq!(g.match_available().0, 0x7fff);
    }

    #[test]
    fn set_then_match_round_trips() {
        let g = Group::new_empty();
        let hash = 0x1234_5678_9abc_def0;
        g.set(3, hash);
        assert!(g.is_occupied(3));
        let mask = g.match_hash(hash);
        assert!(mask.into_iter().any(|n| n == 3));
        g.reset(3);
        assert!(!g.is_occupied(3));
    }

    #[test]
    fn overflow_bits_are_monotonic() {
        let g = Group::new_empty();
        let hash = 777;
        assert!(g.is_not_overflowed(hash));
        g.mark_overflow(hash);
        assert!(!g.is_not_overflowed(hash));
        // clearing other slots never resets overflow
        g.reset_all();
        assert!(g.is_not_overflowed(hash));
    }
}
