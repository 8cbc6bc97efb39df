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

//! Construction-time configuration: initial capacity and max load factor.
//!
//! Mirrors the capacity-rounding helpers the lineage keeps next to its own
//! hash tables (see `corestore::htable`/`coredb::htable`'s `with_capacity`
//! constructors) rather than exposing raw group counts to callers.

use crate::group::WIDTH;

/// Smallest non-empty table size, in groups. One group holds
/// [`WIDTH`](crate::group::WIDTH) (15) slots.
const MIN_GROUPS: usize = 1;
/// An upper bound generous enough that nobody configures it by accident;
/// exists purely to turn a pathological `with_capacity` into a clean
/// [`crate::error::TableError::CapacityOverflow`] instead of an OOM abort.
const MAX_GROUPS: usize = 1 << 28;

const DEFAULT_LOAD_FACTOR: f32 = 0.875;

/// A builder for the capacity and load-factor knobs of a
/// [`ConcurrentTable`](crate::table::ConcurrentTable),
/// [`ConcurrentMap`](crate::map::ConcurrentMap), or
/// [`ConcurrentSet`](crate::set::ConcurrentSet).
#[derive(Debug, Clone, Copy)]
pub struct TableConfig {
    capacity: usize,
    load_factor: f32,
}

impl TableConfig {
    /// A config for an empty table: zero groups, no allocation until the
    /// first insert (`SPEC_FULL.md` §3).
    pub const fn new() -> Self {
        Self {
            capacity: 0,
            load_factor: DEFAULT_LOAD_FACTOR,
        }
    }

    /// Requests room for at least `capacity` elements up front.
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the fraction of `capacity()` that may be occupied before a
    /// `rehash` is triggered. Clamped to `(0.0, 1.0]` at construction time.
    pub fn load_factor(mut self, load_factor: f32) -> Self {
        assert!(
            load_factor > 0.0 && load_factor <= 1.0,
            "load factor must be in (0.0, 1.0]"
        );
        self.load_factor = load_factor;
        self
    }

    pub(crate) fn load_factor_value(&self) -> f32 {
        self.load_factor
    }

    /// Rounds the requested capacity up to a number of groups (a power of
    /// two), clamped to `[MIN_GROUPS, MAX_GROUPS]`. Returns `0` groups when
    /// no initial capacity was requested, preserving the allocation-free
    /// empty table.
    pub(crate) fn initial_groups(&self) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        let needed_groups = self.capacity.div_ceil(WIDTH);
        needed_groups
            .next_power_of_two()
            .clamp(MIN_GROUPS, MAX_GROUPS)
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_wants_zero_groups() {
        assert_eq!(TableConfig::new().initial_groups(), 0);
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two_groups() {
        // 16 elements need ceil(16/15) = 2 groups, rounded up to 2 (already pow2).
        assert_eq!(TableConfig::new().with_capacity(16).initial_groups(), 2);
        // 1 element still needs a whole group.
        assert_eq!(TableConfig::new().with_capacity(1).initial_groups(), 1);
    }

    #[test]
    #[should_panic]
    fn rejects_out_of_range_load_factor() {
        TableConfig::new().load_factor(1.5);
    }
}
