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

//! Per-group access control: a lock plus a monotonic insert counter.
//!
//! The counter is what lets the optimistic insert protocol (`4.5.3`) detect
//! whether a group changed between the moment a thread released its shared
//! lock to compute a slot and the moment it re-acquired exclusively to
//! publish into that slot. It only ever needs to increase — readers never
//! touch it.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::spinlock::{ExclusiveGuard, RwSpinlock, SharedGuard};

/// Gate and insert-generation counter for one group.
pub struct GroupAccess {
    lock: RwSpinlock,
    insert_count: AtomicU32,
}

impl GroupAccess {
    pub const fn new() -> Self {
        Self {
            lock: RwSpinlock::new(),
            insert_count: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn lock_shared(&self) -> SharedGuard<'_> {
        self.lock.lock_shared()
    }

    #[inline]
    pub fn lock_exclusive(&self) -> ExclusiveGuard<'_> {
        self.lock.lock_exclusive()
    }

    /// A snapshot of the current insert generation. Read under a shared lock,
    /// compared after reacquiring exclusively.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.insert_count.load(Ordering::Relaxed)
    }

    /// Bumps the insert generation, returning the value it held *before* the
    /// bump. The optimistic insert protocol (`4.5.3`) compares this against an
    /// earlier [`GroupAccess::generation`] snapshot to decide whether to
    /// commit or restart.
    #[inline]
    pub fn bump_generation(&self) -> u32 {
        self.insert_count.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for GroupAccess {
    fn default() -> Self {
        Self::new()
    }
}
