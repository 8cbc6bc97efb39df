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

//! A busy-wait reader/writer lock.
//!
//! This is a gate, not a container: it has no payload of its own, it only
//! serializes access to state that lives alongside it (a stripe's groups, or
//! the table-wide arrays). That's a deliberate departure from `RwLock<T>` —
//! the data a [`RwSpinlock`] guards is frequently itself a collection of
//! independently-atomic fields, so there is nothing for the lock to own.
//!
//! Every acquire path spins rather than parks a thread. The tables this
//! guards are sized so that critical sections are short (a handful of atomic
//! loads/stores over 15 slots), which is the tradeoff that makes busy-waiting
//! worthwhile here and a poor choice almost everywhere else.

use core::hint;
use core::sync::atomic::{AtomicI32, Ordering};

const ORD_RLX: Ordering = Ordering::Relaxed;
const ORD_ACQ: Ordering = Ordering::Acquire;
const ORD_REL: Ordering = Ordering::Release;

/// Sentinel state meaning "held exclusively".
const WRITER: i32 = -1;
/// Sentinel state meaning "uncontended, unheld".
const FREE: i32 = 0;

/// A reader/writer spinlock with no payload.
///
/// State is a single `i32`: `0` free, `-1` write-held, `n > 0` held by `n`
/// concurrent readers.
pub struct RwSpinlock {
    state: AtomicI32,
}

impl RwSpinlock {
    pub const fn new() -> Self {
        Self {
            state: AtomicI32::new(FREE),
        }
    }

    /// Spins until a shared (read) acquisition succeeds.
    pub fn lock_shared(&self) -> SharedGuard<'_> {
        loop {
            let cur = self.state.load(ORD_RLX);
            if cur != WRITER {
                if self
                    .state
                    .compare_exchange_weak(cur, cur + 1, ORD_ACQ, ORD_RLX)
                    .is_ok()
                {
                    return SharedGuard { lock: self };
                }
            }
            hint::spin_loop();
        }
    }

    /// Attempts a shared acquisition without spinning.
    pub fn try_lock_shared(&self) -> Option<SharedGuard<'_>> {
        let cur = self.state.load(ORD_RLX);
        if cur == WRITER {
            return None;
        }
        self.state
            .compare_exchange(cur, cur + 1, ORD_ACQ, ORD_RLX)
            .ok()
            .map(|_| SharedGuard { lock: self })
    }

    /// Spins until an exclusive (write) acquisition succeeds.
    pub fn lock_exclusive(&self) -> ExclusiveGuard<'_> {
        loop {
            if self
                .state
                .compare_exchange_weak(FREE, WRITER, ORD_ACQ, ORD_RLX)
                .is_ok()
            {
                return ExclusiveGuard { lock: self };
            }
            hint::spin_loop();
        }
    }

    /// Attempts an exclusive acquisition without spinning.
    pub fn try_lock_exclusive(&self) -> Option<ExclusiveGuard<'_>> {
        self.state
            .compare_exchange(FREE, WRITER, ORD_ACQ, ORD_RLX)
            .ok()
            .map(|_| ExclusiveGuard { lock: self })
    }

    fn unlock_shared(&self) {
        self.state.fetch_sub(1, ORD_REL);
    }

    fn unlock_exclusive(&self) {
        self.state.store(FREE, ORD_REL);
    }
}

impl Default for RwSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Held while a thread has shared (read) access.
pub struct SharedGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_shared();
    }
}

/// Held while a thread has exclusive (write) access.
pub struct ExclusiveGuard<'a> {
    lock: &'a RwSpinlock,
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn shared_guards_coexist() {
        let lock = RwSpinlock::new();
        let g1 = lock.lock_shared();
        let g2 = lock.lock_shared();
        assert!(lock.try_lock_exclusive().is_none());
        drop(g1);
        drop(g2);
        assert!(lock.try_lock_exclusive().is_some());
    }

    #[test]
    fn exclusive_excludes_shared() {
        let lock = RwSpinlock::new();
        let _wg = lock.lock_exclusive();
        assert!(lock.try_lock_shared().is_none());
    }

    #[test]
    fn concurrent_writers_serialize() {
        let lock = Arc::new(RwSpinlock::new());
        let counter = Arc::new(AtomicI32::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let _g = lock.lock_exclusive();
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
