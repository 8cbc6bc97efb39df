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

//! The table-wide striped lock.
//!
//! A single table-wide lock would serialize every concurrent operation
//! through one cache line. `StripedLock` instead holds `WIDTH` independent,
//! cache-line-padded [`RwSpinlock`]s; an ordinary lookup or insert takes only
//! one stripe shared, so unrelated threads mostly don't contend at all. A
//! structural change (rehash, `reserve`, `clear`) takes every stripe
//! exclusively, in ascending index order, which is what makes the "whole
//! table" operations linearizable against the striped ones without a single
//! global mutex.

use core::sync::atomic::{AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;

use crate::spinlock::{ExclusiveGuard, RwSpinlock, SharedGuard};

/// Number of stripes. Chosen well above typical core counts so that shared
/// acquisitions from unrelated threads rarely land on the same stripe.
pub const WIDTH: usize = 128;

static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Each thread is assigned a stripe once, round-robin, and reuses it for
    /// every table it touches. This trades perfectly uniform distribution
    /// for a cheap, allocation-free `current_thread_stripe()`.
    static THREAD_STRIPE: usize = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed) % WIDTH;
}

fn current_thread_stripe() -> usize {
    THREAD_STRIPE.with(|s| *s)
}

pub struct StripedLock {
    stripes: Box<[CachePadded<RwSpinlock>]>,
}

impl StripedLock {
    pub fn new() -> Self {
        Self {
            stripes: (0..WIDTH)
                .map(|_| CachePadded::new(RwSpinlock::new()))
                .collect(),
        }
    }

    /// Shared access through the calling thread's assigned stripe. Held for
    /// the duration of a single lookup/insert/erase against the table.
    pub fn shared(&self) -> SharedGuard<'_> {
        self.stripes[current_thread_stripe()].lock_shared()
    }

    /// Exclusive access across every stripe, ascending. Used by whole-table
    /// operations (`rehash`, `reserve`, `clear`).
    pub fn exclusive_all(&self) -> AllStripesGuard<'_> {
        let mut guards = Vec::with_capacity(WIDTH);
        for stripe in self.stripes.iter() {
            guards.push(stripe.lock_exclusive());
        }
        AllStripesGuard { guards }
    }
}

impl Default for StripedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds every stripe of one table exclusively.
pub struct AllStripesGuard<'a> {
    guards: Vec<ExclusiveGuard<'a>>,
}

impl Drop for AllStripesGuard<'_> {
    fn drop(&mut self) {
        // guards release in reverse acquisition order, matching the usual
        // stack-discipline convention; correctness doesn't depend on this
        // since every stripe is independent, but it keeps release order
        // predictable for anyone staring at a deadlock trace.
        while self.guards.pop().is_some() {}
    }
}

/// Locks two distinct tables' stripes exclusively without risking an AB/BA
/// deadlock: both callers order their acquisitions by the tables' addresses,
/// so whichever table sorts first is always locked first, table-wide, by
/// every thread.
///
/// Used by `merge`/`swap` (`4.5.7`/`4.5.8`), which must hold both tables
/// still for the duration of the operation.
pub fn lock_two<'a>(
    a: &'a StripedLock,
    b: &'a StripedLock,
) -> (AllStripesGuard<'a>, AllStripesGuard<'a>) {
    let addr_a = a as *const StripedLock as usize;
    let addr_b = b as *const StripedLock as usize;
    assert_ne!(addr_a, addr_b, "cannot dual-lock a table against itself");
    if addr_a < addr_b {
        let ga = a.exclusive_all();
        let gb = b.exclusive_all();
        (ga, gb)
    } else {
        let gb = b.exclusive_all();
        let ga = a.exclusive_all();
        (ga, gb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_access_does_not_block_other_stripes() {
        let lock = StripedLock::new();
        let _g = lock.shared();
        // a whole-table exclusive acquisition from a *different* thread would
        // still have to wait on this stripe; that's covered by the engine's
        // own concurrency tests. here we just check single-stripe bookkeeping
        // doesn't panic and round-trips.
        drop(_g);
        let _all = lock.exclusive_all();
    }

    #[test]
    fn lock_two_is_consistent_regardless_of_argument_order() {
        let a = StripedLock::new();
        let b = StripedLock::new();
        {
            let (_ga, _gb) = lock_two(&a, &b);
        }
        {
            let (_gb, _ga) = lock_two(&b, &a);
        }
    }
}
