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

use core::ops::{Deref, DerefMut};

/// Runs a function on drop, unless defused.
///
/// Used by the optimistic insert path to undo a tentative mutation (a
/// reserved size slot, a tentatively-published tag) if a later step in the
/// same insert fails or panics. Call [`ScopeGuard::defuse`] once the mutation
/// has been committed for good.
pub struct ScopeGuard<T, F>
where
    F: FnMut(&mut T),
{
    dropfn: F,
    value: T,
    armed: bool,
}

impl<T, F> ScopeGuard<T, F>
where
    F: FnMut(&mut T),
{
    pub fn new(value: T, dropfn: F) -> Self {
        ScopeGuard {
            dropfn,
            value,
            armed: true,
        }
    }
    /// Prevent `dropfn` from running; the mutation is considered committed.
    pub fn defuse(mut self) {
        self.armed = false;
    }
}

impl<T, F> Deref for ScopeGuard<T, F>
where
    F: FnMut(&mut T),
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T, F> DerefMut for ScopeGuard<T, F>
where
    F: FnMut(&mut T),
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, F> Drop for ScopeGuard<T, F>
where
    F: FnMut(&mut T),
{
    fn drop(&mut self) {
        if self.armed {
            (self.dropfn)(&mut self.value)
        }
    }
}
