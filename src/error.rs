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

//! The error surface for the allocation-failure paths described in
//! `SPEC_FULL.md` §7. Hand-rolled rather than pulled in from `thiserror`,
//! matching the lineage's own error types (see e.g. `auth::errors` and
//! `storage::v1::error` in the original server crate) which are plain enums
//! with a manual [`Display`] impl.

use core::fmt;
use crate::alloc::Layout;

#[derive(Debug)]
pub enum TableError {
    /// The allocator refused to hand back memory for the requested layout.
    /// Any arrays already allocated for this operation have been released
    /// before this is returned (`SPEC_FULL.md` §4.3/§7).
    AllocationFailed { layout: Layout },
    /// The requested capacity cannot be represented (e.g. overflow while
    /// rounding up to the next power of two, or while computing the byte
    /// size of the element array).
    CapacityOverflow,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::AllocationFailed { layout } => write!(
                f,
                "allocation failed for layout (size = {}, align = {})",
                layout.size(),
                layout.align()
            ),
            TableError::CapacityOverflow => write!(f, "requested capacity overflows"),
        }
    }
}

impl std::error::Error for TableError {}
