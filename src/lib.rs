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

//! `flathash` — a concurrent, open-addressing hash table with fine-grained
//! per-group locking.
//!
//! The table is organized into groups of [`group::WIDTH`] slots, each
//! carrying a byte of reduced hash tag for fast SWAR matching and a
//! per-group reader/writer spinlock. Lookups and inserts only ever take a
//! table-wide lock in shared mode (one of [`stripe::StripedLock`]'s 128
//! stripes) plus the one or two group locks the probe sequence actually
//! touches — two unrelated keys essentially never contend. Structural
//! operations (`rehash`, `reserve`, `clear`, `merge`, `swap`) briefly take
//! every stripe exclusively.
//!
//! Two façades sit on top of the engine ([`table::ConcurrentTable`]):
//! [`map::ConcurrentMap`] for key/value storage and [`set::ConcurrentSet`]
//! for keys alone. Both dispatch entirely through [`policy::Policy`] at
//! compile time — there is no dynamic dispatch anywhere in the hot path.
//!
//! # Example
//!
//! ```
//! use flathash::ConcurrentMap;
//!
//! let m: ConcurrentMap<String, u32> = ConcurrentMap::new();
//! m.insert("apples".to_string(), 3);
//! m.get_mut("apples", |count| *count += 1);
//! assert_eq!(m.get("apples", |count| *count), Some(4));
//! ```
//!
//! See `SPEC_FULL.md` in the repository root for the full design notes, and
//! `DESIGN.md` for where each piece is grounded.

pub mod access;
pub mod alloc;
pub mod bitmask;
pub mod config;
pub mod error;
pub mod group;
pub mod hash;
pub mod map;
pub mod policy;
pub mod scopeguard;
pub mod set;
pub mod spinlock;
pub mod stripe;
pub mod table;
mod util;

pub use config::TableConfig;
pub use error::TableError;
pub use hash::{Comparable, FxBuildHasher, FxHasher};
pub use map::ConcurrentMap;
pub use policy::{MapPolicy, MutablePolicy, Policy, SetPolicy};
pub use set::ConcurrentSet;
pub use table::ConcurrentTable;
