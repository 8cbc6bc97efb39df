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

//! The type policy: a compile-time trait that tells [`crate::table::ConcurrentTable`]
//! how to lay out an element and how to build one from caller-supplied
//! construction arguments, without the engine ever needing to know whether it
//! is backing a map or a set.
//!
//! This is the same seam the source (boost's `concurrent_table`) threads
//! through a C++ template parameter (`key_from`, `value_from`, `init_type`);
//! here it's a trait with associated types, resolved entirely at compile
//! time — no vtable, no dynamic dispatch.

use core::hash::Hash;

/// Supplies the engine with everything it needs to store and address one
/// kind of element, without itself doing any locking.
///
/// [`ConcurrentMap`](crate::map::ConcurrentMap) and
/// [`ConcurrentSet`](crate::set::ConcurrentSet) are the two implementors that
/// ship with this crate; both are thin façades with no locking logic of
/// their own (see `SPEC_FULL.md` §4.6) — all of it lives in
/// [`crate::table::ConcurrentTable`].
pub trait Policy: 'static {
    /// The key type used for hashing, equality, and probing.
    type Key: Hash + Eq;
    /// The type a visitor observes. For a map this is the stored value; for
    /// a set it is the key itself.
    type Value;
    /// The type actually stored in a slot.
    type Element;
    /// What a caller supplies to construct a new element (e.g. `(K, V)` for
    /// a map, just `K` for a set).
    type Args;

    /// Borrows the key out of a stored element.
    fn key_of(element: &Self::Element) -> &Self::Key;
    /// Borrows the value out of a stored element.
    fn value_of(element: &Self::Element) -> &Self::Value;
    /// Mutably borrows the value out of a stored element.
    fn value_of_mut(element: &mut Self::Element) -> &mut Self::Value;
    /// Borrows the key out of a not-yet-constructed element's arguments, so
    /// the engine can hash and probe before deciding whether construction is
    /// even necessary.
    fn key_of_args(args: &Self::Args) -> &Self::Key;
    /// Consumes construction arguments into a storable element. Only called
    /// once the engine has committed to inserting — a losing `emplace` never
    /// pays for this.
    fn element_from(args: Self::Args) -> Self::Element;
}

/// Marker for policies whose `Value` is safe to hand a caller as `&mut`
/// without risking invariant 1/4 of `SPEC_FULL.md` §3 (stored tag matches
/// `reduced(hash(key))`; no duplicate keys). Map-like layouts keep `Value`
/// entirely separate from `Key`, so mutating it in place can never touch the
/// key a group's tag was derived from — set-like layouts alias
/// `Value = Key` and deliberately do **not** implement this, the same reason
/// [`std::collections::HashSet`] has no `get_mut`.
///
/// [`ConcurrentTable::visit`](crate::table::ConcurrentTable::visit) and
/// [`ConcurrentTable::visit_all`](crate::table::ConcurrentTable::visit_all)
/// require this bound; a table over a set-like policy only gets the
/// shared-reference `cvisit`/`cvisit_all`.
pub trait MutablePolicy: Policy {}

/// Map-like layout: `Element = (K, V)`.
pub struct MapPolicy<K, V>(core::marker::PhantomData<(K, V)>);

impl<K: Hash + Eq + 'static, V: 'static> Policy for MapPolicy<K, V> {
    type Key = K;
    type Value = V;
    type Element = (K, V);
    type Args = (K, V);

    #[inline]
    fn key_of(element: &Self::Element) -> &Self::Key {
        &element.0
    }
    #[inline]
    fn value_of(element: &Self::Element) -> &Self::Value {
        &element.1
    }
    #[inline]
    fn value_of_mut(element: &mut Self::Element) -> &mut Self::Value {
        &mut element.1
    }
    #[inline]
    fn key_of_args(args: &Self::Args) -> &Self::Key {
        &args.0
    }
    #[inline]
    fn element_from(args: Self::Args) -> Self::Element {
        args
    }
}

impl<K: Hash + Eq + 'static, V: 'static> MutablePolicy for MapPolicy<K, V> {}

/// Set-like layout: `Element = K`, and the "value" a visitor observes is the
/// key itself (mirroring `std::collections::HashSet`'s read-only element
/// access). Deliberately does **not** implement [`MutablePolicy`] — `Value`
/// aliases `Key` here, so handing a caller `&mut Value` would let them
/// mutate a stored key out from under its tag.
pub struct SetPolicy<K>(core::marker::PhantomData<K>);

impl<K: Hash + Eq + 'static> Policy for SetPolicy<K> {
    type Key = K;
    type Value = K;
    type Element = K;
    type Args = K;

    #[inline]
    fn key_of(element: &Self::Element) -> &Self::Key {
        element
    }
    #[inline]
    fn value_of(element: &Self::Element) -> &Self::Value {
        element
    }
    #[inline]
    fn value_of_mut(element: &mut Self::Element) -> &mut Self::Value {
        element
    }
    #[inline]
    fn key_of_args(args: &Self::Args) -> &Self::Key {
        args
    }
    #[inline]
    fn element_from(args: Self::Args) -> Self::Element {
        args
    }
}
