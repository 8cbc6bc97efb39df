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

//! The concurrent table engine: probing, optimistic insert, and
//! rehash-on-full, over the group/stripe primitives built up in the sibling
//! modules. This is the ~55% of the core the spec budgets for the engine
//! (`SPEC_FULL.md` §2).

use core::cell::UnsafeCell;
use core::hash::BuildHasher;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::access::GroupAccess;
use crate::alloc::{Allocator, Global, Layout};
use crate::config::TableConfig;
use crate::error::TableError;
use crate::group::{self, Group};
use crate::hash::{hash_one, Comparable, FxBuildHasher};
use crate::policy::{MutablePolicy, Policy};
use crate::scopeguard::ScopeGuard;
use crate::spinlock::{ExclusiveGuard, SharedGuard};
use crate::stripe::{self, StripedLock};
use crate::util::{likely, unlikely};

/// Selects whether [`ConcurrentTable::lookup`] takes a group's lock in
/// shared or exclusive mode. A compile-time choice (via a GAT-carrying
/// trait), not a runtime flag — the same pattern `access::ReadMode`/
/// `WriteMode` use upstream for const-vs-mut visitor dispatch.
trait GroupLockMode {
    type Guard<'a>;
    fn acquire(access: &GroupAccess) -> Self::Guard<'_>;
}

/// Read-only access: admits concurrent readers of the same group.
struct Shared;
impl GroupLockMode for Shared {
    type Guard<'a> = SharedGuard<'a>;
    #[inline]
    fn acquire(access: &GroupAccess) -> SharedGuard<'_> {
        access.lock_shared()
    }
}

/// Mutating access: excludes every other reader/writer of the same group.
struct Exclusive;
impl GroupLockMode for Exclusive {
    type Guard<'a> = ExclusiveGuard<'a>;
    #[inline]
    fn acquire(access: &GroupAccess) -> ExclusiveGuard<'_> {
        access.lock_exclusive()
    }
}

/// The three parallel, index-aligned arrays described in `SPEC_FULL.md` §3.
///
/// `groups` and `accesses` are ordinary heap boxes (global allocator); only
/// the raw element storage goes through the pluggable [`Allocator`] — that's
/// the "ownership contract" the spec's Non-goals carve out as in-scope while
/// excluding full interprocess-allocator support (see `DESIGN.md`).
struct Arrays<P: Policy> {
    groups: Box<[Group]>,
    accesses: Box<[GroupAccess]>,
    elements: NonNull<MaybeUninit<P::Element>>,
    num_groups: usize,
}

unsafe impl<P: Policy> Send for Arrays<P> where P::Element: Send {}
unsafe impl<P: Policy> Sync for Arrays<P> where P::Element: Send + Sync {}

impl<P: Policy> Arrays<P> {
    /// The allocation-free empty table (`SPEC_FULL.md` §3: "the empty
    /// table's `group_accesses` ... incur no allocation"). A zero-length
    /// boxed slice never touches the allocator, so this holds without a
    /// separate static sentinel.
    fn empty() -> Self {
        Self {
            groups: Box::new([]),
            accesses: Box::new([]),
            elements: NonNull::dangling(),
            num_groups: 0,
        }
    }

    fn element_layout(num_groups: usize) -> Result<Layout, TableError> {
        let slots = num_groups
            .checked_mul(group::WIDTH)
            .ok_or(TableError::CapacityOverflow)?;
        Layout::array::<MaybeUninit<P::Element>>(slots).map_err(|_| TableError::CapacityOverflow)
    }

    fn alloc_new<A: Allocator>(num_groups: usize, alloc: &A) -> Result<Self, TableError> {
        debug_assert!(num_groups > 0);
        let layout = Self::element_layout(num_groups)?;
        let elements = alloc
            .allocate(layout)
            .map_err(|()| TableError::AllocationFailed { layout })?
            .cast();
        let groups = (0..num_groups).map(|_| Group::new_empty()).collect();
        let accesses = (0..num_groups).map(|_| GroupAccess::new()).collect();
        Ok(Self {
            groups,
            accesses,
            elements,
            num_groups,
        })
    }

    #[inline]
    unsafe fn slot_ptr(&self, group_pos: usize, n: usize) -> *mut MaybeUninit<P::Element> {
        self.elements.as_ptr().add(group_pos * group::WIDTH + n)
    }

    /// # Safety
    /// The slot at `(group_pos, n)` must be occupied, and the caller must
    /// hold at least a shared lock on that group.
    #[inline]
    unsafe fn element_ref(&self, group_pos: usize, n: usize) -> &P::Element {
        unsafe { (*self.slot_ptr(group_pos, n)).assume_init_ref() }
    }

    /// # Safety
    /// The slot at `(group_pos, n)` must be occupied, and the caller must
    /// hold the group's exclusive lock.
    #[inline]
    unsafe fn element_mut(&self, group_pos: usize, n: usize) -> &mut P::Element {
        unsafe { (*self.slot_ptr(group_pos, n)).assume_init_mut() }
    }

    /// # Safety
    /// The slot at `(group_pos, n)` must currently be unoccupied (tag not
    /// yet published, or already reset), and the caller must hold the
    /// group's exclusive lock.
    #[inline]
    unsafe fn write_element(&self, group_pos: usize, n: usize, element: P::Element) {
        unsafe {
            (*self.slot_ptr(group_pos, n)).write(element);
        }
    }

    /// Drops the element at `(group_pos, n)` and resets its tag to empty.
    /// Does **not** touch the overflow byte (`SPEC_FULL.md` §4.5.4).
    ///
    /// # Safety
    /// The slot must be occupied, and the caller must hold the group's
    /// exclusive lock.
    #[inline]
    unsafe fn drop_and_reset(&self, group_pos: usize, n: usize) {
        unsafe {
            (*self.slot_ptr(group_pos, n)).assume_init_drop();
        }
        self.groups[group_pos].reset(n);
    }

    /// Moves the element at `(group_pos, n)` out without dropping it, and
    /// resets its tag to empty. Used by `rehash`/`merge`, which relocate the
    /// value rather than destroy it.
    ///
    /// # Safety
    /// The slot must be occupied, and the caller must hold the group's
    /// exclusive lock (or, during `rehash`, the whole-table exclusive lock).
    #[inline]
    unsafe fn take_element(&self, group_pos: usize, n: usize) -> P::Element {
        let element = unsafe { (*self.slot_ptr(group_pos, n)).assume_init_read() };
        self.groups[group_pos].reset(n);
        element
    }
}

/// A group was found with `mask == 0` available slots to check, or probing
/// ran a full cycle without a free slot anywhere — effectively "full", even
/// though the size/`max_load` check is the primary signal for that (see
/// `SPEC_FULL.md` §4.5.3's rationale for reserving size first).
enum InsertAttempt<T> {
    Inserted,
    Existed,
    Full(T),
}

/// [`InsertAttempt`]'s counterpart for [`ConcurrentTable::try_move_insert_norehash`],
/// which places an already-constructed element rather than building one from
/// `Args` — used by `merge`, where a losing attempt must hand the whole
/// element back rather than just dropping a cheap set of constructor args.
enum MoveInsertOutcome<T> {
    Inserted,
    AlreadyExists(T),
    Full(T),
}

/// A thread-safe, closure-based, open-addressing hash table. See the crate
/// root and `SPEC_FULL.md` for the full design; this type is the "core" the
/// spec describes — [`crate::map::ConcurrentMap`] and
/// [`crate::set::ConcurrentSet`] are façades over it.
pub struct ConcurrentTable<P: Policy, S = FxBuildHasher, A: Allocator = Global> {
    stripe: StripedLock,
    arrays: UnsafeCell<Arrays<P>>,
    size: AtomicUsize,
    max_load: AtomicUsize,
    load_factor: f32,
    hash_builder: S,
    alloc: A,
}

// SAFETY: all interior mutation of `arrays` happens either (a) under a
// shared stripe, touching only per-group state serialized by that group's
// own `RwSpinlock`, or (b) under every stripe held exclusively, at which
// point no other thread can be mid-operation (every entry point takes at
// least one stripe first). `Arrays<P>`'s own Send/Sync bounds cover the raw
// pointer; `S`/`A` just need to be usable from multiple threads.
unsafe impl<P: Policy, S: Send, A: Allocator + Send> Send for ConcurrentTable<P, S, A> where
    Arrays<P>: Send
{
}
unsafe impl<P: Policy, S: Sync, A: Allocator + Sync> Sync for ConcurrentTable<P, S, A> where
    Arrays<P>: Sync
{
}

impl<P: Policy> ConcurrentTable<P, FxBuildHasher, Global> {
    /// An empty table. Allocates nothing until the first insert.
    pub fn new() -> Self {
        Self::with_config(TableConfig::default())
    }

    pub fn with_config(config: TableConfig) -> Self {
        Self::try_with_config_in(config, FxBuildHasher, Global)
            .expect("flathash: allocation failed while constructing table")
    }
}

impl<P: Policy> Default for ConcurrentTable<P, FxBuildHasher, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Policy, S: BuildHasher, A: Allocator> ConcurrentTable<P, S, A> {
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self::try_with_config_in(TableConfig::default(), hash_builder, alloc)
            .expect("flathash: allocation failed while constructing table")
    }

    pub fn try_with_config_in(
        config: TableConfig,
        hash_builder: S,
        alloc: A,
    ) -> Result<Self, TableError> {
        let num_groups = config.initial_groups();
        let arrays = if num_groups == 0 {
            Arrays::empty()
        } else {
            Arrays::alloc_new(num_groups, &alloc)?
        };
        let max_load = Self::max_load_for(num_groups, config.load_factor_value());
        Ok(Self {
            stripe: StripedLock::new(),
            arrays: UnsafeCell::new(arrays),
            size: AtomicUsize::new(0),
            max_load: AtomicUsize::new(max_load),
            load_factor: config.load_factor_value(),
            hash_builder,
            alloc,
        })
    }

    fn max_load_for(num_groups: usize, load_factor: f32) -> usize {
        let capacity = num_groups * group::WIDTH;
        ((capacity as f32) * load_factor) as usize
    }

    /// # Safety (internal)
    /// Callers must hold either a shared stripe (for read access, relying on
    /// per-group locks for anything mutable) or every stripe exclusively
    /// (for structural access, e.g. during `rehash`).
    #[inline]
    unsafe fn arrays(&self) -> &Arrays<P> {
        unsafe { &*self.arrays.get() }
    }

    // ---------------------------------------------------------------
    // lookup
    // ---------------------------------------------------------------

    /// The shared probing core behind `visit`/`cvisit`/`erase`/optimistic
    /// insert: walks the probe sequence from `pos0(hash)`, matching tags a
    /// group at a time and stopping at the first group not marked
    /// overflowed for this hash (`SPEC_FULL.md` §4.5.1).
    fn lookup<M: GroupLockMode, Q>(&self, hash: u64, key: &Q) -> Option<(usize, usize, M::Guard<'_>)>
    where
        Q: Comparable<P::Key> + ?Sized,
    {
        let arrays = unsafe { self.arrays() };
        if arrays.num_groups == 0 {
            return None;
        }
        let mask = arrays.num_groups - 1;
        let pos0 = (hash as usize) & mask;
        let mut pos = pos0;
        loop {
            let group = &arrays.groups[pos];
            let bitmask = group.match_hash(hash);
            if bitmask.any_bit_set() {
                let guard = M::acquire(&arrays.accesses[pos]);
                for n in bitmask {
                    if group.is_occupied(n) {
                        let element = unsafe { arrays.element_ref(pos, n) };
                        if key.cmp_eq(P::key_of(element)) {
                            return Some((pos, n, guard));
                        }
                    }
                }
                // no match in this group; guard drops here.
            }
            if likely(group.is_not_overflowed(hash)) {
                return None;
            }
            pos = (pos + 1) & mask;
            if unlikely(pos == pos0) {
                // every group is marked overflowed for this hash; a
                // well-formed table (size < capacity) never reaches this.
                return None;
            }
        }
    }

    /// Invokes `f` with a mutable reference to the value matching `key`,
    /// while holding that group's exclusive lock. Returns `None` if no
    /// element matches.
    ///
    /// Requires [`MutablePolicy`]: a set-like policy aliases `Value` with
    /// `Key`, and handing that out as `&mut` would let a caller mutate a
    /// stored key without going through the engine's tag/probe bookkeeping
    /// at all — use [`Self::cvisit`] instead for such a table.
    pub fn visit<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        P: MutablePolicy,
        Q: Comparable<P::Key> + ?Sized,
        F: FnOnce(&mut P::Value) -> R,
    {
        let _stripe = self.stripe.shared();
        let hash = hash_one(&self.hash_builder, key);
        self.lookup::<Exclusive, Q>(hash, key).map(|(pos, n, _guard)| {
            let arrays = unsafe { self.arrays() };
            let element = unsafe { arrays.element_mut(pos, n) };
            f(P::value_of_mut(element))
        })
    }

    /// Invokes `f` with a shared reference to the value matching `key`,
    /// while holding that group's shared lock (admits other concurrent
    /// `cvisit`s of the same group). Returns `None` if no element matches.
    pub fn cvisit<Q, F, R>(&self, key: &Q, f: F) -> Option<R>
    where
        Q: Comparable<P::Key> + ?Sized,
        F: FnOnce(&P::Value) -> R,
    {
        let _stripe = self.stripe.shared();
        let hash = hash_one(&self.hash_builder, key);
        self.lookup::<Shared, Q>(hash, key).map(|(pos, n, _guard)| {
            let arrays = unsafe { self.arrays() };
            let element = unsafe { arrays.element_ref(pos, n) };
            f(P::value_of(element))
        })
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Comparable<P::Key> + ?Sized,
    {
        self.cvisit(key, |_| ()).is_some()
    }

    pub fn count<Q>(&self, key: &Q) -> usize
    where
        Q: Comparable<P::Key> + ?Sized,
    {
        if self.contains(key) {
            1
        } else {
            0
        }
    }

    /// Visits every occupied element with a mutable reference, group by
    /// group, each under that group's exclusive lock. Returns the number of
    /// elements visited.
    ///
    /// Requires [`MutablePolicy`]; see [`Self::visit`] for why set-like
    /// policies don't get this — use [`Self::cvisit_all`] instead.
    pub fn visit_all<F>(&self, mut f: F) -> usize
    where
        P: MutablePolicy,
        F: FnMut(&P::Key, &mut P::Value),
    {
        let _stripe = self.stripe.shared();
        let arrays = unsafe { self.arrays() };
        let mut visited = 0;
        for pos in 0..arrays.num_groups {
            let group = &arrays.groups[pos];
            let _g = arrays.accesses[pos].lock_exclusive();
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    let element = unsafe { arrays.element_mut(pos, n) };
                    let key = P::key_of(element) as *const P::Key;
                    // SAFETY: `key` does not alias `value_of_mut`'s borrow;
                    // it only reads the key field, which `visit_all`'s
                    // contract never lets the caller mutate.
                    f(unsafe { &*key }, P::value_of_mut(element));
                    visited += 1;
                }
            }
        }
        visited
    }

    /// `cvisit_all`'s shared-lock counterpart.
    pub fn cvisit_all<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&P::Key, &P::Value),
    {
        let _stripe = self.stripe.shared();
        let arrays = unsafe { self.arrays() };
        let mut visited = 0;
        for pos in 0..arrays.num_groups {
            let group = &arrays.groups[pos];
            let _g = arrays.accesses[pos].lock_shared();
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    let element = unsafe { arrays.element_ref(pos, n) };
                    f(P::key_of(element), P::value_of(element));
                    visited += 1;
                }
            }
        }
        visited
    }

    // ---------------------------------------------------------------
    // insert
    // ---------------------------------------------------------------

    /// `emplace_or_visit`: inserts a new element built from `args` if no
    /// element with the same key exists; otherwise runs `visit_existing` on
    /// the existing element's value and drops `args` unused. Returns `true`
    /// iff a new element was inserted (`SPEC_FULL.md` §4.5.2).
    pub fn emplace_or_visit<F>(&self, args: P::Args, mut visit_existing: F) -> bool
    where
        F: FnMut(&mut P::Value),
    {
        let hash = hash_one(&self.hash_builder, P::key_of_args(&args));
        let mut pending = args;
        loop {
            let outcome = {
                let _stripe = self.stripe.shared();
                self.try_insert_norehash(hash, pending, &mut visit_existing)
            };
            match outcome {
                InsertAttempt::Inserted => return true,
                InsertAttempt::Existed => return false,
                InsertAttempt::Full(returned) => {
                    pending = returned;
                    self.rehash_if_full();
                }
            }
        }
    }

    /// Inserts `args` as a new element; does nothing (and drops `args`) if
    /// the key already exists. Returns `true` iff inserted.
    pub fn try_emplace(&self, args: P::Args) -> bool {
        self.emplace_or_visit(args, |_| {})
    }

    /// Alias kept for parity with the operation surface in `SPEC_FULL.md`
    /// §6 (`emplace`); identical to [`Self::try_emplace`].
    pub fn emplace(&self, args: P::Args) -> bool {
        self.try_emplace(args)
    }

    /// Alias kept for parity with the operation surface in `SPEC_FULL.md`
    /// §6 (`try_emplace_or_visit`); identical to [`Self::emplace_or_visit`].
    pub fn try_emplace_or_visit<F>(&self, args: P::Args, visit_existing: F) -> bool
    where
        F: FnMut(&mut P::Value),
    {
        self.emplace_or_visit(args, visit_existing)
    }

    /// Alias kept for parity with the operation surface in `SPEC_FULL.md`
    /// §6 (`insert_or_visit`); identical to [`Self::emplace_or_visit`].
    pub fn insert_or_visit<F>(&self, args: P::Args, visit_existing: F) -> bool
    where
        F: FnMut(&mut P::Value),
    {
        self.emplace_or_visit(args, visit_existing)
    }

    /// The optimistic insert protocol (`SPEC_FULL.md` §4.5.3), run with only
    /// a shared stripe held. Returns the outcome; on [`InsertAttempt::Full`]
    /// the caller must drop its stripe and call [`Self::rehash_if_full`]
    /// before retrying.
    fn try_insert_norehash(
        &self,
        hash: u64,
        args: P::Args,
        visit_existing: &mut dyn FnMut(&mut P::Value),
    ) -> InsertAttempt<P::Args> {
        'startover: loop {
            let arrays = unsafe { self.arrays() };
            if arrays.num_groups == 0 {
                return InsertAttempt::Full(args);
            }
            let mask = arrays.num_groups - 1;
            let pos0 = (hash as usize) & mask;
            let counter_snapshot = arrays.accesses[pos0].generation();

            // same lookup the public `visit` runs: if the key is already
            // present, hand it to the caller's visitor and we're done.
            if let Some((pos, n, _guard)) = self.lookup::<Exclusive, P::Key>(hash, P::key_of_args(&args))
            {
                let element = unsafe { arrays.element_mut(pos, n) };
                visit_existing(P::value_of_mut(element));
                return InsertAttempt::Existed;
            }

            // reserve a size slot *before* searching for space, so a full
            // table is detected without any mutating probe work. The guard
            // undoes the reservation on every exit path below unless
            // `defuse`d at the one point the insert actually commits
            // (`SPEC_FULL.md` §9's `reserve_size` guard).
            let reservation = self.size.fetch_add(1, Ordering::Relaxed) + 1;
            let size_guard = ScopeGuard::new((), |()| {
                self.size.fetch_sub(1, Ordering::Relaxed);
            });
            if reservation > self.max_load.load(Ordering::Relaxed) {
                return InsertAttempt::Full(args);
            }

            let mut pos = pos0;
            loop {
                let group = &arrays.groups[pos];
                let access = &arrays.accesses[pos];
                let guard = access.lock_exclusive();
                if let Some(n) = group.match_available().lowest_set_bit() {
                    group.set(n, hash);
                    let prev = arrays.accesses[pos0].bump_generation();
                    if prev != counter_snapshot {
                        // someone else's insert, starting at the same pos0,
                        // raced us and committed first; undo and restart.
                        group.reset(n);
                        drop(guard);
                        continue 'startover;
                    }
                    unsafe {
                        arrays.write_element(pos, n, P::element_from(args));
                    }
                    drop(guard);
                    size_guard.defuse();
                    return InsertAttempt::Inserted;
                }
                group.mark_overflow(hash);
                drop(guard);
                pos = (pos + 1) & mask;
                if pos == pos0 {
                    // probed every group without finding space; max_load
                    // should have caught this, but don't spin forever if it
                    // didn't (e.g. pathological load factor close to 1.0).
                    return InsertAttempt::Full(args);
                }
            }
        }
    }

    // ---------------------------------------------------------------
    // erase
    // ---------------------------------------------------------------

    /// Removes the element matching `key` unconditionally. Returns `true`
    /// iff an element was removed.
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        Q: Comparable<P::Key> + ?Sized,
    {
        self.erase_if(key, |_| true)
    }

    /// Removes the element matching `key` iff `pred` returns `true` for its
    /// value. The element's group exclusive lock is held for the duration
    /// of `pred` (`SPEC_FULL.md` §4.5.4).
    pub fn erase_if<Q, F>(&self, key: &Q, mut pred: F) -> bool
    where
        Q: Comparable<P::Key> + ?Sized,
        F: FnMut(&P::Value) -> bool,
    {
        let _stripe = self.stripe.shared();
        let hash = hash_one(&self.hash_builder, key);
        match self.lookup::<Exclusive, Q>(hash, key) {
            None => false,
            Some((pos, n, _guard)) => {
                let arrays = unsafe { self.arrays() };
                let element = unsafe { arrays.element_ref(pos, n) };
                if pred(P::value_of(element)) {
                    unsafe {
                        arrays.drop_and_reset(pos, n);
                    }
                    self.size.fetch_sub(1, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Bulk form: removes every element for which `pred` returns `true`.
    /// Returns the number removed.
    pub fn erase_if_all<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&P::Key, &P::Value) -> bool,
    {
        let _stripe = self.stripe.shared();
        let arrays = unsafe { self.arrays() };
        let mut removed = 0usize;
        for pos in 0..arrays.num_groups {
            let group = &arrays.groups[pos];
            let _g = arrays.accesses[pos].lock_exclusive();
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    let element = unsafe { arrays.element_ref(pos, n) };
                    if pred(P::key_of(element), P::value_of(element)) {
                        unsafe {
                            arrays.drop_and_reset(pos, n);
                        }
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            self.size.fetch_sub(removed, Ordering::Relaxed);
        }
        removed
    }

    // ---------------------------------------------------------------
    // whole-table operations
    // ---------------------------------------------------------------

    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn capacity(&self) -> usize {
        let _stripe = self.stripe.shared();
        unsafe { self.arrays() }.num_groups * group::WIDTH
    }

    pub fn max_load(&self) -> usize {
        self.max_load.load(Ordering::Relaxed)
    }

    pub fn load_factor(&self) -> f32 {
        let cap = self.capacity();
        if cap == 0 {
            0.0
        } else {
            self.size() as f32 / cap as f32
        }
    }

    /// Called after a shared-stripe insert attempt reports the table full.
    /// Takes every stripe exclusively, double-checks the condition still
    /// holds (another thread may have already rehashed), and doubles the
    /// group count (`SPEC_FULL.md` §4.5.6).
    fn rehash_if_full(&self) {
        let _all = self.stripe.exclusive_all();
        let current_groups = unsafe { self.arrays() }.num_groups;
        let size = self.size.load(Ordering::Relaxed);
        let max_load = self.max_load.load(Ordering::Relaxed);
        // a zero-group table always needs its first allocation, regardless
        // of how `size`/`max_load` (both 0) compare — otherwise the very
        // first insert into a freshly constructed table would see this as
        // "not full" and spin forever between `try_insert_norehash` and
        // here without ever growing past zero groups.
        if current_groups > 0 && size <= max_load {
            return;
        }
        let next_groups = if current_groups == 0 {
            1
        } else {
            current_groups * 2
        };
        self.rehash_into(next_groups)
            .expect("flathash: allocation failed during rehash");
    }

    /// Grows the table so it can hold at least `additional` more elements
    /// without a subsequent rehash, if it doesn't already.
    pub fn reserve(&self, additional: usize) {
        let _all = self.stripe.exclusive_all();
        let target_elements = self.size.load(Ordering::Relaxed) + additional;
        let target_groups = Self::groups_needed_for(target_elements, self.load_factor);
        if target_groups > unsafe { self.arrays() }.num_groups {
            self.rehash_into(target_groups)
                .expect("flathash: allocation failed during reserve");
        }
    }

    /// Rehashes so the table has at least `num_groups` groups (rounded up to
    /// the next power of two), even if the current load wouldn't otherwise
    /// demand it.
    pub fn rehash(&self, num_groups_hint: usize) {
        let _all = self.stripe.exclusive_all();
        let target = num_groups_hint.max(1).next_power_of_two();
        if target > unsafe { self.arrays() }.num_groups {
            self.rehash_into(target)
                .expect("flathash: allocation failed during rehash");
        }
    }

    fn groups_needed_for(elements: usize, load_factor: f32) -> usize {
        if elements == 0 {
            return 0;
        }
        let capacity_needed = ((elements as f32) / load_factor).ceil() as usize;
        capacity_needed.div_ceil(group::WIDTH).next_power_of_two()
    }

    /// Allocates a new, larger array triple, moves every live element across
    /// (recomputing its probe position from scratch), and swaps it in. Only
    /// ever called with every stripe held exclusively — nothing else can be
    /// touching `self.arrays` while this runs.
    fn rehash_into(&self, new_num_groups: usize) -> Result<(), TableError> {
        let old_num_groups = unsafe { self.arrays() }.num_groups;
        log::trace!(
            "rehash start: {} -> {} groups ({} -> {} slots)",
            old_num_groups,
            new_num_groups,
            old_num_groups * group::WIDTH,
            new_num_groups * group::WIDTH,
        );
        let new_arrays = Arrays::alloc_new(new_num_groups, &self.alloc).map_err(|e| {
            log::debug!("rehash aborted: allocation failed ({e})");
            e
        })?;
        let old_arrays = unsafe { &mut *self.arrays.get() };
        let new_mask = new_num_groups - 1;

        for pos in 0..old_arrays.num_groups {
            let group = &old_arrays.groups[pos];
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    let element = unsafe { old_arrays.take_element(pos, n) };
                    let hash = hash_one(&self.hash_builder, P::key_of(&element));
                    Self::insert_during_rehash(&new_arrays, new_mask, hash, element);
                }
            }
        }

        if old_arrays.num_groups > 0 {
            let layout = Arrays::<P>::element_layout(old_arrays.num_groups)
                .expect("previously-allocated layout must still be valid");
            unsafe {
                self.alloc.deallocate(old_arrays.elements.cast(), layout);
            }
        }

        *old_arrays = new_arrays;
        self.max_load
            .store(Self::max_load_for(new_num_groups, self.load_factor), Ordering::Relaxed);
        log::debug!(
            "rehash complete: now {} groups, {} elements",
            new_num_groups,
            self.size.load(Ordering::Relaxed),
        );
        Ok(())
    }

    /// Places `element` into freshly allocated, not-yet-visible `arrays`.
    /// No concurrent readers exist yet, so this skips the optimistic
    /// counter dance entirely and just finds the first available slot.
    fn insert_during_rehash(arrays: &Arrays<P>, mask: usize, hash: u64, element: P::Element) {
        let pos0 = (hash as usize) & mask;
        let mut pos = pos0;
        loop {
            let group = &arrays.groups[pos];
            if let Some(n) = group.match_available().lowest_set_bit() {
                group.set(n, hash);
                unsafe {
                    arrays.write_element(pos, n, element);
                }
                return;
            }
            group.mark_overflow(hash);
            pos = (pos + 1) & mask;
            debug_assert_ne!(
                pos, pos0,
                "rehash target has no room for an element that fit in a smaller table"
            );
        }
    }

    /// Destroys every element and resets all tags to empty. Idempotent:
    /// calling `clear` on an already-empty table is a no-op.
    pub fn clear(&self) {
        let _all = self.stripe.exclusive_all();
        let arrays = unsafe { self.arrays() };
        for pos in 0..arrays.num_groups {
            let group = &arrays.groups[pos];
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    unsafe {
                        arrays.drop_and_reset(pos, n);
                    }
                }
            }
            group.reset_all();
        }
        self.size.store(0, Ordering::Relaxed);
    }

    /// Moves every element of `other` that doesn't already exist in `self`
    /// into `self`, leaving `other` holding only the keys that collided.
    /// `other` is only ever taken in shared stripe mode — a per-element
    /// group-exclusive lock on `other`, plus `self`'s own ordinary insert
    /// path (shared stripe, per-group exclusive, rehash-on-full as needed),
    /// does all the work (`SPEC_FULL.md` §4.5.7). Concurrent cross-merging
    /// (`a.merge(&b)` on one thread, `b.merge(&a)` on another) can deadlock —
    /// this is caller responsibility, not a bug to fix.
    pub fn merge(&self, other: &Self) {
        let _other_stripe = other.stripe.shared();
        let other_arrays = unsafe { other.arrays() };
        for pos in 0..other_arrays.num_groups {
            let group = &other_arrays.groups[pos];
            let _g = other_arrays.accesses[pos].lock_exclusive();
            for n in 0..group::WIDTH {
                if !group.is_occupied(n) {
                    continue;
                }
                let element = unsafe { other_arrays.take_element(pos, n) };
                match self.move_insert(element) {
                    Ok(()) => {
                        other.size.fetch_sub(1, Ordering::Relaxed);
                    }
                    Err(element) => {
                        // key already existed in `self`; leave it behind in
                        // `other`, in the exact slot it came from.
                        let hash = hash_one(&other.hash_builder, P::key_of(&element));
                        group.set(n, hash);
                        unsafe {
                            other_arrays.write_element(pos, n, element);
                        }
                    }
                }
            }
        }
    }

    /// Moves an already-constructed `element` into `self`. Returns `Err`
    /// with the element handed back if a matching key already exists — the
    /// caller (`merge`) decides what to do with a collision; unlike
    /// [`Self::emplace_or_visit`] there is no args to cheaply discard, the
    /// whole element comes back.
    fn move_insert(&self, mut element: P::Element) -> Result<(), P::Element> {
        let hash = hash_one(&self.hash_builder, P::key_of(&element));
        loop {
            let outcome = {
                let _stripe = self.stripe.shared();
                self.try_move_insert_norehash(hash, element)
            };
            match outcome {
                MoveInsertOutcome::Inserted => return Ok(()),
                MoveInsertOutcome::AlreadyExists(returned) => return Err(returned),
                MoveInsertOutcome::Full(returned) => {
                    element = returned;
                    self.rehash_if_full();
                }
            }
        }
    }

    /// [`Self::try_insert_norehash`]'s counterpart for an element that's
    /// already built, run with only a shared stripe held.
    fn try_move_insert_norehash(&self, hash: u64, element: P::Element) -> MoveInsertOutcome<P::Element> {
        'startover: loop {
            let arrays = unsafe { self.arrays() };
            if arrays.num_groups == 0 {
                return MoveInsertOutcome::Full(element);
            }
            let mask = arrays.num_groups - 1;
            let pos0 = (hash as usize) & mask;
            let counter_snapshot = arrays.accesses[pos0].generation();

            if self.lookup::<Shared, P::Key>(hash, P::key_of(&element)).is_some() {
                return MoveInsertOutcome::AlreadyExists(element);
            }

            let reservation = self.size.fetch_add(1, Ordering::Relaxed) + 1;
            let size_guard = ScopeGuard::new((), |()| {
                self.size.fetch_sub(1, Ordering::Relaxed);
            });
            if reservation > self.max_load.load(Ordering::Relaxed) {
                return MoveInsertOutcome::Full(element);
            }

            let mut pos = pos0;
            loop {
                let group = &arrays.groups[pos];
                let access = &arrays.accesses[pos];
                let guard = access.lock_exclusive();
                if let Some(n) = group.match_available().lowest_set_bit() {
                    group.set(n, hash);
                    let prev = arrays.accesses[pos0].bump_generation();
                    if prev != counter_snapshot {
                        group.reset(n);
                        drop(guard);
                        continue 'startover;
                    }
                    unsafe {
                        arrays.write_element(pos, n, element);
                    }
                    drop(guard);
                    size_guard.defuse();
                    return MoveInsertOutcome::Inserted;
                }
                group.mark_overflow(hash);
                drop(guard);
                pos = (pos + 1) & mask;
                if pos == pos0 {
                    return MoveInsertOutcome::Full(element);
                }
            }
        }
    }

    /// Swaps the contents of two tables, address-ordered to avoid an AB/BA
    /// deadlock against a concurrent `swap` the other way round
    /// (`SPEC_FULL.md` §4.4, §4.5.8).
    pub fn swap(&self, other: &Self) {
        let (_ga, _gb) = stripe::lock_two(&self.stripe, &other.stripe);
        unsafe {
            core::ptr::swap(self.arrays.get(), other.arrays.get());
        }
        let self_size = self.size.swap(other.size.load(Ordering::Relaxed), Ordering::Relaxed);
        other.size.store(self_size, Ordering::Relaxed);
        let self_max = self
            .max_load
            .swap(other.max_load.load(Ordering::Relaxed), Ordering::Relaxed);
        other.max_load.store(self_max, Ordering::Relaxed);
    }
}

impl<P: Policy, S, A: Allocator> Drop for ConcurrentTable<P, S, A> {
    fn drop(&mut self) {
        let arrays = unsafe { &mut *self.arrays.get() };
        for pos in 0..arrays.num_groups {
            let group = &arrays.groups[pos];
            for n in 0..group::WIDTH {
                if group.is_occupied(n) {
                    unsafe {
                        (*arrays.slot_ptr(pos, n)).assume_init_drop();
                    }
                }
            }
        }
        if arrays.num_groups > 0 {
            if let Ok(layout) = Arrays::<P>::element_layout(arrays.num_groups) {
                unsafe {
                    self.alloc.deallocate(arrays.elements.cast(), layout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MapPolicy, SetPolicy};
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    type IntMap = ConcurrentTable<MapPolicy<i64, i64>>;
    type IntSet = ConcurrentTable<SetPolicy<i64>>;

    #[test]
    fn scenario_a_basic_insert_and_visit() {
        let t: ConcurrentTable<MapPolicy<String, String>> = ConcurrentTable::new();
        assert!(t.try_emplace(("hello".to_string(), "world".to_string())));
        let seen = t.cvisit("hello", |v| v.clone());
        assert_eq!(seen.as_deref(), Some("world"));
        assert!(t.cvisit("absent", |_: &String| ()).is_none());
    }

    #[test]
    fn scenario_b_duplicate_insert() {
        let t = IntSet::new();
        assert!(t.try_emplace(1));
        assert!(!t.try_emplace(1));
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn scenario_c_concurrent_duplicate_race() {
        let t = Arc::new(IntMap::new());
        let successes = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for i in 0..16 {
            let t = Arc::clone(&t);
            let successes = Arc::clone(&successes);
            handles.push(thread::spawn(move || {
                let inserted = t.emplace_or_visit((7, i), |existing| {
                    assert!(*existing < 16);
                });
                if inserted {
                    successes.fetch_add(1, Ordering::Relaxed);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(successes.load(Ordering::Relaxed), 1);
        assert_eq!(t.size(), 1);
    }

    #[test]
    fn scenario_d_rehash_under_load() {
        let t = Arc::new(IntSet::new());
        let mut handles = Vec::new();
        for chunk in 0..8 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                for i in 0..1250 {
                    t.try_emplace(chunk * 1250 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.size(), 10_000);
        for i in 0..10_000i64 {
            assert!(t.contains(&i), "missing key {i}");
        }
        assert!(t.capacity() > group::WIDTH);
    }

    #[test]
    fn scenario_e_interleaved_erase_and_visit() {
        let t = Arc::new(IntMap::new());
        let emplaces = Arc::new(AtomicUsize::new(0));
        let erases = Arc::new(AtomicUsize::new(0));

        let t1 = Arc::clone(&t);
        let emplaces1 = Arc::clone(&emplaces);
        let writer = thread::spawn(move || {
            for round in 0..50 {
                for k in 0..100i64 {
                    if t1.try_emplace((k, round)) {
                        emplaces1.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        let t2 = Arc::clone(&t);
        let erases2 = Arc::clone(&erases);
        let eraser = thread::spawn(move || {
            for _ in 0..50 {
                for k in 0..100i64 {
                    if t2.erase(&k) {
                        erases2.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });
        writer.join().unwrap();
        eraser.join().unwrap();
        assert_eq!(
            t.size(),
            emplaces.load(Ordering::Relaxed) - erases.load(Ordering::Relaxed)
        );
    }

    #[test]
    fn idempotent_clear() {
        let t = IntSet::new();
        for i in 0..200 {
            t.try_emplace(i);
        }
        t.clear();
        assert_eq!(t.size(), 0);
        t.clear();
        assert_eq!(t.size(), 0);
        assert!(!t.contains(&0));
    }

    #[test]
    fn erase_symmetry() {
        let t = IntSet::new();
        for i in 0..500 {
            t.try_emplace(i);
        }
        let size_before = t.size();
        assert!(t.try_emplace(999));
        assert!(t.erase(&999));
        assert_eq!(t.size(), size_before);
        assert!(t.contains(&0));
        assert!(t.contains(&499));
    }

    #[test]
    fn merge_moves_unique_keys_and_keeps_collisions_in_source() {
        let a = IntSet::new();
        let b = IntSet::new();
        for i in 0..50 {
            a.try_emplace(i);
        }
        for i in 25..75 {
            b.try_emplace(i);
        }
        a.merge(&b);
        for i in 0..75 {
            assert!(a.contains(&i));
        }
        // collisions (25..50) were left behind in b, uniques moved out.
        for i in 25..50 {
            assert!(b.contains(&i));
        }
        for i in 50..75 {
            assert!(!b.contains(&i));
        }
    }

    #[test]
    fn swap_exchanges_contents() {
        let a = IntSet::new();
        let b = IntSet::new();
        a.try_emplace(1);
        b.try_emplace(2);
        b.try_emplace(3);
        a.swap(&b);
        assert!(a.contains(&2) && a.contains(&3));
        assert!(b.contains(&1));
        assert_eq!(a.size(), 2);
        assert_eq!(b.size(), 1);
    }

    #[test]
    fn no_duplicates_property() {
        let t = IntSet::new();
        let universe: Vec<i64> = (0..64).collect();
        for &k in &universe {
            t.try_emplace(k);
            t.try_emplace(k);
        }
        let mut seen = HashSet::new();
        t.cvisit_all(|k, _| {
            assert!(seen.insert(*k), "duplicate key {k} observed in table");
        });
        assert_eq!(seen.len(), universe.len());
    }

    /// Hammers a small keyspace from several threads doing random
    /// insert/remove/lookup, then checks the table's own view is
    /// self-consistent (no duplicate keys, `size()` matches a manual count).
    #[test]
    fn randomized_concurrent_stress() {
        use rand::Rng;

        let t = Arc::new(IntSet::new());
        let mut handles = Vec::new();
        for _ in 0..6 {
            let t = Arc::clone(&t);
            handles.push(thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..4000 {
                    let key: i64 = rng.gen_range(0..256);
                    match rng.gen_range(0..3) {
                        0 => {
                            t.try_emplace(key);
                        }
                        1 => {
                            t.erase(&key);
                        }
                        _ => {
                            t.contains(&key);
                        }
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = HashSet::new();
        let counted = t.cvisit_all(|k, _| {
            assert!(seen.insert(*k), "duplicate key {k} survived concurrent stress");
        });
        assert_eq!(counted, t.size());
        for k in &seen {
            assert!(t.contains(k));
        }
    }
}
