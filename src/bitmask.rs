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

//! A bitmask over a group's 15 slots, as produced by [`crate::group::Group`]'s
//! match primitives. Bit `n` set means slot `n` satisfied the query.

/// Only the low 15 bits are ever meaningful; bit 15 would correspond to the
/// group's overflow byte and is always masked out before a [`Bitmask`] is
/// handed back to a caller.
pub const SLOT_BITS: u16 = 0x7fff;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bitmask(pub u16);

impl Bitmask {
    pub const EMPTY: Bitmask = Bitmask(0);

    /// Returns the lowest set bit's index, if any.
    #[inline]
    pub fn lowest_set_bit(self) -> Option<usize> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as usize)
        }
    }

    /// Returns the mask with the lowest set bit cleared.
    #[inline]
    pub fn remove_lowest_bit(self) -> Self {
        Bitmask(self.0 & (self.0 - 1))
    }

    #[inline]
    pub fn any_bit_set(self) -> bool {
        self.0 != 0
    }
}

/// An iterator over the set bit positions of a [`Bitmask`], lowest first —
/// this is the order the lookup algorithm (`4.5.1`) requires when scanning a
/// group's match mask.
pub struct BitmaskIterator(Bitmask);

impl Iterator for BitmaskIterator {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        let bit = self.0.lowest_set_bit()?;
        self.0 = self.0.remove_lowest_bit();
        Some(bit)
    }
}

impl IntoIterator for Bitmask {
    type IntoIter = BitmaskIterator;
    type Item = usize;
    fn into_iter(self) -> Self::IntoIter {
        BitmaskIterator(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_low_to_high() {
        let mask = Bitmask(0b0010_1001);
        let bits: Vec<usize> = mask.into_iter().collect();
        assert_eq!(bits, vec![0, 3, 5]);
    }

    #[test]
    fn empty_has_no_bits() {
        assert_eq!(Bitmask::EMPTY.lowest_set_bit(), None);
        assert!(Bitmask::EMPTY.into_iter().next().is_none());
    }
}
