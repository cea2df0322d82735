// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE-APACHE file or at:
//     https://www.apache.org/licenses/LICENSE-2.0

//! Two-level sparse index over codepoints

use crate::conv::{to_u32, to_usize};
use crate::error::MemoryError;

/// Number of slots per page
const PAGE_LEN: usize = 0x100;

/// A sparse map from codepoint to `T`
///
/// Codepoint `c` is stored in page `c >> 8` at slot `c & 0xFF`. Pages are
/// allocated on first write; unwritten slots hold `T::default()`.
#[derive(Clone, Debug)]
pub(crate) struct Pages<T> {
    pages: Vec<Option<Box<[T]>>>,
}

impl<T> Default for Pages<T> {
    fn default() -> Self {
        Pages { pages: Vec::new() }
    }
}

#[inline]
fn split(c: u32) -> (usize, usize) {
    (to_usize(c >> 8), to_usize(c & 0xFF))
}

impl<T: Default> Pages<T> {
    /// Get the slot for `c`, if its page exists
    pub fn get(&self, c: u32) -> Option<&T> {
        let (page, slot) = split(c);
        self.pages.get(page)?.as_ref().map(|p| &p[slot])
    }

    /// Get the slot for `c`, allocating its page as required
    pub fn slot_mut(&mut self, c: u32) -> Result<&mut T, MemoryError> {
        let (page, slot) = split(c);
        if self.pages.len() <= page {
            self.pages.try_reserve(page + 1 - self.pages.len())?;
            self.pages.resize_with(page + 1, || None);
        }

        let entry = &mut self.pages[page];
        let p = match entry.take() {
            Some(p) => p,
            None => {
                let mut v = Vec::new();
                v.try_reserve_exact(PAGE_LEN)?;
                v.resize_with(PAGE_LEN, T::default);
                v.into_boxed_slice()
            }
        };
        Ok(&mut entry.insert(p)[slot])
    }

    /// Iterate over all slots of allocated pages
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.pages.iter().enumerate().flat_map(|(page, p)| {
            p.iter().flat_map(move |p| {
                p.iter()
                    .enumerate()
                    .map(move |(slot, v)| (to_u32(page << 8 | slot), v))
            })
        })
    }

    /// Iterate mutably over all slots of allocated pages
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.pages.iter_mut().enumerate().flat_map(|(page, p)| {
            p.iter_mut().flat_map(move |p| {
                p.iter_mut()
                    .enumerate()
                    .map(move |(slot, v)| (to_u32(page << 8 | slot), v))
            })
        })
    }

    /// Drop all pages
    pub fn clear(&mut self) {
        self.pages.clear();
    }
}
