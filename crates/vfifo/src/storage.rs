//! Slot Storage
//!
//! A ring either owns its slots or borrows them from the caller, e.g. a
//! static array placed in DMA-reachable SRAM. Either way the slots are seen
//! through `UnsafeCell` so the producer and consumer can write and read
//! disjoint slots through a shared reference.

use std::cell::UnsafeCell;

/// Where a ring's slots come from, chosen at construction
pub enum Backing<'s, T> {
    /// No storage attached; the ring has zero capacity and rejects everything.
    Detached,
    /// Caller-owned slots. The ring uses the first `slots` elements.
    Borrowed(&'s mut [T]),
    /// The ring allocates its own slots.
    Allocate,
}

pub(crate) enum Slots<'s, T> {
    Owned(Box<[UnsafeCell<T>]>),
    Borrowed(&'s [UnsafeCell<T>]),
    Detached,
}

impl<'s, T: Copy> Slots<'s, T> {
    pub(crate) fn allocate(len: usize) -> Self
    where
        T: Default,
    {
        let slots: Vec<UnsafeCell<T>> = (0..len).map(|_| UnsafeCell::new(T::default())).collect();
        Slots::Owned(slots.into_boxed_slice())
    }

    pub(crate) fn borrow(storage: &'s mut [T]) -> Self {
        let len = storage.len();
        let base = storage.as_mut_ptr().cast::<UnsafeCell<T>>();
        // SAFETY: UnsafeCell<T> is repr(transparent) over T, so the slice
        // layout is unchanged. The unique borrow is held for 's, so nothing
        // else can observe the slots while the ring uses them.
        let cells = unsafe { std::slice::from_raw_parts(base, len) };
        Slots::Borrowed(cells)
    }

    pub(crate) fn len(&self) -> usize {
        self.cells().len()
    }

    pub(crate) fn cells(&self) -> &[UnsafeCell<T>] {
        match self {
            Slots::Owned(cells) => cells,
            Slots::Borrowed(cells) => cells,
            Slots::Detached => &[],
        }
    }

    pub(crate) fn is_owned(&self) -> bool {
        matches!(self, Slots::Owned(_))
    }
}
