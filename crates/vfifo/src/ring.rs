//! Lock-Free Ring Buffer Implementation
//!
//! One slot of the storage is always left empty so that "full" and "empty"
//! can be told apart from the head and tail indices alone:
//!
//! - empty: `head == tail`
//! - full:  `(head + 1) % slots == tail`
//!
//! The producer is the only writer of `head` and the consumer the only writer
//! of `tail`. The `used`/`free` counters are touched by both sides and are
//! kept for O(1) reporting only; the full/empty decisions never read them.

use crate::error::FifoError;
use crate::storage::{Backing, Slots};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Point-in-time view of a ring's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Slots holding data
    pub used: usize,
    /// Slots available for writing
    pub free: usize,
    /// Usable capacity (allocated slots minus the reserved one)
    pub capacity: usize,
}

impl Occupancy {
    /// Get fill ratio (0.0 to 1.0); a zero-capacity ring reports 0.0
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.used as f64 / self.capacity as f64
    }
}

/// Lock-free SPSC ring buffer of `Copy` elements
pub struct RingBuffer<'s, T: Copy> {
    /// Slot storage, owned or borrowed
    slots: Slots<'s, T>,
    /// Allocated slot count, including the reserved slot
    size: usize,
    /// Next slot to write (producer-owned)
    head: AtomicUsize,
    /// Next slot to read (consumer-owned)
    tail: AtomicUsize,
    /// Cached number of filled slots
    used: AtomicUsize,
    /// Cached number of free slots
    free: AtomicUsize,
}

impl<T: Copy + Default> RingBuffer<'static, T> {
    /// Create a self-allocating ring with `usable` usable slots.
    ///
    /// One extra slot is allocated so that the usable capacity equals the
    /// request.
    ///
    /// # Panics
    ///
    /// Panics if `usable` is `usize::MAX`; see [`RingBuffer::try_new`].
    pub fn new(usable: usize) -> Self {
        match Self::try_new(usable) {
            Ok(ring) => ring,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`RingBuffer::new`], but reports a capacity that cannot be
    /// allocated instead of panicking.
    pub fn try_new(usable: usize) -> Result<Self, FifoError> {
        let slots = usable
            .checked_add(1)
            .ok_or(FifoError::CapacityOverflow { requested: usable })?;
        Ok(Self::from_slots(Slots::allocate(slots)))
    }
}

impl<'s, T: Copy> RingBuffer<'s, T> {
    /// Create a ring over caller-owned storage.
    ///
    /// Every element of `storage` becomes a slot, so the usable capacity is
    /// `storage.len() - 1`. Empty storage yields a zero-capacity ring.
    pub fn with_storage(storage: &'s mut [T]) -> Self {
        Self::from_slots(Slots::borrow(storage))
    }

    /// Create a ring with no storage. Every put and get fails.
    pub fn detached() -> Self {
        Self::from_slots(Slots::Detached)
    }

    /// Initialise a ring with `slots` allocated slots from `backing`.
    ///
    /// `Backing::Detached` ignores `slots` and yields a zero-capacity ring.
    /// Borrowed storage longer than `slots` is truncated; shorter storage is
    /// rejected.
    pub fn init(slots: usize, backing: Backing<'s, T>) -> Result<Self, FifoError>
    where
        T: Default,
    {
        let slots = match backing {
            Backing::Detached => Slots::Detached,
            Backing::Allocate => Slots::allocate(slots),
            Backing::Borrowed(storage) => {
                if storage.len() < slots {
                    return Err(FifoError::StorageTooShort {
                        requested: slots,
                        available: storage.len(),
                    });
                }
                Slots::borrow(&mut storage[..slots])
            }
        };
        Ok(Self::from_slots(slots))
    }

    fn from_slots(slots: Slots<'s, T>) -> Self {
        let size = slots.len();
        let usable = size.saturating_sub(1);

        if usable == 0 {
            warn!("Ring buffer created with {} slots; it will reject every put", size);
        } else {
            debug!(
                "Ring buffer created: {} usable slots ({})",
                usable,
                if slots.is_owned() { "self-allocated" } else { "borrowed" }
            );
        }

        Self {
            slots,
            size,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
            free: AtomicUsize::new(usable),
        }
    }

    #[inline]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.size { 0 } else { next }
    }

    /// Producer step.
    ///
    /// # Safety
    ///
    /// At most one context may be inside `push` at any time.
    #[inline]
    pub(crate) unsafe fn push(&self, item: T) -> bool {
        let cells = self.slots.cells();
        if cells.is_empty() {
            return false;
        }

        let head = self.head.load(Ordering::Relaxed);
        let next = self.advance(head);
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }

        // SAFETY: `head` is in bounds and is not readable by the consumer
        // until the new head is published below. The single-producer
        // contract rules out a concurrent write to the same slot.
        unsafe {
            *cells[head].get() = item;
        }

        // Counters move before the index is published so the consumer can
        // never decrement `used` below zero.
        self.used.fetch_add(1, Ordering::Relaxed);
        self.free.fetch_sub(1, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    /// Consumer step.
    ///
    /// # Safety
    ///
    /// At most one context may be inside `pop` or `peek` at any time.
    #[inline]
    pub(crate) unsafe fn pop(&self) -> Option<T> {
        let cells = self.slots.cells();
        if cells.is_empty() {
            return None;
        }

        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: the Acquire load of `head` makes the producer's write to
        // this slot visible, and the producer will not reuse it until the
        // new tail is published below.
        let item = unsafe { *cells[tail].get() };

        self.used.fetch_sub(1, Ordering::Relaxed);
        self.free.fetch_add(1, Ordering::Relaxed);
        self.tail.store(self.advance(tail), Ordering::Release);
        Some(item)
    }

    /// Consumer-side read of the oldest element without removing it.
    ///
    /// # Safety
    ///
    /// Same contract as [`RingBuffer::pop`].
    #[inline]
    pub(crate) unsafe fn peek(&self) -> Option<T> {
        let cells = self.slots.cells();
        if cells.is_empty() {
            return None;
        }

        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }

        // SAFETY: as in `pop`; the slot stays owned by the consumer.
        Some(unsafe { *cells[tail].get() })
    }

    /// Put one element. Returns `false` if the ring is full or has no storage.
    pub fn try_put(&mut self, item: T) -> bool {
        // SAFETY: `&mut self` excludes every other producer and consumer.
        unsafe { self.push(item) }
    }

    /// Get the oldest element, or `None` if the ring is empty.
    pub fn try_get(&mut self) -> Option<T> {
        // SAFETY: `&mut self` excludes every other producer and consumer.
        unsafe { self.pop() }
    }

    /// Put as many of `items` as fit, in order. Returns how many were written.
    pub fn put_block(&mut self, items: &[T]) -> usize {
        items.iter().take_while(|&&item| self.try_put(item)).count()
    }

    /// Fill `out` from the front of the ring. Returns how many were read.
    pub fn get_block(&mut self, out: &mut [T]) -> usize {
        fill_from(out, || self.try_get())
    }

    /// Empty the ring. Capacity is unchanged.
    pub fn reset(&mut self) {
        *self.head.get_mut() = 0;
        *self.tail.get_mut() = 0;
        *self.used.get_mut() = 0;
        *self.free.get_mut() = self.capacity();
        debug!("Ring buffer reset ({} usable slots)", self.capacity());
    }

    /// Number of filled slots (snapshot)
    pub fn used_slots(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Number of free slots (snapshot)
    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Relaxed)
    }

    /// Usable capacity: allocated slots minus the reserved one
    pub fn capacity(&self) -> usize {
        self.size.saturating_sub(1)
    }

    /// Allocated slot count, including the reserved slot
    pub fn allocated_slots(&self) -> usize {
        self.size
    }

    /// Whether any storage is attached
    pub fn is_configured(&self) -> bool {
        self.size > 0
    }

    /// Whether the ring owns its storage
    pub fn is_self_allocated(&self) -> bool {
        self.slots.is_owned()
    }

    /// Check if the ring is full. A zero-capacity ring is always full.
    pub fn is_full(&self) -> bool {
        if self.size == 0 {
            return true;
        }
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        self.advance(head) == tail
    }

    /// Check if the ring is empty. A zero-capacity ring is always empty.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Snapshot of used, free and capacity
    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            used: self.used_slots(),
            free: self.free_slots(),
            capacity: self.capacity(),
        }
    }
}

/// Shared loop behind every `get_block`: stops at the first `None`.
pub(crate) fn fill_from<T>(out: &mut [T], mut next: impl FnMut() -> Option<T>) -> usize {
    let mut count = 0;
    for slot in out.iter_mut() {
        match next() {
            Some(item) => *slot = item,
            None => break,
        }
        count += 1;
    }
    count
}

impl<T: Copy> Default for RingBuffer<'_, T> {
    fn default() -> Self {
        Self::detached()
    }
}

impl<T: Copy> fmt::Debug for RingBuffer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("slots", &self.size)
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .field("used", &self.used_slots())
            .field("free", &self.free_slots())
            .finish()
    }
}

// SAFETY: slots are only written by the single producer and only read by the
// single consumer, and a slot changes hands through the Release/Acquire pair
// on `head` (producer to consumer) or `tail` (consumer to producer). The
// public API only reaches `push`/`pop` through `&mut self` or through the
// unique `Producer`/`Consumer` halves.
unsafe impl<T: Copy + Send> Send for RingBuffer<'_, T> {}
unsafe impl<T: Copy + Send> Sync for RingBuffer<'_, T> {}
