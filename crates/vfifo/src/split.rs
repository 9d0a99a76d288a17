//! Producer / Consumer Halves
//!
//! [`RingBuffer::split`] hands out the two roles exactly once. Neither half
//! is `Clone`, and the mutating calls take `&mut self`, so a second producer
//! or consumer cannot be created for the same ring. The halves can live in
//! different execution contexts (an interrupt handler and a task).

use crate::error::ReuniteError;
use crate::ring::{fill_from, Occupancy, RingBuffer};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Writing half of a split ring buffer
pub struct Producer<'s, T: Copy> {
    ring: Arc<RingBuffer<'s, T>>,
}

/// Reading half of a split ring buffer
pub struct Consumer<'s, T: Copy> {
    ring: Arc<RingBuffer<'s, T>>,
}

impl<'s, T: Copy> RingBuffer<'s, T> {
    /// Split into producer and consumer halves.
    ///
    /// Use [`reunite`] to get the ring back, e.g. to reset it once both
    /// sides are quiet.
    pub fn split(self) -> (Producer<'s, T>, Consumer<'s, T>) {
        debug!("Splitting ring buffer ({} usable slots)", self.capacity());
        let ring = Arc::new(self);
        (
            Producer { ring: Arc::clone(&ring) },
            Consumer { ring },
        )
    }
}

/// Join the two halves of one ring back into the ring.
pub fn reunite<'s, T: Copy>(
    producer: Producer<'s, T>,
    consumer: Consumer<'s, T>,
) -> Result<RingBuffer<'s, T>, ReuniteError<'s, T>> {
    if !Arc::ptr_eq(&producer.ring, &consumer.ring) {
        return Err(ReuniteError { producer, consumer });
    }

    drop(consumer);
    match Arc::try_unwrap(producer.ring) {
        Ok(ring) => {
            debug!("Reunited ring buffer ({} usable slots)", ring.capacity());
            Ok(ring)
        }
        // Only the two halves ever hold the Arc, and both were passed in.
        Err(_) => unreachable!("ring buffer halves are the only owners"),
    }
}

impl<'s, T: Copy> Producer<'s, T> {
    /// Put one element. Returns `false` if the ring is full or has no storage.
    #[inline]
    pub fn try_put(&mut self, item: T) -> bool {
        // SAFETY: this is the ring's only producer and `&mut self` prevents
        // re-entrant use of it.
        unsafe { self.ring.push(item) }
    }

    /// Put as many of `items` as fit, in order. Returns how many were written.
    ///
    /// Not meant for interrupt context; use [`Producer::try_put`] there.
    pub fn put_block(&mut self, items: &[T]) -> usize {
        items.iter().take_while(|&&item| self.try_put(item)).count()
    }

    /// Number of filled slots (snapshot, may be stale)
    pub fn used_slots(&self) -> usize {
        self.ring.used_slots()
    }

    /// Number of free slots (snapshot, may be stale)
    pub fn free_slots(&self) -> usize {
        self.ring.free_slots()
    }

    /// Usable capacity
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Check if the ring is full
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Snapshot of used, free and capacity
    pub fn occupancy(&self) -> Occupancy {
        self.ring.occupancy()
    }
}

impl<'s, T: Copy> Consumer<'s, T> {
    /// Get the oldest element, or `None` if the ring is empty.
    #[inline]
    pub fn try_get(&mut self) -> Option<T> {
        // SAFETY: this is the ring's only consumer and `&mut self` prevents
        // re-entrant use of it.
        unsafe { self.ring.pop() }
    }

    /// Look at the oldest element without removing it.
    #[inline]
    pub fn peek(&mut self) -> Option<T> {
        // SAFETY: as in `try_get`.
        unsafe { self.ring.peek() }
    }

    /// Fill `out` from the front of the ring. Returns how many were read.
    ///
    /// Not meant for interrupt context; use [`Consumer::try_get`] there.
    pub fn get_block(&mut self, out: &mut [T]) -> usize {
        fill_from(out, || self.try_get())
    }

    /// Number of filled slots (snapshot, may be stale)
    pub fn used_slots(&self) -> usize {
        self.ring.used_slots()
    }

    /// Number of free slots (snapshot, may be stale)
    pub fn free_slots(&self) -> usize {
        self.ring.free_slots()
    }

    /// Usable capacity
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Check if the ring is full
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Snapshot of used, free and capacity
    pub fn occupancy(&self) -> Occupancy {
        self.ring.occupancy()
    }
}

impl<T: Copy> fmt::Debug for Producer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("ring", &self.ring).finish()
    }
}

impl<T: Copy> fmt::Debug for Consumer<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("ring", &self.ring).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_split_halves_share_one_ring() {
        let (mut tx, mut rx) = RingBuffer::<u8>::new(4).split();

        assert_eq!(tx.put_block(b"hello"), 4);
        assert!(tx.is_full());
        assert_eq!(rx.used_slots(), 4);
        assert_eq!(rx.peek(), Some(b'h'));

        let mut out = [0u8; 8];
        assert_eq!(rx.get_block(&mut out), 4);
        assert_eq!(&out[..4], b"hell");
        assert!(tx.is_empty());
        assert_eq!(tx.free_slots(), 4);
        assert_eq!(rx.peek(), None);
    }

    #[test]
    fn test_reunite_then_reset() {
        let (mut tx, rx) = RingBuffer::<u32>::new(8).split();
        tx.put_block(&[1, 2, 3]);

        let mut ring = reunite(tx, rx).unwrap();
        assert_eq!(ring.used_slots(), 3);
        ring.reset();

        let (_tx, mut rx) = ring.split();
        assert_eq!(rx.try_get(), None);
        assert_eq!(rx.free_slots(), 8);
    }

    #[test]
    fn test_reunite_rejects_foreign_halves() {
        let (tx_a, rx_a) = RingBuffer::<u8>::new(2).split();
        let (tx_b, rx_b) = RingBuffer::<u8>::new(3).split();

        let err = reunite(tx_a, rx_b).unwrap_err();
        assert_eq!(err.producer.capacity(), 2);
        assert_eq!(err.consumer.capacity(), 3);

        // The halves come back intact and still pair with their partners.
        assert!(reunite(err.producer, rx_a).is_ok());
        assert!(reunite(tx_b, err.consumer).is_ok());
    }

    #[test]
    fn test_threads_preserve_fifo_order() {
        const COUNT: u32 = 100_000;
        let (mut tx, mut rx) = RingBuffer::<u32>::new(64).split();

        let producer = thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if tx.try_put(next) {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
            tx
        });

        let consumer = thread::spawn(move || {
            let mut expected = 0;
            let mut batch = [0u32; 16];
            while expected < COUNT {
                let n = rx.get_block(&mut batch);
                for &v in &batch[..n] {
                    assert_eq!(v, expected);
                    expected += 1;
                }
                if n == 0 {
                    thread::yield_now();
                }
            }
            rx
        });

        let tx = producer.join().unwrap();
        let rx = consumer.join().unwrap();
        let ring = reunite(tx, rx).unwrap();
        assert!(ring.is_empty());
        assert_eq!(ring.used_slots() + ring.free_slots(), ring.capacity());
    }

    #[test]
    fn test_borrowed_storage_split_in_scoped_threads() {
        let mut storage = [0u16; 9];
        let (mut tx, mut rx) = RingBuffer::with_storage(&mut storage).split();

        thread::scope(|s| {
            s.spawn(move || {
                for word in 0..1000u16 {
                    while !tx.try_put(word) {
                        thread::yield_now();
                    }
                }
            });
            s.spawn(move || {
                let mut expected = 0u16;
                while expected < 1000 {
                    match rx.try_get() {
                        Some(word) => {
                            assert_eq!(word, expected);
                            expected += 1;
                        }
                        None => thread::yield_now(),
                    }
                }
            });
        });
    }
}
