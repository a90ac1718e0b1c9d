// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Lock-free single-producer/single-consumer ring buffer.
//!
//! The audio thread owns the [`Producer`] and the observer owns the
//! [`Consumer`]. Neither half can be cloned, so there is exactly one of each.
//! A full queue drops the new item and bumps a counter; the producer never
//! blocks, allocates or retries.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Storage shared by both halves.
struct Ring<T> {
    /// Backing slots. `None` means the slot has been consumed.
    slots: Box<[UnsafeCell<Option<T>>]>,
    /// Capacity - 1 (capacity is a power of 2)
    mask: usize,
    /// Next slot the consumer reads.
    read_pos: AtomicUsize,
    /// Next slot the producer writes.
    write_pos: AtomicUsize,
    /// Items rejected because the ring was full.
    dropped: AtomicU64,
}

// Slot access is partitioned by the read/write indices: the producer only
// touches slots in [write, read) and the consumer only [read, write).
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    #[inline]
    fn len(&self) -> usize {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read) & self.mask
    }
}

/// Writing half. Lives on the real-time thread.
pub struct Producer<T> {
    ring: Arc<Ring<T>>,
}

/// Reading half. Lives on the polling thread.
pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
}

/// Creates a queue with at least `capacity` slots. The capacity is rounded up
/// to the next power of two; one slot is always kept free to tell a full ring
/// from an empty one.
///
/// # Panics
///
/// Panics if `capacity` is less than 2.
pub fn channel<T: Send>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    assert!(capacity >= 2, "queue capacity must be at least 2");

    let capacity = capacity.next_power_of_two();
    let slots: Vec<UnsafeCell<Option<T>>> = (0..capacity).map(|_| UnsafeCell::new(None)).collect();
    let ring = Arc::new(Ring {
        slots: slots.into_boxed_slice(),
        mask: capacity - 1,
        read_pos: AtomicUsize::new(0),
        write_pos: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });

    (
        Producer { ring: ring.clone() },
        Consumer { ring },
    )
}

impl<T: Send> Producer<T> {
    /// Pushes an item. Returns false, and counts a drop, if the ring is full.
    #[inline]
    pub fn enqueue(&mut self, item: T) -> bool {
        let ring = &*self.ring;
        // Only this half stores write_pos.
        let write = ring.write_pos.load(Ordering::Relaxed);
        let next = (write + 1) & ring.mask;
        if next == ring.read_pos.load(Ordering::Acquire) {
            ring.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        unsafe {
            *ring.slots[write].get() = Some(item);
        }
        ring.write_pos.store(next, Ordering::Release);
        true
    }

    /// Number of items dropped because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    /// Number of slots, including the one kept free.
    pub fn capacity(&self) -> usize {
        self.ring.mask + 1
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send> Consumer<T> {
    /// Pops the oldest item, if any.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let read = ring.read_pos.load(Ordering::Relaxed);
        if read == ring.write_pos.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { (*ring.slots[read].get()).take() };
        ring.read_pos.store((read + 1) & ring.mask, Ordering::Release);
        item
    }

    /// Moves everything currently published into `out`, oldest first.
    /// Returns the number of items moved.
    pub fn drain_into(&mut self, out: &mut Vec<T>) -> usize {
        let ring = &*self.ring;
        let mut read = ring.read_pos.load(Ordering::Relaxed);
        let write = ring.write_pos.load(Ordering::Acquire);

        let mut count = 0;
        while read != write {
            // Take clears the slot so a stale value can never be read twice.
            if let Some(item) = unsafe { (*ring.slots[read].get()).take() } {
                out.push(item);
                count += 1;
            }
            read = (read + 1) & ring.mask;
        }

        ring.read_pos.store(read, Ordering::Release);
        count
    }

    /// Drains everything currently published.
    pub fn drain_all(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        self.drain_into(&mut out);
        out
    }

    /// Number of items dropped by the producer because the ring was full.
    pub fn dropped(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    /// Number of slots, including the one kept free.
    pub fn capacity(&self) -> usize {
        self.ring.mask + 1
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_capacity_rounds_up() {
        let (producer, consumer) = channel::<u32>(1000);
        assert_eq!(producer.capacity(), 1024);
        assert_eq!(consumer.capacity(), 1024);
        assert!(producer.is_empty());
    }

    #[test]
    fn test_fill_to_capacity_minus_one() {
        let (mut producer, mut consumer) = channel::<usize>(16);
        for i in 0..15 {
            assert!(producer.enqueue(i), "item {} should fit", i);
        }
        assert_eq!(producer.len(), 15);
        assert_eq!(producer.dropped(), 0);

        let drained = consumer.drain_all();
        assert_eq!(drained, (0..15).collect::<Vec<_>>());
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_overflow_drops_and_counts() {
        let (mut producer, mut consumer) = channel::<usize>(16);
        for i in 0..15 {
            assert!(producer.enqueue(i));
        }

        let start = Instant::now();
        assert!(!producer.enqueue(15));
        assert!(!producer.enqueue(16));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(producer.dropped(), 2);
        assert_eq!(consumer.dropped(), 2);

        // The dropped items never show up.
        let drained = consumer.drain_all();
        assert_eq!(drained.len(), 15);
        assert_eq!(drained.last(), Some(&14));

        // Space is available again after draining.
        assert!(producer.enqueue(42));
        assert_eq!(consumer.pop(), Some(42));
        assert_eq!(consumer.pop(), None);
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let (mut producer, mut consumer) = channel::<u32>(8);
        let mut out = Vec::new();
        let mut expected = Vec::new();
        for round in 0..10u32 {
            for i in 0..5 {
                let value = round * 10 + i;
                assert!(producer.enqueue(value));
                expected.push(value);
            }
            consumer.drain_into(&mut out);
        }
        assert_eq!(out, expected);
    }

    #[test]
    fn test_drain_clears_slots() {
        let (mut producer, mut consumer) = channel::<u32>(4);
        producer.enqueue(1);
        producer.enqueue(2);
        consumer.drain_all();
        for slot in consumer.ring.slots.iter() {
            assert!(unsafe { (*slot.get()).is_none() });
        }
    }

    #[test]
    fn test_cross_thread_fifo() {
        const COUNT: u64 = 100_000;
        let (mut producer, mut consumer) = channel::<u64>(64);

        let writer = thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if producer.enqueue(next) {
                    next += 1;
                } else {
                    thread::yield_now();
                }
            }
            producer
        });

        let mut received = Vec::with_capacity(COUNT as usize);
        while (received.len() as u64) < COUNT {
            if consumer.drain_into(&mut received) == 0 {
                thread::yield_now();
            }
        }

        let producer = writer.join().expect("writer panicked");
        assert!(received.iter().copied().eq(0..COUNT));
        // Rejected attempts are retried by the test writer, so drops are
        // counted but nothing is lost.
        assert_eq!(producer.dropped(), consumer.dropped());
    }
}
