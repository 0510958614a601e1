//! A single-producer/single-consumer ring buffer for [`super::SoundSample`]s
//! (§5). Capacity is rounded up to a power of two so index wrap is a mask,
//! not a modulo.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::SoundSample;

pub struct RingBuffer {
    storage: Box<[UnsafeCell<SoundSample>]>,
    mask: usize,
    write: AtomicUsize,
    read: AtomicUsize,
}

// SAFETY: `write`/`read` are only ever advanced by their respective single
// producer/consumer, and a slot is never touched by both sides at once
// because the occupancy check always leaves the slot to one side.
unsafe impl Sync for RingBuffer {}

impl RingBuffer {
    /// `requested_capacity` is rounded up to the next power of two.
    pub fn new(requested_capacity: usize) -> Self {
        let capacity = requested_capacity.max(1).next_power_of_two();
        let storage = (0..capacity)
            .map(|_| UnsafeCell::new(SoundSample::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        RingBuffer {
            storage,
            mask: capacity - 1,
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    pub fn len(&self) -> usize {
        self.write.load(Ordering::Acquire).wrapping_sub(self.read.load(Ordering::Acquire))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pushes a sample, overwriting the oldest one if the buffer is full
    /// (matches the glossary's "producer never blocks" requirement).
    pub fn push(&self, sample: SoundSample) {
        let write = self.write.load(Ordering::Relaxed);
        if self.len() == self.capacity() {
            self.read.fetch_add(1, Ordering::AcqRel);
        }
        // SAFETY: only the producer writes this slot, and it has just
        // ensured the consumer is no longer reading it (advanced `read`
        // past it above if it was about to collide).
        unsafe {
            *self.storage[write & self.mask].get() = sample;
        }
        self.write.fetch_add(1, Ordering::Release);
    }

    /// Pops the oldest sample, or `None` if the buffer is empty.
    pub fn pop(&self) -> Option<SoundSample> {
        if self.is_empty() {
            return None;
        }
        let read = self.read.load(Ordering::Relaxed);
        // SAFETY: only the consumer reads this slot, and `is_empty` just
        // confirmed the producer has already written it.
        let sample = unsafe { *self.storage[read & self.mask].get() };
        self.read.fetch_add(1, Ordering::Release);
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_rounds_up_to_a_power_of_two() {
        let rb = RingBuffer::new(100);
        assert_eq!(rb.capacity(), 128);
    }

    #[test]
    fn push_then_pop_round_trips_in_order() {
        let rb = RingBuffer::new(4);
        rb.push(SoundSample::mono(0.1));
        rb.push(SoundSample::mono(0.2));
        assert_eq!(rb.pop(), Some(SoundSample::mono(0.1)));
        assert_eq!(rb.pop(), Some(SoundSample::mono(0.2)));
        assert_eq!(rb.pop(), None);
    }

    #[test]
    fn overflowing_push_drops_the_oldest_sample() {
        let rb = RingBuffer::new(2);
        rb.push(SoundSample::mono(1.0));
        rb.push(SoundSample::mono(2.0));
        rb.push(SoundSample::mono(3.0));
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.pop(), Some(SoundSample::mono(2.0)));
        assert_eq!(rb.pop(), Some(SoundSample::mono(3.0)));
    }
}
