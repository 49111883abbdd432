//! Lock-free single producer / single consumer ring of fixed size records.
//!
//! The queue hands out one [`Producer`] and one [`Consumer`]; neither can be cloned, so the
//! one-writer/one-reader contract holds by construction. Each side owns its own cursor and
//! only reads the other's, publishing with release stores and observing with acquire loads.

use std::{
    cell::UnsafeCell,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::util::error::{FlightError, FlightResult};

struct RingStorage<T> {
    // One slot more than the usable capacity so full and empty are distinguishable.
    slots: Box<[UnsafeCell<T>]>,
    write_head: AtomicUsize,
    read_tail: AtomicUsize,
}

// Slots between the cursors are touched by exactly one side at a time.
unsafe impl<T: Send> Sync for RingStorage<T> {}

impl<T> RingStorage<T> {
    fn num_slots(&self) -> usize {
        self.slots.len()
    }

    fn used(&self, head: usize, tail: usize) -> usize {
        (head + self.num_slots() - tail) % self.num_slots()
    }

    fn slot_ptr(&self, index: usize) -> *mut T {
        self.slots[index].get()
    }
}

pub struct Producer<T> {
    storage: Arc<RingStorage<T>>,
}

pub struct Consumer<T> {
    storage: Arc<RingStorage<T>>,
}

/// Allocates a queue holding exactly `num_elem` records.
pub fn create<T: Copy + Default>(num_elem: usize) -> FlightResult<(Producer<T>, Consumer<T>)> {
    let num_slots = num_elem
        .checked_add(1)
        .filter(|_| num_elem > 0)
        .ok_or(FlightError::QueueAllocation(num_elem))?;

    let mut slots: Vec<UnsafeCell<T>> = Vec::new();
    slots
        .try_reserve_exact(num_slots)
        .map_err(|_| FlightError::QueueAllocation(num_elem))?;
    slots.resize_with(num_slots, || UnsafeCell::new(T::default()));

    let storage = Arc::new(RingStorage {
        slots: slots.into_boxed_slice(),
        write_head: AtomicUsize::new(0),
        read_tail: AtomicUsize::new(0),
    });

    Ok((
        Producer {
            storage: storage.clone(),
        },
        Consumer { storage },
    ))
}

impl<T: Copy> Producer<T> {
    pub fn capacity(&self) -> usize {
        self.storage.num_slots() - 1
    }

    /// Returns (contiguous, total) free slots starting at the write cursor.
    pub fn write_space(&self) -> (usize, usize) {
        let head = self.storage.write_head.load(Ordering::Relaxed);
        let tail = self.storage.read_tail.load(Ordering::Acquire);
        let available = self.capacity() - self.storage.used(head, tail);

        let contiguous = if tail > head {
            tail - head - 1
        } else if tail == 0 {
            self.storage.num_slots() - head - 1
        } else {
            self.storage.num_slots() - head
        };

        (contiguous.min(available), available)
    }

    /// Next free slot, to be filled in place and committed with [`Producer::advance_write`].
    pub fn write_pos(&mut self) -> Option<&mut T> {
        let (_, available) = self.write_space();
        if available == 0 {
            return None;
        }
        let head = self.storage.write_head.load(Ordering::Relaxed);
        // The consumer never touches the slot under the write cursor.
        Some(unsafe { &mut *self.storage.slot_ptr(head) })
    }

    pub fn advance_write(&mut self) -> FlightResult<()> {
        self.advance_write_multi(1)
    }

    /// Commits `count` slots written in place. Rejects the whole commit when it would overflow.
    pub fn advance_write_multi(&mut self, count: usize) -> FlightResult<()> {
        let (_, available) = self.write_space();
        if count > available {
            return Err(FlightError::QueueFull);
        }
        let head = self.storage.write_head.load(Ordering::Relaxed);
        let next = (head + count) % self.storage.num_slots();
        self.storage.write_head.store(next, Ordering::Release);
        Ok(())
    }

    /// Copies as many records from `data` as fit and commits them; returns how many were taken.
    pub fn write_data(&mut self, data: &[T]) -> usize {
        let (_, available) = self.write_space();
        let count = data.len().min(available);
        let head = self.storage.write_head.load(Ordering::Relaxed);
        let num_slots = self.storage.num_slots();

        for (offset, record) in data[..count].iter().enumerate() {
            let index = (head + offset) % num_slots;
            unsafe { *self.storage.slot_ptr(index) = *record };
        }
        self.storage
            .write_head
            .store((head + count) % num_slots, Ordering::Release);
        count
    }

    pub fn try_push(&mut self, record: T) -> FlightResult<()> {
        match self.write_pos() {
            Some(slot) => {
                *slot = record;
                self.advance_write()
            }
            None => Err(FlightError::QueueFull),
        }
    }
}

impl<T: Copy> Consumer<T> {
    pub fn capacity(&self) -> usize {
        self.storage.num_slots() - 1
    }

    /// Returns (contiguous, total) committed records starting at the read cursor.
    pub fn read_space(&self) -> (usize, usize) {
        let head = self.storage.write_head.load(Ordering::Acquire);
        let tail = self.storage.read_tail.load(Ordering::Relaxed);
        let available = self.storage.used(head, tail);

        let contiguous = if head >= tail {
            head - tail
        } else {
            self.storage.num_slots() - tail
        };

        (contiguous, available)
    }

    pub fn is_empty(&self) -> bool {
        self.read_space().1 == 0
    }

    pub fn read_pos(&self) -> Option<&T> {
        let (_, available) = self.read_space();
        if available == 0 {
            return None;
        }
        let tail = self.storage.read_tail.load(Ordering::Relaxed);
        Some(unsafe { &*self.storage.slot_ptr(tail) })
    }

    pub fn read_completed(&mut self) {
        self.read_completed_multi(1);
    }

    /// Releases up to `count` records back to the producer.
    pub fn read_completed_multi(&mut self, count: usize) {
        let (_, available) = self.read_space();
        let count = count.min(available);
        let tail = self.storage.read_tail.load(Ordering::Relaxed);
        let next = (tail + count) % self.storage.num_slots();
        self.storage.read_tail.store(next, Ordering::Release);
    }

    /// Copies up to `buffer.len()` records out and releases them; returns how many were read.
    pub fn read_data(&mut self, buffer: &mut [T]) -> usize {
        let (_, available) = self.read_space();
        let count = buffer.len().min(available);
        let tail = self.storage.read_tail.load(Ordering::Relaxed);
        let num_slots = self.storage.num_slots();

        for (offset, record) in buffer[..count].iter_mut().enumerate() {
            let index = (tail + offset) % num_slots;
            *record = unsafe { *self.storage.slot_ptr(index) };
        }
        self.storage
            .read_tail
            .store((tail + count) % num_slots, Ordering::Release);
        count
    }

    pub fn try_pop(&mut self) -> Option<T> {
        let record = *self.read_pos()?;
        self.read_completed();
        Some(record)
    }

    /// Drops every record committed so far.
    pub fn clear(&mut self) {
        let head = self.storage.write_head.load(Ordering::Acquire);
        self.storage.read_tail.store(head, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_queue() {
        assert_eq!(
            create::<u32>(0).err(),
            Some(FlightError::QueueAllocation(0))
        );
    }

    #[test]
    fn fill_up_then_drain() {
        let (mut producer, mut consumer) = create::<u32>(99).unwrap();
        assert_eq!(producer.capacity(), 99);

        for i in 0..99 {
            let slot = producer.write_pos().unwrap();
            *slot = i;
            assert!(producer.advance_write().is_ok());
        }
        assert!(producer.write_pos().is_none());
        assert_eq!(producer.advance_write(), Err(FlightError::QueueFull));
        assert_eq!(consumer.read_space().1, 99);

        for i in 0..99 {
            assert_eq!(consumer.read_pos(), Some(&i));
            consumer.read_completed();
        }
        assert!(consumer.read_pos().is_none());
        assert!(consumer.is_empty());
    }

    #[test]
    fn strided_writes_wrap_around() {
        let (mut producer, mut consumer) = create::<u32>(99).unwrap();
        let mut next_write = 0_u32;
        let mut next_read = 0_u32;

        for stride in 80..99_u32 {
            let chunk: Vec<u32> = (next_write..next_write + stride).collect();
            assert_eq!(producer.write_data(&chunk), stride as usize);
            next_write += stride;

            let (contiguous, available) = consumer.read_space();
            assert_eq!(available, stride as usize);
            assert!(contiguous <= available);

            let mut out = vec![0; stride as usize];
            assert_eq!(consumer.read_data(&mut out), stride as usize);
            for value in out {
                assert_eq!(value, next_read);
                next_read += 1;
            }
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn contiguous_space_stops_at_buffer_end() {
        let (mut producer, mut consumer) = create::<u8>(4).unwrap();
        assert_eq!(producer.write_space(), (4, 4));
        producer.write_data(&[1, 2, 3]);
        consumer.read_completed_multi(3);
        // Cursors sit at slot 3 of 5.
        assert_eq!(producer.write_space(), (2, 4));
        producer.write_data(&[4, 5, 6]);
        assert_eq!(consumer.read_space(), (2, 3));
        let mut out = [0; 3];
        assert_eq!(consumer.read_data(&mut out), 3);
        assert_eq!(out, [4, 5, 6]);
    }

    #[test]
    fn multi_commit_is_all_or_nothing() {
        let (mut producer, consumer) = create::<u8>(8).unwrap();
        assert!(producer.advance_write_multi(6).is_ok());
        assert_eq!(producer.advance_write_multi(3), Err(FlightError::QueueFull));
        assert_eq!(consumer.read_space().1, 6);
        assert!(producer.advance_write_multi(2).is_ok());
        assert_eq!(producer.try_push(1), Err(FlightError::QueueFull));
    }

    #[test]
    fn clear_discards_committed_records() {
        let (mut producer, mut consumer) = create::<u16>(10).unwrap();
        producer.write_data(&[1, 2, 3, 4]);
        consumer.clear();
        assert!(consumer.is_empty());
        assert!(producer.try_push(9).is_ok());
        assert_eq!(consumer.try_pop(), Some(9));
    }
}
