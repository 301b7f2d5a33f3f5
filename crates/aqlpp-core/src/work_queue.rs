//! Fixed-capacity FIFO work queues
//!
//! Single writer (interrupt handlers and ingest, which enqueue) and single
//! reader (the drain step). `head` and `tail` are monotonically increasing
//! `u64` counters; the storage index is `counter & mask`.
//!
//! - empty when `head == tail`
//! - full when `tail - head == capacity`
//!
//! The processor runs the writer side with interrupts masked, so no atomics
//! are needed here.

use crate::error::{PpError, Result};

pub struct WorkQueue<T: Copy> {
    entries: Vec<Option<T>>,
    /// Next entry to pop
    head: u64,
    /// Next free position
    tail: u64,
    mask: u64,
    name: &'static str,
}

impl<T: Copy> WorkQueue<T> {
    /// `capacity` is rounded up to a power of two
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self {
            entries: vec![None; capacity],
            head: 0,
            tail: 0,
            mask: capacity as u64 - 1,
            name,
        }
    }

    /// Append to the tail. Fails without modifying the queue when full.
    pub fn push(&mut self, entry: T) -> Result<()> {
        if self.is_full() {
            return Err(PpError::QueueFull(self.name));
        }
        self.entries[(self.tail & self.mask) as usize] = Some(entry);
        self.tail += 1;
        Ok(())
    }

    /// Remove the head entry
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let entry = self.entries[(self.head & self.mask) as usize].take();
        self.head += 1;
        entry
    }

    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.entries[(self.head & self.mask) as usize].as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        (self.tail - self.head) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() as u64 > self.mask
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Total entries ever pushed
    #[inline]
    pub fn pushed(&self) -> u64 {
        self.tail
    }
}

impl<T: Copy> core::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
