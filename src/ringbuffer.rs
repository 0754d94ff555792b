//! Ringbuffer module for tracking historical samples.
//!
//! This module provides a fixed-size ringbuffer with predictable memory usage.
//! Entries are overwritten oldest-first once the buffer is full.

/// A circular buffer with fixed capacity.
#[derive(Debug, Clone)]
pub struct Ringbuffer<T> {
    entries: Vec<Option<T>>,
    capacity: usize,
    write_index: usize,
    count: usize,
}

impl<T: Clone> Ringbuffer<T> {
    /// Creates a new ringbuffer with the specified capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);

        Self {
            entries,
            capacity,
            write_index: 0,
            count: 0,
        }
    }

    /// Pushes a new entry into the ringbuffer.
    ///
    /// If the buffer is full, the oldest entry will be overwritten.
    pub fn push(&mut self, entry: T) {
        self.entries[self.write_index] = Some(entry);
        self.write_index = (self.write_index + 1) % self.capacity;

        if self.count < self.capacity {
            self.count += 1;
        }
    }

    /// Index of the i-th oldest entry.
    fn physical(&self, i: usize) -> usize {
        if self.count < self.capacity {
            i
        } else {
            (self.write_index + i) % self.capacity
        }
    }

    /// Returns all entries in chronological order (oldest to newest).
    pub fn get_history(&self) -> Vec<T> {
        self.tail(self.count)
    }

    /// Returns the newest `n` entries in chronological order.
    pub fn tail(&self, n: usize) -> Vec<T> {
        let n = n.min(self.count);
        let skip = self.count - n;
        (skip..self.count)
            .filter_map(|i| self.entries[self.physical(i)].clone())
            .collect()
    }

    /// Returns the newest entry, if any.
    pub fn last(&self) -> Option<&T> {
        if self.count == 0 {
            return None;
        }
        self.entries[self.physical(self.count - 1)].as_ref()
    }

    /// Changes the capacity, keeping the newest entries that still fit.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        let kept = self.tail(capacity);
        *self = Self::new(capacity);
        for entry in kept {
            self.push(entry);
        }
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.write_index = 0;
        self.count = 0;
    }

    /// Returns the current number of entries in the buffer.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns the maximum capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
