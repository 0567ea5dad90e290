//! Fixed-capacity ring buffer used for rolling windows
//!
//! Rolling windows (recent outcomes, response times, request instants) never
//! grow past their capacity: once full, each push overwrites the oldest entry.

/// A bounded FIFO window with index wraparound
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    capacity: usize,
    /// Slot the next push writes to; the oldest entry once the buffer is full
    head: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer; a capacity of zero is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Appends a value, evicting the oldest one when full
    pub fn push(&mut self, value: T) {
        if self.buf.len() < self.capacity {
            self.buf.push(value);
        } else {
            self.buf[self.head] = value;
        }
        self.head = (self.head + 1) % self.capacity;
    }

    /// Iterates from the oldest to the newest entry
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.buf.split_at(self.head.min(self.buf.len()));
        older.iter().chain(newer.iter())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.head = 0;
    }
}
