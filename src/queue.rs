//! Fixed-capacity FIFO buffer backing the outbound write pipeline.
//!
//! The buffer is deliberately dumb: no blocking, no eviction, no
//! reallocation after construction. Backpressure is the caller's problem:
//! a full buffer rejects the push and hands the item back. This keeps the
//! enqueue path allocation-stable so it imposes no latency variance in a
//! tight send loop.

/// Ring buffer with a hard capacity and strict FIFO ordering.
///
/// # Examples
///
/// ```
/// use cotwire::queue::RingBuffer;
///
/// let mut buf = RingBuffer::new(2);
/// assert!(buf.push("a").is_ok());
/// assert!(buf.push("b").is_ok());
/// // Full: the rejected item comes back to the caller.
/// assert_eq!(buf.push("c"), Err("c"));
/// assert_eq!(buf.pop(), Some("a"));
/// assert_eq!(buf.pop(), Some("b"));
/// assert_eq!(buf.pop(), None);
/// ```
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` items.
    ///
    /// Backing storage is allocated once, up front.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Append an item at the tail.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` when the buffer is full, handing the item back
    /// without blocking.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.len == self.slots.len() {
            return Err(item);
        }
        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = Some(item);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest item, or `None` when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        item
    }

    /// Inspect the oldest item without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Number of items currently buffered.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    /// Returns `true` when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Returns `true` when a push would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool { self.len == self.slots.len() }

    /// Maximum number of items the buffer can hold.
    #[must_use]
    pub fn capacity(&self) -> usize { self.slots.len() }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.slots.len())
            .finish()
    }
}
