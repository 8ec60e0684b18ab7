//! Growable ring buffer for audio samples
//!
//! A plain circular store with a read cursor, a write cursor and a live
//! element count. It does no locking of its own: the audio bridge wraps it in
//! a single mutex shared by the producer and the device callback.
//!
//! Pushing more than the free space grows the backing store; samples are
//! never dropped to make room.

use crate::error::AudioError;

/// Circular buffer of `Copy` samples
pub struct RingBuffer<T> {
    /// Backing store, `capacity` elements long
    buf: Vec<T>,
    /// Index of the oldest live element
    head: usize,
    /// Number of live elements
    len: usize,
    /// Times the backing store was reallocated by a push
    grow_count: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a buffer holding up to `capacity` elements before it grows
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![T::default(); capacity],
            head: 0,
            len: 0,
            grow_count: 0,
        }
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Free slots before the next push has to grow the store
    pub fn vacant(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Times a push reallocated the store
    pub fn grow_count(&self) -> usize {
        self.grow_count
    }

    /// Fill level as a fraction of capacity
    pub fn fill_level(&self) -> f32 {
        if self.buf.is_empty() {
            0.0
        } else {
            self.len as f32 / self.buf.len() as f32
        }
    }

    /// Append `items` at the back, growing the store if they do not fit
    pub fn push_back(&mut self, items: &[T]) {
        if items.len() > self.vacant() {
            let needed = self.len + items.len();
            let grown = needed.max(self.buf.len() * 2);
            self.realloc(grown);
            self.grow_count += 1;
        }

        let cap = self.buf.len();
        if cap == 0 {
            return;
        }
        let tail = (self.head + self.len) % cap;
        let first = items.len().min(cap - tail);
        self.buf[tail..tail + first].copy_from_slice(&items[..first]);
        self.buf[..items.len() - first].copy_from_slice(&items[first..]);
        self.len += items.len();
    }

    /// Append one element
    pub fn push_back_one(&mut self, item: T) {
        self.push_back(std::slice::from_ref(&item));
    }

    /// Copy the oldest `out.len()` elements into `out` without consuming them
    pub fn front(&self, out: &mut [T]) -> Result<(), AudioError> {
        let count = out.len();
        if count > self.len {
            return Err(AudioError::BufferUnderrun {
                requested: count,
                available: self.len,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let cap = self.buf.len();
        let first = count.min(cap - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        out[first..].copy_from_slice(&self.buf[..count - first]);
        Ok(())
    }

    /// Discard the oldest `count` elements
    pub fn pop_front(&mut self, count: usize) -> Result<(), AudioError> {
        if count > self.len {
            return Err(AudioError::BufferUnderrun {
                requested: count,
                available: self.len,
            });
        }
        if count == 0 {
            return Ok(());
        }

        self.head = (self.head + count) % self.buf.len();
        self.len -= count;
        if self.len == 0 {
            self.head = 0;
        }
        Ok(())
    }

    /// Copy the oldest `out.len()` elements into `out` and consume them
    pub fn pop_front_into(&mut self, out: &mut [T]) -> Result<(), AudioError> {
        self.front(out)?;
        self.pop_front(out.len())
    }

    /// Change the capacity, keeping every live element in order
    pub fn resize(&mut self, capacity: usize) -> Result<(), AudioError> {
        if capacity < self.len {
            return Err(AudioError::InvalidCapacity {
                requested: capacity,
                live: self.len,
            });
        }
        self.realloc(capacity);
        Ok(())
    }

    /// Drop every live element
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    fn realloc(&mut self, capacity: usize) {
        let mut buf = vec![T::default(); capacity];
        // len <= capacity is checked by every caller
        let live = self.len;
        if live > 0 {
            let _ = self.front(&mut buf[..live]);
        }
        self.buf = buf;
        self.head = 0;
    }
}

impl<T: Copy + Default> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(crate::constants::RING_BUFFER_CAPACITY)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .field("head", &self.head)
            .field("grow_count", &self.grow_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_basic() {
        let mut buffer = RingBuffer::<f32>::new(8);

        buffer.push_back(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.vacant(), 5);

        let mut out = [0.0; 2];
        buffer.pop_front_into(&mut out).unwrap();
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(buffer.len(), 1);

        buffer.pop_front_into(&mut out[..1]).unwrap();
        assert_eq!(out[0], 3.0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_front_does_not_consume() {
        let mut buffer = RingBuffer::<i32>::new(4);
        buffer.push_back(&[7, 8]);

        let mut out = [0; 2];
        buffer.front(&mut out).unwrap();
        assert_eq!(out, [7, 8]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_wraparound() {
        let mut buffer = RingBuffer::<i32>::new(4);
        buffer.push_back(&[1, 2, 3]);
        buffer.pop_front(2).unwrap();
        buffer.push_back(&[4, 5, 6]);
        assert!(buffer.is_full());
        assert_eq!(buffer.grow_count(), 0);

        let mut out = [0; 4];
        buffer.pop_front_into(&mut out).unwrap();
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn test_push_when_full_grows() {
        let mut buffer = RingBuffer::<i32>::new(4);
        buffer.push_back(&[1, 2, 3]);
        buffer.pop_front(1).unwrap();
        buffer.push_back(&[4, 5, 6, 7, 8]);

        assert_eq!(buffer.grow_count(), 1);
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.len(), 7);

        let mut out = [0; 7];
        buffer.pop_front_into(&mut out).unwrap();
        assert_eq!(out, [2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_zero_capacity_grows_on_push() {
        let mut buffer = RingBuffer::<u8>::new(0);
        buffer.push_back_one(9);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_pop_more_than_live_is_error() {
        let mut buffer = RingBuffer::<f32>::new(4);
        buffer.push_back(&[0.5]);

        let mut out = [0.0; 2];
        assert_eq!(
            buffer.pop_front_into(&mut out),
            Err(AudioError::BufferUnderrun {
                requested: 2,
                available: 1
            })
        );
        assert_eq!(buffer.len(), 1);
        assert!(buffer.pop_front(2).is_err());
    }

    #[test]
    fn test_resize_keeps_order() {
        let mut buffer = RingBuffer::<i32>::new(4);
        buffer.push_back(&[1, 2, 3, 4]);
        buffer.pop_front(3).unwrap();
        buffer.push_back(&[5, 6]);

        buffer.resize(16).unwrap();
        assert_eq!(buffer.capacity(), 16);

        let mut out = [0; 3];
        buffer.front(&mut out).unwrap();
        assert_eq!(out, [4, 5, 6]);

        assert_eq!(
            buffer.resize(2),
            Err(AudioError::InvalidCapacity {
                requested: 2,
                live: 3
            })
        );
    }

    #[test]
    fn test_clear() {
        let mut buffer = RingBuffer::<f32>::new(4);
        buffer.push_back(&[1.0, 2.0]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.fill_level(), 0.0);
    }
}
