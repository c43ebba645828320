//! Buffer id rings.
//!
//! Every port carries two of these: the `dequeued` ring holds buffers
//! available to the user, the `queued` ring holds buffers handed back to the
//! graph. Each ring is single-producer single-consumer and wait-free.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use runtime::Error;
use runtime::consts::MAX_BUFFERS;

const MASK: u32 = MAX_BUFFERS as u32 - 1;

/// A bounded ring of buffer ids with monotonically growing indices.
pub struct BufferQueue {
    ids: [AtomicU32; MAX_BUFFERS],
    read: AtomicU32,
    write: AtomicU32,
    /// Bytes pushed into the ring.
    incount: AtomicU64,
    /// Bytes popped out of the ring.
    outcount: AtomicU64,
}

impl BufferQueue {
    /// Construct a new empty queue.
    pub fn new() -> Self {
        Self {
            ids: [const { AtomicU32::new(0) }; MAX_BUFFERS],
            read: AtomicU32::new(0),
            write: AtomicU32::new(0),
            incount: AtomicU64::new(0),
            outcount: AtomicU64::new(0),
        }
    }

    /// Push a buffer id, accounting `size` bytes.
    ///
    /// The caller is responsible for asserting the buffer's queued flag
    /// first; a ring never holds the same id twice.
    pub fn push(&self, id: u32, size: u64) {
        self.incount.fetch_add(size, Ordering::Relaxed);

        let index = self.write.load(Ordering::Relaxed);
        self.ids[(index & MASK) as usize].store(id, Ordering::Relaxed);
        self.write.store(index.wrapping_add(1), Ordering::Release);
    }

    /// Pop the next buffer id.
    ///
    /// Fails with [`Error::Pipe`] when the ring is empty.
    pub fn pop(&self) -> Result<u32, Error> {
        let index = self.read.load(Ordering::Relaxed);

        if self.write.load(Ordering::Acquire).wrapping_sub(index) < 1 {
            return Err(Error::Pipe);
        }

        let id = self.ids[(index & MASK) as usize].load(Ordering::Relaxed);
        self.read.store(index.wrapping_add(1), Ordering::Release);
        Ok(id)
    }

    /// Account bytes popped out of the ring.
    pub fn account_out(&self, size: u64) {
        self.outcount.fetch_add(size, Ordering::Relaxed);
    }

    /// Test if the ring is empty.
    pub fn is_empty(&self) -> bool {
        let index = self.read.load(Ordering::Relaxed);
        self.write.load(Ordering::Acquire).wrapping_sub(index) < 1
    }

    /// Bytes pushed so far.
    pub fn incount(&self) -> u64 {
        self.incount.load(Ordering::Relaxed)
    }

    /// Bytes popped so far.
    pub fn outcount(&self) -> u64 {
        self.outcount.load(Ordering::Relaxed)
    }

    /// Reset the ring, forgetting queued ids.
    ///
    /// The byte counters are evened out so queued-byte accounting starts from
    /// zero again.
    pub fn clear(&self) {
        let read = self.read.load(Ordering::Relaxed);
        self.write.store(read, Ordering::Release);
        self.incount
            .store(self.outcount.load(Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl Default for BufferQueue {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BufferQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferQueue")
            .field("read", &self.read.load(Ordering::Relaxed))
            .field("write", &self.write.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let q = BufferQueue::new();
        assert!(q.is_empty());

        q.push(3, 100);
        assert!(!q.is_empty());
        assert_eq!(q.pop(), Ok(3));
        assert!(q.is_empty());
    }

    #[test]
    fn pop_empty_is_pipe() {
        let q = BufferQueue::new();
        assert_eq!(q.pop(), Err(Error::Pipe));
    }

    #[test]
    fn byte_accounting() {
        let q = BufferQueue::new();
        q.push(0, 512);
        q.push(1, 512);
        assert_eq!(q.incount(), 1024);

        q.pop().unwrap();
        q.account_out(512);
        assert_eq!(q.incount() - q.outcount(), 512);
    }

    #[test]
    fn wraps_around_with_full_occupancy() {
        let q = BufferQueue::new();

        // Push/pop enough times to wrap the u32 ring indices through several
        // full windows of 64 outstanding entries.
        for round in 0..1000u32 {
            for id in 0..MAX_BUFFERS as u32 {
                q.push(id ^ round, 1);
            }

            for id in 0..MAX_BUFFERS as u32 {
                assert_eq!(q.pop(), Ok(id ^ round));
            }

            assert!(q.is_empty());
        }
    }
}
