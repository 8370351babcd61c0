use crate::invariants::{
    debug_assert_advance_clamped, debug_assert_index_in_storage, debug_assert_len_bounded,
};
use crate::SerialError;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// Classic SPSC protocol over two indices advancing modulo `capacity + 1`:
//
// - `head` is written only by the consumer, `tail` only by the producer.
// - Each side loads its own index with Relaxed (single writer), the opposite
//   index with Acquire (synchronizes with the other side's Release store),
//   and publishes its advance with Release.
// - Byte slots between the indices need no ordering of their own: a slot is
//   written strictly before the Release store that makes it visible, and read
//   strictly after the Acquire load that revealed it.
//
// The storage holds one slot more than the usable capacity. A slot's byte
// lives one physical position past its index, so `head == tail` means empty
// and the spare slot keeps a full ring distinguishable from an empty one
// without a separate length field.
//
// `len()` loads both indices with Acquire but not atomically as a pair. The
// consumer can only observe a lower bound (tail may advance concurrently) and
// the producer an upper bound (head may advance concurrently); both bounds
// are safe for the respective side.
//
// =============================================================================

/// Bounded SPSC byte ring.
///
/// One producer thread and one consumer thread, no locks. The serial handle
/// pairs two of these: the worker produces into the inbound ring and consumes
/// the outbound ring, the user takes the opposite role on each.
pub struct Ring {
    /// Head index (written by consumer, read by producer).
    head: CachePadded<AtomicUsize>,
    /// Tail index (written by producer, read by consumer).
    tail: CachePadded<AtomicUsize>,
    /// Usable capacity; storage is `capacity + 1` bytes.
    capacity: usize,
    /// Fixed-size storage. `Box<[u8]>`: the allocation never grows.
    buf: UnsafeCell<Box<[u8]>>,
}

// SAFETY: the SPSC protocol above guarantees each storage byte has at most
// one writer at a time, and index publication orders the byte accesses.
unsafe impl Send for Ring {}
unsafe impl Sync for Ring {}

impl Ring {
    /// Creates a ring with `capacity` usable bytes.
    ///
    /// Allocates `capacity + 1` bytes of storage; the spare slot
    /// disambiguates full from empty.
    pub fn new(capacity: usize) -> Result<Self, SerialError> {
        let mut buf: Vec<u8> = Vec::new();
        buf.try_reserve_exact(capacity + 1)
            .map_err(|_| SerialError::Memory)?;
        buf.resize(capacity + 1, 0);

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            capacity,
            buf: UnsafeCell::new(buf.into_boxed_slice()),
        })
    }

    /// Returns the usable capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of storage slots, `capacity + 1`.
    #[inline]
    fn storage(&self) -> usize {
        self.capacity + 1
    }

    #[inline]
    fn distance(&self, head: usize, tail: usize) -> usize {
        (tail + self.storage() - head) % self.storage()
    }

    /// Returns the current number of buffered bytes.
    ///
    /// A lower bound for the consumer, an upper bound for the producer.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        let len = self.distance(head, tail);
        debug_assert_len_bounded!(len, self.capacity);
        len
    }

    /// Returns true if no bytes are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire) == self.tail.load(Ordering::Acquire)
    }

    /// Returns the free space in bytes. Producer-side view.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity - self.len()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        // SAFETY: only the pointer is taken; byte accesses through it are
        // governed by the SPSC protocol.
        unsafe { (*self.buf.get()).as_mut_ptr() }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Copies up to `out.len()` buffered bytes into `out` and advances head.
    ///
    /// Returns the number of bytes copied; 0 when the ring is empty. Only the
    /// consumer may call this.
    pub fn read(&self, out: &mut [u8]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let avail = self.distance(head, tail);

        let take = avail.min(out.len());
        if take == 0 {
            return 0;
        }

        let start = (head + 1) % self.storage();
        let first = take.min(self.storage() - start);

        // SAFETY: bytes in (head, tail] were published by the producer's
        // Release store and revealed by the Acquire load above; the producer
        // will not reuse them until head advances.
        unsafe {
            ptr::copy_nonoverlapping(self.base().add(start), out.as_mut_ptr(), first);
            if take > first {
                ptr::copy_nonoverlapping(self.base(), out.as_mut_ptr().add(first), take - first);
            }
        }

        self.head
            .store((head + take) % self.storage(), Ordering::Release);

        take
    }

    /// Advances head by `n` bytes, clamped to the buffered length.
    ///
    /// Used after external gather I/O reported bytes consumed from
    /// [`used_regions`](Self::used_regions). Only the consumer may call this.
    pub fn advance_head(&self, n: usize) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let avail = self.distance(head, tail);

        let n = n.min(avail);
        debug_assert_advance_clamped!(n, avail);

        self.head
            .store((head + n) % self.storage(), Ordering::Release);
    }

    /// Returns up to two contiguous spans covering the buffered bytes,
    /// without moving head. The second span is empty when no wrap is present.
    ///
    /// The pointers stay valid until head is advanced past them; only the
    /// consumer may dereference them.
    pub fn used_regions(&self) -> [(*const u8, usize); 2] {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let used = self.distance(head, tail);

        let start = (head + 1) % self.storage();
        debug_assert_index_in_storage!("head span", start, self.storage());
        let first = used.min(self.storage() - start);

        let base = self.base().cast_const();
        // SAFETY: offsets stay inside the storage allocation.
        unsafe { [(base.add(start), first), (base, used - first)] }
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Copies up to `free()` bytes from `data` into the ring and advances
    /// tail.
    ///
    /// Returns the number of bytes enqueued; 0 when the ring is full. Only
    /// the producer may call this.
    pub fn write(&self, data: &[u8]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let free = self.capacity - self.distance(head, tail);

        let put = free.min(data.len());
        if put == 0 {
            return 0;
        }

        let start = (tail + 1) % self.storage();
        let first = put.min(self.storage() - start);

        // SAFETY: slots in (tail, tail + put] are free: the consumer only
        // reads up to tail, and `put` is bounded by the free space computed
        // against the Acquire-loaded head.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(start), first);
            if put > first {
                ptr::copy_nonoverlapping(data.as_ptr().add(first), self.base(), put - first);
            }
        }

        self.tail
            .store((tail + put) % self.storage(), Ordering::Release);

        put
    }

    /// Advances tail by `n` bytes, clamped to the free space.
    ///
    /// Used after external scatter I/O reported bytes produced into
    /// [`free_regions`](Self::free_regions). Only the producer may call this.
    pub fn advance_tail(&self, n: usize) {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let free = self.capacity - self.distance(head, tail);

        let n = n.min(free);
        debug_assert_advance_clamped!(n, free);

        self.tail
            .store((tail + n) % self.storage(), Ordering::Release);
    }

    /// Returns up to two contiguous spans covering the free bytes, without
    /// moving tail. The second span is empty when no wrap is present.
    ///
    /// The pointers stay valid until tail is advanced past them; only the
    /// producer may dereference them.
    pub fn free_regions(&self) -> [(*mut u8, usize); 2] {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let free = self.capacity - self.distance(head, tail);

        let start = (tail + 1) % self.storage();
        debug_assert_index_in_storage!("tail span", start, self.storage());
        let first = free.min(self.storage() - start);

        let base = self.base();
        // SAFETY: offsets stay inside the storage allocation.
        unsafe { [(base.add(start), first), (base, free - first)] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_roundtrip() {
        let ring = Ring::new(16).unwrap();
        assert_eq!(ring.capacity(), 16);
        assert!(ring.is_empty());

        assert_eq!(ring.write(b"hello"), 5);
        assert_eq!(ring.len(), 5);

        let mut out = [0u8; 16];
        assert_eq!(ring.read(&mut out), 5);
        assert_eq!(&out[..5], b"hello");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_empty_read_full_write_return_zero() {
        let ring = Ring::new(4).unwrap();

        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 0);

        assert_eq!(ring.write(b"abcd"), 4);
        assert_eq!(ring.write(b"e"), 0);
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_write_saturates_at_free_space() {
        let ring = Ring::new(8).unwrap();
        assert_eq!(ring.write(b"abcdef"), 6);
        assert_eq!(ring.write(b"ghijkl"), 2);
        assert_eq!(ring.len(), 8);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(&out, b"abcdefgh");
    }

    #[test]
    fn test_wrap_preserves_fifo_order() {
        // Matches the worker's usage: partial reads leave the indices mid
        // storage so later writes wrap past the physical end.
        let ring = Ring::new(8).unwrap();

        assert_eq!(ring.write(b"ABCDEF"), 6);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(&mut out), 4);
        assert_eq!(&out, b"ABCD");

        assert_eq!(ring.write(b"GHIJKL"), 6);
        assert_eq!(ring.len(), 8);

        let mut out = [0u8; 8];
        assert_eq!(ring.read(&mut out), 8);
        assert_eq!(&out, b"EFGHIJKL");
    }

    #[test]
    fn test_regions_cover_exactly_used_and_free() {
        let ring = Ring::new(8).unwrap();
        ring.write(b"ABCDEF");
        let mut out = [0u8; 4];
        ring.read(&mut out);
        ring.write(b"GHIJ");

        let used = ring.used_regions();
        assert_eq!(used[0].1 + used[1].1, ring.len());

        let free = ring.free_regions();
        assert_eq!(free[0].1 + free[1].1, ring.capacity() - ring.len());

        // A wrapped second span starts at the storage base, below the first
        // span; the two never overlap.
        if used[1].1 > 0 {
            assert!((used[1].0 as usize) < used[0].0 as usize);
            assert!(used[1].0 as usize + used[1].1 <= used[0].0 as usize);
        }
        if free[1].1 > 0 {
            assert!((free[1].0 as usize) < free[0].0 as usize);
            assert!(free[1].0 as usize + free[1].1 <= free[0].0 as usize);
        }
    }

    #[test]
    fn test_regions_match_read_contents() {
        let ring = Ring::new(8).unwrap();
        ring.write(b"ABCDEF");
        let mut out = [0u8; 4];
        ring.read(&mut out);
        ring.write(b"GHIJKL");

        let used = ring.used_regions();
        let mut gathered = Vec::new();
        for (ptr, len) in used {
            if len > 0 {
                // SAFETY: test is the only consumer.
                gathered.extend_from_slice(unsafe { std::slice::from_raw_parts(ptr, len) });
            }
        }
        assert_eq!(gathered, b"EFGHIJKL");
    }

    #[test]
    fn test_advances_clamp() {
        let ring = Ring::new(8).unwrap();
        ring.write(b"abc");

        ring.advance_head(100);
        assert!(ring.is_empty());

        ring.advance_tail(100);
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn test_zero_capacity_ring_is_total() {
        let ring = Ring::new(0).unwrap();
        assert_eq!(ring.write(b"x"), 0);
        let mut out = [0u8; 1];
        assert_eq!(ring.read(&mut out), 0);
        assert_eq!(ring.len(), 0);
    }

    #[test]
    fn test_external_io_through_regions() {
        // Simulates the worker: produce through free_regions + advance_tail,
        // consume through used_regions + advance_head.
        let ring = Ring::new(8).unwrap();

        let free = ring.free_regions();
        let payload = b"WXYZ";
        let n = payload.len().min(free[0].1);
        // SAFETY: test is the only producer.
        unsafe { ptr::copy_nonoverlapping(payload.as_ptr(), free[0].0, n) };
        ring.advance_tail(n);
        assert_eq!(ring.len(), 4);

        let used = ring.used_regions();
        assert_eq!(used[0].1, 4);
        // SAFETY: test is the only consumer.
        let seen = unsafe { std::slice::from_raw_parts(used[0].0, used[0].1) };
        assert_eq!(seen, b"WXYZ");
        ring.advance_head(4);
        assert!(ring.is_empty());
    }
}
