//! Fixed-capacity memory arena.
//!
//! The arena is the only memory the engine uses for script data. It is a
//! borrowed byte region carved from both ends:
//!
//! - heap records grow upward from offset 0 (the low cursor)
//! - pinned blocks (host-side text conversions) grow downward from the end
//!   (the high cursor) and are never reclaimed before teardown
//!
//! Every allocation is checked against the remaining space. Ordinary
//! allocations must leave [`MIN_FREE_SIZE`] bytes untouched; that reserve is
//! only spent by critical allocations such as building the out-of-memory
//! exception itself.

use core::fmt;

/// Bytes kept free for critical allocations.
pub const MIN_FREE_SIZE: usize = 1024;

/// Record alignment inside the low region.
pub const ALIGN: usize = 8;

/// Round `size` up to the record alignment.
#[inline]
pub const fn align_up(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

/// Which part of the free space an allocation may draw on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserve {
    /// Must leave [`MIN_FREE_SIZE`] bytes free.
    Normal,
    /// May consume the reserve.
    Critical,
}

/// Allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfMemory {
    /// Bytes requested.
    pub requested: usize,
    /// Bytes that were free at the time.
    pub free: usize,
}

impl fmt::Display for OutOfMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "out of memory: requested {} bytes, {} free",
            self.requested, self.free
        )
    }
}

/// Arena usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArenaStats {
    /// Total capacity in bytes.
    pub capacity: usize,
    /// Bytes below the low cursor (heap records, live or free).
    pub heap_bytes: usize,
    /// Bytes above the high cursor (pinned blocks).
    pub pinned_bytes: usize,
    /// Bytes between the cursors.
    pub free: usize,
}

/// Two-ended bump region over a borrowed buffer.
pub struct Arena<'a> {
    mem: &'a mut [u8],
    low: usize,
    high: usize,
}

impl<'a> Arena<'a> {
    /// Wrap a region. The region is owned by the arena until
    /// [`Arena::into_inner`].
    pub fn new(mem: &'a mut [u8]) -> Self {
        let high = mem.len();
        Arena { mem, low: 0, high }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    /// Bytes between the two cursors.
    pub fn free(&self) -> usize {
        self.high - self.low
    }

    /// Bytes consumed at either end.
    pub fn used(&self) -> usize {
        self.capacity() - self.free()
    }

    /// Current low cursor.
    pub fn low(&self) -> usize {
        self.low
    }

    /// Current high cursor.
    pub fn high(&self) -> usize {
        self.high
    }

    /// Usage snapshot.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity(),
            heap_bytes: self.low,
            pinned_bytes: self.capacity() - self.high,
            free: self.free(),
        }
    }

    fn check(&self, size: usize, reserve: Reserve) -> Result<(), OutOfMemory> {
        let needed = match reserve {
            Reserve::Normal => size.checked_add(MIN_FREE_SIZE),
            Reserve::Critical => Some(size),
        };
        match needed {
            Some(n) if n <= self.free() => Ok(()),
            _ => Err(OutOfMemory {
                requested: size,
                free: self.free(),
            }),
        }
    }

    /// Carve an aligned block from the low end. Returns its offset.
    pub fn alloc_low(&mut self, size: usize, reserve: Reserve) -> Result<usize, OutOfMemory> {
        let size = align_up(size);
        self.check(size, reserve)?;
        let offset = self.low;
        self.low += size;
        Ok(offset)
    }

    /// Carve an unaligned block from the high end. Returns its offset.
    pub fn alloc_high(&mut self, size: usize, reserve: Reserve) -> Result<usize, OutOfMemory> {
        self.check(size, reserve)?;
        self.high -= size;
        Ok(self.high)
    }

    /// Move the low cursor back after the tail of the heap was freed.
    pub fn shrink_low(&mut self, new_low: usize) {
        if new_low <= self.low {
            self.low = new_low;
        }
    }

    /// Read-only view of `len` bytes at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.mem.get(offset..end)
    }

    /// Mutable view of `len` bytes at `offset`.
    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Option<&mut [u8]> {
        let end = offset.checked_add(len)?;
        self.mem.get_mut(offset..end)
    }

    /// Everything below `offset` for reading, and the `len` bytes at
    /// `offset` for writing.
    pub fn split_below(&mut self, offset: usize, len: usize) -> Option<(&[u8], &mut [u8])> {
        let end = offset.checked_add(len)?;
        if end > self.mem.len() {
            return None;
        }
        let (head, tail) = self.mem.split_at_mut(offset);
        Some((head, &mut tail[..len]))
    }

    /// The heap region `[0, low)` for reading, and the block at `offset`
    /// for writing. `offset` must not lie below the low cursor.
    pub fn split_at_low(&mut self, offset: usize, len: usize) -> Option<(&[u8], &mut [u8])> {
        if offset < self.low {
            return None;
        }
        let end = offset.checked_add(len)?;
        if end > self.mem.len() {
            return None;
        }
        let low = self.low;
        let (head, tail) = self.mem.split_at_mut(offset);
        Some((&head[..low], &mut tail[..len]))
    }

    /// Move bytes within the region.
    pub fn copy_within(&mut self, src: usize, len: usize, dst: usize) -> Option<()> {
        let src_end = src.checked_add(len)?;
        let dst_end = dst.checked_add(len)?;
        if src_end > self.mem.len() || dst_end > self.mem.len() {
            return None;
        }
        self.mem.copy_within(src..src_end, dst);
        Some(())
    }

    /// Release the region back to its owner.
    pub fn into_inner(self) -> &'a mut [u8] {
        self.mem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_low_is_aligned() {
        let mut buf = [0u8; 4096];
        let mut arena = Arena::new(&mut buf);
        let a = arena.alloc_low(3, Reserve::Normal).unwrap();
        let b = arena.alloc_low(9, Reserve::Normal).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 8);
        assert_eq!(arena.low(), 24);
    }

    #[test]
    fn test_alloc_high_grows_down() {
        let mut buf = [0u8; 4096];
        let mut arena = Arena::new(&mut buf);
        let a = arena.alloc_high(10, Reserve::Normal).unwrap();
        let b = arena.alloc_high(5, Reserve::Normal).unwrap();
        assert_eq!(a, 4086);
        assert_eq!(b, 4081);
        assert_eq!(arena.stats().pinned_bytes, 15);
    }

    #[test]
    fn test_normal_allocation_keeps_reserve() {
        let mut buf = [0u8; 2048];
        let mut arena = Arena::new(&mut buf);
        let room = 2048 - MIN_FREE_SIZE;
        assert!(arena.alloc_high(room + 1, Reserve::Normal).is_err());
        assert!(arena.alloc_high(room, Reserve::Normal).is_ok());
        assert!(arena.alloc_high(1, Reserve::Normal).is_err());
        assert!(arena.alloc_high(MIN_FREE_SIZE, Reserve::Critical).is_ok());
        assert_eq!(arena.free(), 0);
        let err = arena.alloc_low(8, Reserve::Critical).unwrap_err();
        assert_eq!(err.requested, 8);
        assert_eq!(err.free, 0);
    }

    #[test]
    fn test_shrink_low_never_grows() {
        let mut buf = [0u8; 4096];
        let mut arena = Arena::new(&mut buf);
        arena.alloc_low(64, Reserve::Normal).unwrap();
        arena.shrink_low(128);
        assert_eq!(arena.low(), 64);
        arena.shrink_low(16);
        assert_eq!(arena.low(), 16);
    }

    #[test]
    fn test_split_rejects_heap_overlap() {
        let mut buf = [0u8; 4096];
        let mut arena = Arena::new(&mut buf);
        arena.alloc_low(64, Reserve::Normal).unwrap();
        assert!(arena.split_at_low(32, 4).is_none());
        let (heap, block) = arena.split_at_low(100, 4).unwrap();
        assert_eq!(heap.len(), 64);
        assert_eq!(block.len(), 4);
    }

    #[test]
    fn test_split_below_reads_everything_under_the_block() {
        let mut buf = [0u8; 256];
        let mut arena = Arena::new(&mut buf);
        let rec = arena.alloc_low(32, Reserve::Normal).unwrap();
        let (below, block) = arena.split_below(rec + 12, 8).unwrap();
        assert_eq!(below.len(), 12);
        block.copy_from_slice(b"abcdefgh");
        assert_eq!(arena.bytes(12, 8), Some(&b"abcdefgh"[..]));
        assert!(arena.split_below(250, 8).is_none());
    }

    #[test]
    fn test_out_of_bounds_views() {
        let mut buf = [0u8; 64];
        let arena = Arena::new(&mut buf);
        assert!(arena.bytes(60, 8).is_none());
        assert!(arena.bytes(usize::MAX, 2).is_none());
        assert_eq!(arena.bytes(60, 4).map(|b| b.len()), Some(4));
    }
}
