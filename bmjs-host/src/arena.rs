//! Arena sizing and the static backing region.
//!
//! Firmware has no allocator for script data, so the whole context lives in
//! one fixed region. [`StaticArena`] is that region, handed out once.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use bmjs_engine::Arena;

use crate::error::ContextError;

/// Smallest region a context can be created in.
pub const MIN_ARENA_SIZE: usize = 10 * 1024;

/// Region size used by the boot program.
pub const ARENA_SIZE: usize = 64 * 1024;

/// Wrap `buffer` as an engine arena after checking its size.
pub fn bind(buffer: &mut [u8]) -> Result<Arena<'_>, ContextError> {
    if buffer.len() < MIN_ARENA_SIZE {
        return Err(ContextError::ArenaTooSmall {
            min: MIN_ARENA_SIZE,
            actual: buffer.len(),
        });
    }
    Ok(Arena::new(buffer))
}

/// A `'static` byte region that can be claimed exactly once.
pub struct StaticArena<const N: usize> {
    claimed: AtomicBool,
    memory: UnsafeCell<[u8; N]>,
}

// SAFETY: the only access to `memory` goes through `claim`, which hands out
// the single mutable borrow at most once.
unsafe impl<const N: usize> Sync for StaticArena<N> {}

impl<const N: usize> StaticArena<N> {
    /// A zeroed, unclaimed region.
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
            memory: UnsafeCell::new([0; N]),
        }
    }

    /// Take the region. Returns `None` on every call after the first.
    pub fn claim(&'static self) -> Option<&'static mut [u8]> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return None;
        }
        // SAFETY: the flag was clear, so no other borrow exists.
        Some(unsafe { &mut *self.memory.get() })
    }

    /// Claim the region or report that it is gone.
    pub fn try_claim(&'static self) -> Result<&'static mut [u8], ContextError> {
        self.claim().ok_or(ContextError::ArenaAlreadyClaimed)
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for StaticArena<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The boot program's region.
pub static BOOT_ARENA: StaticArena<ARENA_SIZE> = StaticArena::new();

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_bind_rejects_small_regions() {
        let mut buf = vec![0u8; MIN_ARENA_SIZE - 1];
        assert!(matches!(
            bind(&mut buf),
            Err(ContextError::ArenaTooSmall { min: MIN_ARENA_SIZE, actual }) if actual == MIN_ARENA_SIZE - 1
        ));
    }

    #[test]
    fn test_bind_accepts_minimum() {
        let mut buf = vec![0u8; MIN_ARENA_SIZE];
        let arena = bind(&mut buf).unwrap();
        assert_eq!(arena.capacity(), MIN_ARENA_SIZE);
    }

    #[test]
    fn test_claim_once() {
        static REGION: StaticArena<256> = StaticArena::new();
        assert!(!REGION.is_claimed());
        let first = REGION.claim().unwrap();
        assert_eq!(first.len(), 256);
        assert!(REGION.claim().is_none());
        assert_eq!(REGION.try_claim(), Err(ContextError::ArenaAlreadyClaimed));
        assert!(REGION.is_claimed());
    }
}
