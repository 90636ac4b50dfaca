//! Property 1: Arena capacity floor.
//!
//! For any region smaller than `MIN_ARENA_SIZE`, context creation fails
//! with `ArenaTooSmall` carrying the actual size; for any region at or above
//! it, creation succeeds and the region comes back whole on teardown.

use bmjs_host::{stdlib, BufferSink, Context, ContextError, HostConfig, MIN_ARENA_SIZE};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Below the floor, creation always fails the same way.
    #[test]
    fn small_regions_are_rejected(size in 0..MIN_ARENA_SIZE) {
        let mut mem = vec![0u8; size];
        let err = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).err();
        prop_assert_eq!(
            err,
            Some(ContextError::ArenaTooSmall { min: MIN_ARENA_SIZE, actual: size })
        );
    }

    /// At or above the floor, creation succeeds and teardown returns the region.
    #[test]
    fn large_regions_are_accepted(size in MIN_ARENA_SIZE..4 * MIN_ARENA_SIZE) {
        let mut mem = vec![0u8; size];
        let ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default());
        prop_assert!(ctx.is_ok());
        if let Ok(ctx) = ctx {
            prop_assert_eq!(ctx.arena_stats().capacity, size);
            prop_assert_eq!(ctx.teardown().len(), size);
        }
    }
}

/// The floor is exact.
#[test]
fn boundary_sizes() {
    let mut mem = vec![0u8; MIN_ARENA_SIZE - 1];
    assert!(Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).is_err());
    let mut mem = vec![0u8; MIN_ARENA_SIZE];
    assert!(Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).is_ok());
}
