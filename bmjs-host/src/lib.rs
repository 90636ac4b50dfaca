//! BMJS host embedding layer
//!
//! Runs scripts on a target with no operating system: one fixed memory
//! region holds every script allocation, a static table of host functions
//! forms the global surface, and output goes to a single byte sink.
//!
//! # Architecture
//!
//! - `arena`: region sizing and the claim-once static region
//! - `binding`: native binding table and dispatch from the engine
//! - `text`: value-to-bytes conversion (borrowed, inline or pinned overflow)
//! - `context`: create, evaluate, report, tear down
//! - `sink`: output devices (in-memory buffer, 16550 UART with `serial`)
//! - `stdlib`: `print`, `console.log`, clocks, `gc`, `load`, timers
//! - `program`: the boot routine

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod arena;
pub mod binding;
pub mod config;
pub mod context;
pub mod error;
pub mod program;
pub mod sink;
pub mod stdlib;
pub mod text;

pub use arena::{bind, StaticArena, ARENA_SIZE, BOOT_ARENA, MIN_ARENA_SIZE};
pub use binding::{Binding, BindingTable, NativeCx, NativeFn};
pub use config::HostConfig;
pub use context::{Context, ContextState};
pub use error::ContextError;
pub use sink::{BufferSink, OutputSink};
pub use stdlib::stdlib;
pub use text::{to_text, Text, TextBuf, INLINE_TEXT_CAPACITY};

#[cfg(all(feature = "serial", target_arch = "x86_64"))]
pub use sink::SerialSink;

pub use bmjs_engine::{EvalFlags, Exception, JsResult, Value};

/// Claim the boot region, run `source` on COM1 and release everything.
///
/// Returns 1 if the region was already claimed or too small.
#[cfg(all(feature = "serial", target_arch = "x86_64"))]
pub fn boot(source: &str) -> i32 {
    let mut sink = SerialSink::com1();
    match BOOT_ARENA.claim() {
        Some(memory) => program::run(memory, &mut sink, source),
        None => {
            sink.put_str(b"Failed to create JS context\n");
            1
        }
    }
}
