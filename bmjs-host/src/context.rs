//! Context lifecycle and evaluation.
//!
//! A [`Context`] is one interpreter bound to one arena, with its bindings
//! installed and an output sink attached. It is created in one step, runs
//! any number of evaluations, and is destroyed with [`Context::teardown`],
//! which hands the raw region back.

use bmjs_engine::{ArenaStats, EvalFlags, GcStats, JsResult, Realm, Reserve, Value};

use crate::arena;
use crate::binding::{Binding, BindingTable, Dispatch};
use crate::config::HostConfig;
use crate::error::ContextError;
use crate::sink::OutputSink;
use crate::text::{self, Text, TextBuf};

/// Lifecycle state.
///
/// `Uninitialized` and `TornDown` bracket the life of a [`Context`] value:
/// [`Context::new`] starts from the first and [`Context::teardown`] ends in
/// the second. Both show up in transition logs, never from
/// [`Context::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No region bound yet.
    Uninitialized,
    /// Arena bound and intrinsics created, bindings not installed.
    Bound,
    /// Waiting for the next evaluation.
    Ready,
    /// Running a script.
    Evaluating,
    /// Region released.
    TornDown,
}

/// One interpreter instance over a host-provided region.
pub struct Context<'a, S: OutputSink> {
    realm: Realm<'a>,
    bindings: BindingTable<S>,
    sink: S,
    config: HostConfig,
    timers: u32,
    state: ContextState,
}

impl<'a, S: OutputSink> Context<'a, S> {
    /// Bind `buffer`, create the engine state and install `bindings`.
    pub fn new(
        buffer: &'a mut [u8],
        bindings: &[Binding<S>],
        sink: S,
        config: HostConfig,
    ) -> Result<Self, ContextError> {
        let table = BindingTable::new(bindings)?;
        let arena = arena::bind(buffer)?;
        let realm = Realm::new(arena, config.realm_config())?;

        let mut context = Context {
            realm,
            bindings: table,
            sink,
            config,
            timers: 0,
            state: ContextState::Uninitialized,
        };
        context.transition(ContextState::Bound);
        context.bindings.install(&mut context.realm)?;
        context.transition(ContextState::Ready);

        let stats = context.realm.stats();
        log::info!(
            "[bmjs] context ready: {} bytes, {} used by intrinsics and bindings",
            stats.capacity,
            stats.capacity - stats.free
        );
        Ok(context)
    }

    /// Run `source` as a script.
    ///
    /// Returns the value of the last expression statement. On failure the
    /// thrown value is available from [`current_exception`](Self::current_exception)
    /// until the next evaluation.
    pub fn evaluate(
        &mut self,
        source: &[u8],
        source_name: &str,
        flags: EvalFlags,
    ) -> JsResult<Value> {
        self.transition(ContextState::Evaluating);
        let mut host = Dispatch {
            table: &self.bindings,
            sink: &mut self.sink,
            config: &self.config,
            timers: &mut self.timers,
        };
        let result = self.realm.eval(&mut host, source, source_name, flags);
        self.transition(ContextState::Ready);

        if result.is_err() {
            log::debug!("[bmjs] {}: uncaught exception", source_name);
        }
        result
    }

    /// The pending exception, if the last evaluation failed.
    pub fn current_exception(&self) -> Option<Value> {
        self.realm.exception()
    }

    /// Convert a value for the host. May use the arena's critical reserve.
    pub fn to_text<'t>(&'t mut self, value: Value, buf: &'t mut TextBuf) -> JsResult<Text<'t>> {
        text::to_text(&mut self.realm, value, buf, Reserve::Critical)
    }

    /// Convert a value and write it to the sink.
    pub fn write_value(&mut self, value: Value) -> JsResult<()> {
        let mut buf = TextBuf::new();
        let text = text::to_text(&mut self.realm, value, &mut buf, Reserve::Critical)?;
        self.sink.put_str(text.as_bytes());
        Ok(())
    }

    /// Collect garbage now.
    pub fn collect(&mut self) -> GcStats {
        self.realm.collect()
    }

    pub fn arena_stats(&self) -> ArenaStats {
        self.realm.stats()
    }

    /// Read-only access to the engine.
    pub fn realm(&self) -> &Realm<'a> {
        &self.realm
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    fn transition(&mut self, to: ContextState) {
        log::trace!("[bmjs] context {:?} -> {:?}", self.state, to);
        self.state = to;
    }

    /// Destroy the context and return its region.
    pub fn teardown(mut self) -> &'a mut [u8] {
        self.transition(ContextState::TornDown);
        let stats = self.realm.stats();
        log::info!(
            "[bmjs] context torn down: {} heap, {} pinned, {} free",
            stats.heap_bytes,
            stats.pinned_bytes,
            stats.free
        );
        self.realm.into_arena().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::MIN_ARENA_SIZE;
    use crate::sink::BufferSink;
    use crate::stdlib::stdlib;
    use alloc::vec;

    #[test]
    fn test_new_is_ready() {
        let mut mem = vec![0u8; 32 * 1024];
        let ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap();
        assert_eq!(ctx.state(), ContextState::Ready);
        assert!(ctx.current_exception().is_none());
    }

    #[test]
    fn test_too_small() {
        let mut mem = vec![0u8; MIN_ARENA_SIZE / 2];
        let err = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).err();
        assert_eq!(
            err,
            Some(ContextError::ArenaTooSmall {
                min: MIN_ARENA_SIZE,
                actual: MIN_ARENA_SIZE / 2
            })
        );
    }

    #[test]
    fn test_evaluate_returns_last_expression() {
        let mut mem = vec![0u8; 32 * 1024];
        let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap();
        let value = ctx.evaluate(b"var a = 20; a + 22", "<test>", EvalFlags::empty()).unwrap();
        assert_eq!(value, Value::Int(42));
        assert_eq!(ctx.state(), ContextState::Ready);
    }

    #[test]
    fn test_module_flag_rejected() {
        let mut mem = vec![0u8; 32 * 1024];
        let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap();
        assert!(ctx.evaluate(b"1", "<test>", EvalFlags::MODULE).is_err());
        let exception = ctx.current_exception().unwrap();
        let mut buf = TextBuf::new();
        let text = ctx.to_text(exception, &mut buf).unwrap();
        assert!(text.as_str().unwrap().starts_with("TypeError"));
    }

    #[test]
    fn test_failed_evaluation_returns_to_ready() {
        let mut mem = vec![0u8; 32 * 1024];
        let mut ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap();
        assert!(ctx.evaluate(b"throw 1", "<test>", EvalFlags::empty()).is_err());
        assert_eq!(ctx.state(), ContextState::Ready);
        assert_ne!(ctx.state(), ContextState::Uninitialized);
        assert_ne!(ctx.state(), ContextState::TornDown);
    }

    #[test]
    fn test_teardown_returns_region() {
        let mut mem = vec![0u8; 32 * 1024];
        let ptr = mem.as_ptr();
        let ctx = Context::new(&mut mem, &stdlib(), BufferSink::new(), HostConfig::default()).unwrap();
        let region = ctx.teardown();
        assert_eq!(region.len(), 32 * 1024);
        assert_eq!(region.as_ptr(), ptr);
    }
}
