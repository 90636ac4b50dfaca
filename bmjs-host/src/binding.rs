//! Native binding table.
//!
//! A binding maps a global name (a dotted path such as `console.log` is
//! allowed) to a host function. The table is validated and installed once
//! when the context is created and cannot change afterwards. At run time the
//! engine calls back through [`Dispatch`], which looks the function up by the
//! index it was installed under.

use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;

use bmjs_engine::{ErrorKind, Host, JsResult, Realm, Value};

use crate::config::HostConfig;
use crate::error::ContextError;
use crate::sink::OutputSink;

/// Host function signature.
pub type NativeFn<S> = fn(&mut NativeCx<'_, '_, S>, Value, &[Value]) -> JsResult<Value>;

/// A named host function.
pub struct Binding<S> {
    pub name: &'static str,
    pub func: NativeFn<S>,
}

impl<S> Binding<S> {
    pub const fn new(name: &'static str, func: NativeFn<S>) -> Self {
        Self { name, func }
    }
}

impl<S> Clone for Binding<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for Binding<S> {}

impl<S> core::fmt::Debug for Binding<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binding").field("name", &self.name).finish()
    }
}

/// What a host function can reach while it runs.
pub struct NativeCx<'c, 'a, S> {
    /// The calling realm: rendering, throwing, collection requests.
    pub realm: &'c mut Realm<'a>,
    /// The output device.
    pub sink: &'c mut S,
    pub config: &'c HostConfig,
    timers: &'c mut u32,
}

impl<S> NativeCx<'_, '_, S> {
    /// Next inert timer identifier, starting from 1.
    pub fn next_timer_id(&mut self) -> u32 {
        *self.timers = self.timers.wrapping_add(1).max(1);
        *self.timers
    }
}

/// Validated, immutable set of bindings.
pub struct BindingTable<S> {
    bindings: Vec<Binding<S>>,
}

impl<S> BindingTable<S> {
    /// Check names and build the table.
    pub fn new(bindings: &[Binding<S>]) -> Result<Self, ContextError> {
        let mut seen = HashSet::with_capacity(bindings.len());
        for binding in bindings {
            if !is_valid_name(binding.name) {
                return Err(ContextError::InvalidBindingName(String::from(binding.name)));
            }
            if !seen.insert(binding.name) {
                return Err(ContextError::DuplicateBinding(String::from(binding.name)));
            }
        }
        Ok(Self {
            bindings: bindings.to_vec(),
        })
    }

    /// Define every binding on the realm's global object.
    pub fn install(&self, realm: &mut Realm<'_>) -> Result<(), ContextError> {
        for (id, binding) in self.bindings.iter().enumerate() {
            realm.define_native(binding.name, id as u32)?;
        }
        log::debug!("[bmjs] installed {} host bindings", self.bindings.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Installed names, in installation order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bindings.iter().map(|b| b.name)
    }

    fn get(&self, id: u32) -> Option<Binding<S>> {
        self.bindings.get(id as usize).copied()
    }
}

/// `a`, `a.b`, `console.log`: identifier segments joined by dots.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.split('.').all(is_identifier)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Routes engine callbacks to the binding table for one evaluation.
pub(crate) struct Dispatch<'c, S> {
    pub(crate) table: &'c BindingTable<S>,
    pub(crate) sink: &'c mut S,
    pub(crate) config: &'c HostConfig,
    pub(crate) timers: &'c mut u32,
}

impl<S: OutputSink> Host for Dispatch<'_, S> {
    fn call_native(
        &mut self,
        realm: &mut Realm<'_>,
        id: u32,
        this: Value,
        args: &[Value],
    ) -> JsResult<Value> {
        let binding = match self.table.get(id) {
            Some(binding) => binding,
            None => {
                return Err(realm.throw_error(ErrorKind::InternalError, "unknown host function"))
            }
        };
        let mut cx = NativeCx {
            realm,
            sink: &mut *self.sink,
            config: self.config,
            timers: &mut *self.timers,
        };
        (binding.func)(&mut cx, this, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;

    fn nop(_cx: &mut NativeCx<'_, '_, BufferSink>, _this: Value, _args: &[Value]) -> JsResult<Value> {
        Ok(Value::Undefined)
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("print"));
        assert!(is_valid_name("console.log"));
        assert!(is_valid_name("$_a1.b2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("console."));
        assert!(!is_valid_name(".log"));
        assert!(!is_valid_name("1st"));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_duplicate_rejected() {
        let bindings = [Binding::new("print", nop), Binding::new("print", nop)];
        assert_eq!(
            BindingTable::new(&bindings).err(),
            Some(ContextError::DuplicateBinding("print".into()))
        );
    }

    #[test]
    fn test_invalid_rejected() {
        let bindings = [Binding::new("console..log", nop)];
        assert!(matches!(
            BindingTable::new(&bindings),
            Err(ContextError::InvalidBindingName(_))
        ));
    }

    #[test]
    fn test_names_in_order() {
        let bindings = [Binding::new("b", nop), Binding::new("a.c", nop)];
        let table = BindingTable::new(&bindings).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.names().collect::<Vec<_>>(), ["b", "a.c"]);
    }
}
