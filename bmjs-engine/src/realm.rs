//! Realm: one interpreter instance over one arena.
//!
//! The realm owns the heap, the global scope, the loaded programs and the
//! pending-exception slot. Hosts drive it through [`Realm::eval`] and supply
//! native functions through the [`Host`] trait.

use alloc::format;
use alloc::rc::Rc;
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;

use crate::arena::{Arena, ArenaStats, OutOfMemory, Reserve};
use crate::ast::Program;
use crate::error::{DefineError, ErrorKind, Exception, JsResult};
use crate::heap::{Class, GcStats, Heap, PROP_CONST};
use crate::interpreter::Interpreter;
use crate::parser;
use crate::value::{ObjRef, StrRef, Value};

/// Realm configuration.
#[derive(Debug, Clone, Copy)]
pub struct RealmConfig {
    /// Maximum nesting of function calls.
    pub max_call_depth: usize,
    /// Heap bytes allocated between automatic collections.
    pub gc_threshold: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 100,
            gc_threshold: 8 * 1024,
        }
    }
}

bitflags! {
    /// Evaluation mode flags. Only the empty set (a plain script) is
    /// supported.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EvalFlags: u32 {
        /// Evaluate as an ES module.
        const MODULE = 1 << 0;
        /// Parse as JSON.
        const JSON = 1 << 1;
    }
}

/// Native function dispatch supplied by the embedder.
pub trait Host {
    /// Run the host function registered under `id`.
    fn call_native(
        &mut self,
        realm: &mut Realm<'_>,
        id: u32,
        this: Value,
        args: &[Value],
    ) -> JsResult<Value>;
}

/// Fixed strings the engine needs at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Name {
    This,
    Length,
    Message,
    Name,
    Prototype,
    Empty,
    Undefined,
    Object,
    Boolean,
    Number,
    String,
    Function,
}

const NAME_TEXT: [&str; 12] = [
    "this",
    "length",
    "message",
    "name",
    "prototype",
    "",
    "undefined",
    "object",
    "boolean",
    "number",
    "string",
    "function",
];

/// Built-in functions implemented by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intrinsic {
    /// One of the error constructors.
    Error(ErrorKind),
    /// `String(value)`
    String,
    /// `Number(value)`
    Number,
}

impl Intrinsic {
    pub(crate) fn id(self) -> u32 {
        match self {
            Intrinsic::Error(kind) => kind.index() as u32,
            Intrinsic::String => 6,
            Intrinsic::Number => 7,
        }
    }

    pub(crate) fn from_id(id: u32) -> Option<Intrinsic> {
        match id {
            0..=5 => Some(Intrinsic::Error(ErrorKind::from_index(id))),
            6 => Some(Intrinsic::String),
            7 => Some(Intrinsic::Number),
            _ => None,
        }
    }

    fn global_name(self) -> &'static str {
        match self {
            Intrinsic::Error(kind) => kind.name(),
            Intrinsic::String => "String",
            Intrinsic::Number => "Number",
        }
    }
}

/// A parsed program and its atoms interned in the heap.
pub(crate) struct LoadedProgram {
    pub(crate) code: Rc<Program>,
    pub(crate) atoms: Vec<StrRef>,
}

/// Interpreter instance over one arena.
pub struct Realm<'a> {
    pub(crate) heap: Heap<'a>,
    pub(crate) programs: Vec<Option<LoadedProgram>>,
    pub(crate) global: ObjRef,
    names: [StrRef; 12],
    protos: [ObjRef; 6],
    oom_error: ObjRef,
    exception: Option<Value>,
    current: Option<usize>,
    gc_requested: bool,
    pub(crate) config: RealmConfig,
}

impl<'a> Realm<'a> {
    /// Create a realm with the engine intrinsics installed.
    pub fn new(arena: Arena<'a>, config: RealmConfig) -> Result<Self, OutOfMemory> {
        let mut heap = Heap::new(arena);

        let mut names = [StrRef(0); 12];
        for (slot, text) in names.iter_mut().zip(NAME_TEXT.iter()) {
            *slot = heap.new_string(text.as_bytes(), Reserve::Normal)?;
        }

        let global = heap.new_object(Class::Scope, None, [1, 0, 0], Reserve::Normal)?;

        let mut protos = [ObjRef(0); 6];
        for kind in ErrorKind::ALL {
            let parent = match kind {
                ErrorKind::Error => None,
                _ => Some(protos[ErrorKind::Error.index()]),
            };
            let proto = heap.new_object(Class::Plain, parent, [0; 3], Reserve::Normal)?;
            let name = heap.new_string(kind.name().as_bytes(), Reserve::Normal)?;
            heap.set_property(proto, names[Name::Name as usize], Value::String(name), 0, Reserve::Normal)?;
            heap.set_property(
                proto,
                names[Name::Message as usize],
                Value::String(names[Name::Empty as usize]),
                0,
                Reserve::Normal,
            )?;
            protos[kind.index()] = proto;
        }

        // Raised when the arena runs out, so it must exist beforehand.
        let oom_error = heap.new_object(
            Class::Error,
            Some(protos[ErrorKind::InternalError.index()]),
            [ErrorKind::InternalError.index() as u32, 0, 0],
            Reserve::Normal,
        )?;
        let oom_message = heap.new_string(b"out of memory", Reserve::Normal)?;
        heap.set_property(
            oom_error,
            names[Name::Message as usize],
            Value::String(oom_message),
            0,
            Reserve::Normal,
        )?;

        let mut realm = Realm {
            heap,
            programs: Vec::new(),
            global,
            names,
            protos,
            oom_error,
            exception: None,
            current: None,
            gc_requested: false,
            config,
        };

        realm.define_value("undefined", Value::Undefined, PROP_CONST)?;
        realm.define_value("NaN", Value::Float(f64::NAN), PROP_CONST)?;
        realm.define_value("Infinity", Value::Float(f64::INFINITY), PROP_CONST)?;
        realm.define_value("globalThis", Value::Object(global), 0)?;

        let mut intrinsics = Vec::new();
        for kind in ErrorKind::ALL {
            intrinsics.push(Intrinsic::Error(kind));
        }
        intrinsics.push(Intrinsic::String);
        intrinsics.push(Intrinsic::Number);
        for intrinsic in intrinsics {
            let name = realm.heap.new_string(intrinsic.global_name().as_bytes(), Reserve::Normal)?;
            let func = realm.heap.new_object(
                Class::Intrinsic,
                None,
                [intrinsic.id(), name.0, 0],
                Reserve::Normal,
            )?;
            if let Intrinsic::Error(kind) = intrinsic {
                let proto = realm.protos[kind.index()];
                let key = realm.name(Name::Prototype);
                realm.heap.set_property(func, key, Value::Object(proto), 0, Reserve::Normal)?;
            }
            realm.heap.set_property(global, name, Value::Function(func), 0, Reserve::Normal)?;
        }

        log::debug!(
            "[bmjs] realm ready, {} bytes of intrinsics",
            realm.heap.stats().heap_bytes
        );
        Ok(realm)
    }

    fn define_value(&mut self, name: &str, value: Value, flags: u32) -> Result<(), OutOfMemory> {
        let key = self.heap.new_string(name.as_bytes(), Reserve::Normal)?;
        self.heap.set_property(self.global, key, value, flags, Reserve::Normal)?;
        Ok(())
    }

    pub(crate) fn name(&self, name: Name) -> StrRef {
        self.names[name as usize]
    }

    pub(crate) fn error_proto(&self, kind: ErrorKind) -> ObjRef {
        self.protos[kind.index()]
    }

    /// The global object.
    pub fn global(&self) -> Value {
        Value::Object(self.global)
    }

    /// Parse and run `source` as a script.
    ///
    /// Returns the value of the last expression statement executed at top
    /// level, or `undefined`. On failure the thrown value is available from
    /// [`Realm::exception`] until the next evaluation.
    pub fn eval(
        &mut self,
        host: &mut dyn Host,
        source: &[u8],
        name: &str,
        flags: EvalFlags,
    ) -> JsResult<Value> {
        if self.current.is_some() {
            return Err(self.throw_error(ErrorKind::InternalError, "evaluation already in progress"));
        }
        self.exception = None;
        if !flags.is_empty() {
            return Err(self.throw_error(ErrorKind::TypeError, "unsupported evaluation flags"));
        }

        // Evaluation entry is a safe point.
        self.maybe_collect(&[]);

        let text = match core::str::from_utf8(source) {
            Ok(text) => text,
            Err(err) => {
                let message = format!("invalid UTF-8 at byte {} of {}", err.valid_up_to(), name);
                return Err(self.throw_error(ErrorKind::SyntaxError, &message));
            }
        };

        let program = match parser::parse(text, name) {
            Ok(program) => program,
            Err(err) => {
                let message = format!("{} at {}:{}:{}", err.message, name, err.line, err.column);
                log::debug!("[bmjs] {}: SyntaxError: {}", name, message);
                return Err(self.throw_error(ErrorKind::SyntaxError, &message));
            }
        };

        let (slot, code) = self.load(program)?;
        log::debug!("[bmjs] eval {} ({} bytes, slot {})", name, source.len(), slot);
        self.current = Some(slot);
        let result = Interpreter::new(self, host, slot, code).run_program();
        self.current = None;
        result
    }

    /// Intern a program's atoms and store it in a free slot.
    fn load(&mut self, program: Program) -> JsResult<(usize, Rc<Program>)> {
        let mut atoms = Vec::with_capacity(program.atoms.len());
        for text in &program.atoms {
            match self.heap.new_string(text.as_bytes(), Reserve::Normal) {
                Ok(s) => atoms.push(s),
                Err(_) => return Err(self.throw_out_of_memory()),
            }
        }

        let code = Rc::new(program);
        let loaded = LoadedProgram {
            code: code.clone(),
            atoms,
        };
        let slot = match self.programs.iter().position(Option::is_none) {
            Some(slot) => {
                self.programs[slot] = Some(loaded);
                slot
            }
            None => {
                self.programs.push(Some(loaded));
                self.programs.len() - 1
            }
        };
        Ok((slot, code))
    }

    /// Install a host function at a dotted path such as `console.log`.
    /// Missing intermediate objects are created.
    pub fn define_native(&mut self, path: &str, id: u32) -> Result<(), DefineError> {
        let mut holder = self.global;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let key = self.heap.new_string(segment.as_bytes(), Reserve::Normal)?;
            if segments.peek().is_none() {
                let func = self.heap.new_object(Class::Native, None, [id, key.0, 0], Reserve::Normal)?;
                self.heap.set_property(holder, key, Value::Function(func), 0, Reserve::Normal)?;
                break;
            }

            let existing = self.heap.view().find_own(holder, segment.as_bytes());
            holder = match existing.map(|p| self.heap.view().prop_value(p)) {
                Some(Value::Object(o)) | Some(Value::Function(o)) => o,
                Some(_) => return Err(DefineError::NotAnObject(segment.into())),
                None => {
                    let object = self.heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal)?;
                    self.heap.set_property(holder, key, Value::Object(object), 0, Reserve::Normal)?;
                    object
                }
            };
        }
        Ok(())
    }

    /// Make `value` the pending exception.
    pub fn throw(&mut self, value: Value) -> Exception {
        self.exception = Some(value);
        Exception
    }

    /// Throw a new error object of the given kind.
    pub fn throw_error(&mut self, kind: ErrorKind, message: &str) -> Exception {
        match self.new_error(kind, message) {
            Ok(error) => self.throw(error),
            Err(_) => self.throw_out_of_memory(),
        }
    }

    /// Throw the preallocated `InternalError: out of memory`.
    pub fn throw_out_of_memory(&mut self) -> Exception {
        log::warn!(
            "[bmjs] out of memory ({} bytes free)",
            self.heap.stats().free
        );
        self.throw(Value::Object(self.oom_error))
    }

    pub(crate) fn new_error(&mut self, kind: ErrorKind, message: &str) -> Result<Value, OutOfMemory> {
        let proto = self.error_proto(kind);
        let error = self.heap.new_object(
            Class::Error,
            Some(proto),
            [kind.index() as u32, 0, 0],
            Reserve::Normal,
        )?;
        if !message.is_empty() {
            let text = self.heap.new_string(message.as_bytes(), Reserve::Normal)?;
            let key = self.name(Name::Message);
            self.heap.set_property(error, key, Value::String(text), 0, Reserve::Normal)?;
        }
        Ok(Value::Object(error))
    }

    /// The pending exception, if any.
    pub fn exception(&self) -> Option<Value> {
        self.exception
    }

    /// Remove and return the pending exception.
    pub fn take_exception(&mut self) -> Option<Value> {
        self.exception.take()
    }

    /// Discard the pending exception.
    pub fn clear_exception(&mut self) {
        self.exception = None;
    }

    /// Bytes of a string value. Valid until the next allocation.
    pub fn string_bytes(&self, s: StrRef) -> &[u8] {
        self.heap.view().string_bytes(s)
    }

    /// Allocate a string value, throwing on exhaustion.
    pub fn new_string(&mut self, text: &str) -> JsResult<Value> {
        match self.heap.new_string(text.as_bytes(), Reserve::Normal) {
            Ok(s) => Ok(Value::String(s)),
            Err(_) => Err(self.throw_out_of_memory()),
        }
    }

    /// Property lookup along the prototype chain.
    pub fn get(&self, object: Value, key: &str) -> Value {
        match object.as_object() {
            Some(o) => self.heap.view().get(o, key.as_bytes()).unwrap_or_default(),
            None => Value::Undefined,
        }
    }

    /// Numeric conversion (`Number(value)`).
    pub fn to_number(&self, value: Value) -> f64 {
        match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => b as u8 as f64,
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            Value::String(s) => match core::str::from_utf8(self.string_bytes(s)) {
                Ok(text) => crate::value::parse_number(text),
                Err(_) => f64::NAN,
            },
            Value::Object(_) | Value::Function(_) => f64::NAN,
        }
    }

    /// Boolean conversion.
    pub fn truthy(&self, value: Value) -> bool {
        match value {
            Value::String(s) => !self.string_bytes(s).is_empty(),
            other => other.primitive_truthy(),
        }
    }

    /// Check if a value can be called.
    pub fn is_callable(&self, value: Value) -> bool {
        match value {
            Value::Function(f) => matches!(
                self.heap.view().class(f),
                Some(Class::Closure) | Some(Class::Native) | Some(Class::Intrinsic)
            ),
            _ => false,
        }
    }

    /// Ask for a collection at the next safe point.
    pub fn request_gc(&mut self) {
        self.gc_requested = true;
    }

    /// Check if a collection has been requested.
    pub fn gc_requested(&self) -> bool {
        self.gc_requested
    }

    /// Arena usage.
    pub fn stats(&self) -> ArenaStats {
        self.heap.stats()
    }

    /// Number of programs whose code is still reachable.
    pub fn loaded_programs(&self) -> usize {
        self.programs.iter().filter(|p| p.is_some()).count()
    }

    /// Collect garbage now. Every value handle not reachable from the
    /// global object becomes invalid.
    ///
    /// While a script is running (a native function calling back in) this
    /// only requests a collection for the next safe point and returns empty
    /// stats, since the interpreter's frames are not visible from here.
    pub fn collect(&mut self) -> GcStats {
        if self.current.is_some() {
            self.request_gc();
            return GcStats::default();
        }
        self.collect_with(&[])
    }

    /// Check if a script is running.
    pub fn is_evaluating(&self) -> bool {
        self.current.is_some()
    }

    /// Collect if requested or if enough has been allocated since the last
    /// collection.
    pub(crate) fn maybe_collect(&mut self, roots: &[Value]) {
        if self.gc_requested || self.heap.allocated_since_gc() >= self.config.gc_threshold {
            self.collect_with(roots);
        }
    }

    pub(crate) fn collect_with(&mut self, roots: &[Value]) -> GcStats {
        let heap = &mut self.heap;
        heap.shade_ref(self.global.0);
        heap.shade_ref(self.oom_error.0);
        for name in &self.names {
            heap.shade_ref(name.0);
        }
        for proto in &self.protos {
            heap.shade_ref(proto.0);
        }
        if let Some(exception) = self.exception {
            heap.shade(exception);
        }
        for root in roots {
            heap.shade(*root);
        }

        // Closures keep their program alive, and a live program keeps its
        // atoms alive. Iterate until no new program is reached.
        let mut live = vec![false; self.programs.len()];
        let mut reached: Vec<usize> = self.current.into_iter().collect();
        loop {
            while let Some(slot) = reached.pop() {
                if slot >= live.len() || live[slot] {
                    continue;
                }
                live[slot] = true;
                if let Some(program) = &self.programs[slot] {
                    for atom in &program.atoms {
                        heap.shade_ref(atom.0);
                    }
                }
            }
            heap.trace(&mut |slot| reached.push(slot as usize));
            if reached.is_empty() {
                break;
            }
        }

        let stats = heap.sweep();
        for (slot, live) in live.iter().enumerate() {
            if !live {
                self.programs[slot] = None;
            }
        }
        self.gc_requested = false;

        log::trace!(
            "[bmjs gc] freed {} bytes, {} live, {} programs",
            stats.freed,
            stats.live,
            self.loaded_programs()
        );
        stats
    }

    /// Release the realm and return its arena.
    pub fn into_arena(self) -> Arena<'a> {
        self.heap.into_arena()
    }
}
