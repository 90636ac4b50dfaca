//! Value rendering.
//!
//! Produces the text `String(value)` would: numbers in shortest round-trip
//! form, errors as `Name: message`, script functions as their source text
//! and host functions as a `[native code]` stub.
//!
//! Rendering itself never allocates. [`Realm::render_pinned`] measures first
//! and then writes into one block carved from the top of the arena;
//! `render_to_string` does the same with a record at the end of the heap.

use alloc::string::String;
use core::fmt::{self, Write};

use crate::arena::Reserve;
use crate::error::JsResult;
use crate::heap::{Class, HeapView, NIL};
use crate::realm::{LoadedProgram, Realm};
use crate::value::{write_number, ObjRef, StrRef, Value};

/// Renders values from a heap view.
pub(crate) struct Renderer<'r> {
    view: HeapView<'r>,
    programs: &'r [Option<LoadedProgram>],
}

impl<'r> Renderer<'r> {
    pub(crate) fn new(view: HeapView<'r>, programs: &'r [Option<LoadedProgram>]) -> Self {
        Renderer { view, programs }
    }

    pub(crate) fn write(&self, value: Value, out: &mut dyn Write) -> fmt::Result {
        match value {
            Value::Undefined => out.write_str("undefined"),
            Value::Null => out.write_str("null"),
            Value::Bool(true) => out.write_str("true"),
            Value::Bool(false) => out.write_str("false"),
            Value::Int(i) => write!(out, "{}", i),
            Value::Float(f) => write_number(out, f),
            Value::String(s) => write_bytes(self.view.string_bytes(s), out),
            Value::Object(o) | Value::Function(o) => self.write_object(o, out),
        }
    }

    fn write_object(&self, o: ObjRef, out: &mut dyn Write) -> fmt::Result {
        match self.view.class(o) {
            Some(Class::Error) => self.write_error(o, out),
            Some(Class::Closure) => {
                let slot = self.view.data(o, 0) as usize;
                let id = self.view.data(o, 1);
                match self.programs.get(slot).and_then(Option::as_ref) {
                    Some(program) => out.write_str(program.code.function_source(id)),
                    None => out.write_str("function () {\n    [code unavailable]\n}"),
                }
            }
            Some(Class::Native) | Some(Class::Intrinsic) => {
                out.write_str("function ")?;
                write_bytes(self.view.string_bytes(StrRef(self.view.data(o, 1))), out)?;
                out.write_str("() {\n    [native code]\n}")
            }
            _ => out.write_str("[object Object]"),
        }
    }

    /// `name: message`, or whichever of the two is non-empty.
    fn write_error(&self, o: ObjRef, out: &mut dyn Write) -> fmt::Result {
        let name = self.view.get(o, b"name").unwrap_or_default();
        let message = self.view.get(o, b"message").unwrap_or_default();
        let has_name = !self.is_empty_text(name);
        let has_message = !self.is_empty_text(message);

        if has_name {
            self.write_field(name, out)?;
        }
        if has_name && has_message {
            out.write_str(": ")?;
        }
        if has_message {
            self.write_field(message, out)?;
        }
        Ok(())
    }

    fn is_empty_text(&self, value: Value) -> bool {
        match value {
            Value::Undefined => true,
            Value::String(s) => self.view.string_bytes(s).is_empty(),
            _ => false,
        }
    }

    fn write_field(&self, value: Value, out: &mut dyn Write) -> fmt::Result {
        match value {
            Value::Object(_) | Value::Function(_) => out.write_str("[object Object]"),
            other => self.write(other, out),
        }
    }
}

fn write_bytes(bytes: &[u8], out: &mut dyn Write) -> fmt::Result {
    match core::str::from_utf8(bytes) {
        Ok(text) => out.write_str(text),
        Err(_) => out.write_str(&String::from_utf8_lossy(bytes)),
    }
}

/// Longest text `render_to_string` stages on the stack.
const SHORT_TEXT: usize = 48;

/// Counts rendered bytes.
struct ByteCounter(usize);

impl Write for ByteCounter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Writes into a fixed slice.
struct SliceWriter<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.pos + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.pos..end].copy_from_slice(s.as_bytes());
        self.pos = end;
        Ok(())
    }
}

impl<'a> Realm<'a> {
    /// Write the text form of `value`.
    pub fn render(&self, value: Value, out: &mut dyn Write) -> fmt::Result {
        Renderer::new(self.heap.view(), &self.programs).write(value, out)
    }

    /// Render `value` into a block pinned at the top of the arena.
    ///
    /// The block is never freed or moved before teardown. Throws
    /// `InternalError: out of memory` when it does not fit.
    pub fn render_pinned(&mut self, value: Value, reserve: Reserve) -> JsResult<&[u8]> {
        let mut counter = ByteCounter(0);
        self.render(value, &mut counter).ok();
        let len = counter.0;

        let offset = match self.heap.arena_mut().alloc_high(len, reserve) {
            Ok(offset) => offset,
            Err(_) => return Err(self.throw_out_of_memory()),
        };

        let programs = &self.programs;
        if let Some((heap, block)) = self.heap.arena_mut().split_at_low(offset, len) {
            let mut writer = SliceWriter { buf: block, pos: 0 };
            Renderer::new(HeapView::new(heap), programs)
                .write(value, &mut writer)
                .ok();
        }
        log::trace!("[bmjs] pinned {} bytes of text", len);

        Ok(self.heap.arena().bytes(offset, len).unwrap_or(&[]))
    }

    /// Render into a newly allocated heap string.
    ///
    /// Short text goes through a stack buffer. Longer text is measured and
    /// then written straight into a record at the end of the heap.
    pub(crate) fn render_to_string(&mut self, value: Value) -> JsResult<StrRef> {
        if let Value::String(s) = value {
            return Ok(s);
        }
        let mut counter = ByteCounter(0);
        self.render(value, &mut counter).ok();
        let len = counter.0;

        let allocated = if len <= SHORT_TEXT {
            let mut buf = [0u8; SHORT_TEXT];
            let mut writer = SliceWriter {
                buf: &mut buf[..len],
                pos: 0,
            };
            self.render(value, &mut writer).ok();
            self.heap.new_string(&buf[..len], Reserve::Normal)
        } else {
            let programs = &self.programs;
            self.heap.new_string_with(len, Reserve::Normal, |view, dst| {
                let mut writer = SliceWriter { buf: dst, pos: 0 };
                Renderer::new(view, programs).write(value, &mut writer).ok();
            })
        };
        match allocated {
            Ok(s) => Ok(s),
            Err(_) => Err(self.throw_out_of_memory()),
        }
    }
}

/// Handle used where no string exists.
pub(crate) const NO_STRING: StrRef = StrRef(NIL);
