//! Heap records and the mark-sweep collector.
//!
//! Every script-visible datum lives in a record carved from the low end of
//! the [`Arena`]. Records are laid out back to back, each starting with an
//! 8-byte header:
//!
//! ```text
//! [size: u32][tag: u8][mark: u8][reserved: u16]
//! ```
//!
//! `size` covers the header and is a multiple of 8, so the heap can be
//! walked linearly. Freed records are coalesced into a first-fit free list.
//!
//! The collector is non-moving. Marking is tri-colour and uses no memory
//! outside the arena: gray records are found by rescanning the heap from the
//! lowest gray offset, so marking works even when the arena is full.
//!
//! All reads are bounds-checked. A stale or corrupt handle yields empty or
//! `undefined` data, never a fault.

use crate::arena::{align_up, Arena, ArenaStats, OutOfMemory, Reserve};
use crate::value::{ObjRef, StrRef, Value};

/// Null record pointer.
pub(crate) const NIL: u32 = u32::MAX;

const HEADER: usize = 8;
const MIN_RECORD: usize = 16;

const TAG_FREE: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_OBJECT: u8 = 2;
const TAG_PROPERTY: u8 = 3;

const WHITE: u8 = 0;
const GRAY: u8 = 1;
const BLACK: u8 = 2;

// Object record layout.
const OBJ_CLASS: usize = 8;
const OBJ_PROTO: usize = 12;
const OBJ_PROPS: usize = 16;
const OBJ_DATA: usize = 20;
const OBJ_SIZE: usize = 32;

// Property record layout.
const PROP_KEY: usize = 8;
const PROP_NEXT: usize = 12;
const PROP_FLAGS: usize = 16;
const PROP_VALUE: usize = 20;
const PROP_SIZE: usize = 32;

// String record layout.
const STR_LEN: usize = 8;
const STR_BYTES: usize = 12;

// Free record layout.
const FREE_NEXT: usize = 8;

/// Property flag: binding cannot be reassigned.
pub(crate) const PROP_CONST: u32 = 1;

// Encoded value tags.
const VAL_UNDEFINED: u32 = 0;
const VAL_NULL: u32 = 1;
const VAL_BOOL: u32 = 2;
const VAL_INT: u32 = 3;
const VAL_FLOAT: u32 = 4;
const VAL_STRING: u32 = 5;
const VAL_OBJECT: u32 = 6;
const VAL_FUNCTION: u32 = 7;

/// Upper bound on prototype chain walks.
const MAX_CHAIN: usize = 4096;

/// Object classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    /// `{}` and intermediate namespace objects.
    Plain = 0,
    /// Error instance. data0 = [`crate::ErrorKind`] index.
    Error = 1,
    /// Script function. data0 = program slot, data1 = function index,
    /// data2 = captured scope.
    Closure = 2,
    /// Host function. data0 = host id, data1 = name string.
    Native = 3,
    /// Engine built-in. data0 = intrinsic id, data1 = name string.
    Intrinsic = 4,
    /// Variable scope. proto = parent scope, data0 = 1 for function scopes.
    Scope = 5,
}

impl Class {
    fn from_u8(v: u8) -> Option<Class> {
        Some(match v {
            0 => Class::Plain,
            1 => Class::Error,
            2 => Class::Closure,
            3 => Class::Native,
            4 => Class::Intrinsic,
            5 => Class::Scope,
            _ => return None,
        })
    }
}

fn encode(value: Value) -> (u32, [u8; 8]) {
    let mut payload = [0u8; 8];
    let tag = match value {
        Value::Undefined => VAL_UNDEFINED,
        Value::Null => VAL_NULL,
        Value::Bool(b) => {
            payload[0] = b as u8;
            VAL_BOOL
        }
        Value::Int(i) => {
            payload[..4].copy_from_slice(&i.to_le_bytes());
            VAL_INT
        }
        Value::Float(f) => {
            payload = f.to_bits().to_le_bytes();
            VAL_FLOAT
        }
        Value::String(s) => {
            payload[..4].copy_from_slice(&s.0.to_le_bytes());
            VAL_STRING
        }
        Value::Object(o) => {
            payload[..4].copy_from_slice(&o.0.to_le_bytes());
            VAL_OBJECT
        }
        Value::Function(o) => {
            payload[..4].copy_from_slice(&o.0.to_le_bytes());
            VAL_FUNCTION
        }
    };
    (tag, payload)
}

fn decode(tag: u32, p: [u8; 8]) -> Value {
    let low = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
    match tag {
        VAL_NULL => Value::Null,
        VAL_BOOL => Value::Bool(p[0] != 0),
        VAL_INT => Value::Int(low as i32),
        VAL_FLOAT => Value::Float(f64::from_bits(u64::from_le_bytes(p))),
        VAL_STRING => Value::String(StrRef(low)),
        VAL_OBJECT => Value::Object(ObjRef(low)),
        VAL_FUNCTION => Value::Function(ObjRef(low)),
        _ => Value::Undefined,
    }
}

/// Read-only view of the heap region.
#[derive(Clone, Copy)]
pub(crate) struct HeapView<'m> {
    mem: &'m [u8],
}

impl<'m> HeapView<'m> {
    pub(crate) fn new(mem: &'m [u8]) -> Self {
        HeapView { mem }
    }

    fn u8_at(&self, off: usize) -> u8 {
        self.mem.get(off).copied().unwrap_or(0)
    }

    fn u32_at(&self, off: usize) -> u32 {
        match off.checked_add(4).and_then(|end| self.mem.get(off..end)) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => NIL,
        }
    }

    fn value_at(&self, off: usize) -> Value {
        let tag = self.u32_at(off);
        match off.checked_add(12).and_then(|end| self.mem.get(off + 4..end)) {
            Some(b) => {
                let mut p = [0u8; 8];
                p.copy_from_slice(b);
                decode(tag, p)
            }
            None => Value::Undefined,
        }
    }

    fn tag(&self, rec: u32) -> u8 {
        self.u8_at(rec as usize + 4)
    }

    fn is(&self, rec: u32, tag: u8) -> bool {
        rec != NIL
            && (rec as usize)
                .checked_add(HEADER)
                .map_or(false, |end| end <= self.mem.len())
            && self.tag(rec) == tag
    }

    /// Bytes of a string record.
    pub(crate) fn string_bytes(&self, s: StrRef) -> &'m [u8] {
        if !self.is(s.0, TAG_STRING) {
            return &[];
        }
        let base = s.0 as usize;
        let len = self.u32_at(base + STR_LEN) as usize;
        let start = base + STR_BYTES;
        start
            .checked_add(len)
            .and_then(|end| self.mem.get(start..end))
            .unwrap_or(&[])
    }

    pub(crate) fn class(&self, o: ObjRef) -> Option<Class> {
        if !self.is(o.0, TAG_OBJECT) {
            return None;
        }
        Class::from_u8(self.u8_at(o.0 as usize + OBJ_CLASS))
    }

    pub(crate) fn proto(&self, o: ObjRef) -> Option<ObjRef> {
        if !self.is(o.0, TAG_OBJECT) {
            return None;
        }
        match self.u32_at(o.0 as usize + OBJ_PROTO) {
            NIL => None,
            p => Some(ObjRef(p)),
        }
    }

    pub(crate) fn data(&self, o: ObjRef, index: usize) -> u32 {
        if !self.is(o.0, TAG_OBJECT) || index > 2 {
            return NIL;
        }
        self.u32_at(o.0 as usize + OBJ_DATA + 4 * index)
    }

    pub(crate) fn prop_value(&self, p: u32) -> Value {
        if !self.is(p, TAG_PROPERTY) {
            return Value::Undefined;
        }
        self.value_at(p as usize + PROP_VALUE)
    }

    pub(crate) fn prop_flags(&self, p: u32) -> u32 {
        if !self.is(p, TAG_PROPERTY) {
            return 0;
        }
        self.u32_at(p as usize + PROP_FLAGS)
    }

    /// Own property record with the given key.
    pub(crate) fn find_own(&self, o: ObjRef, key: &[u8]) -> Option<u32> {
        if !self.is(o.0, TAG_OBJECT) {
            return None;
        }
        let mut p = self.u32_at(o.0 as usize + OBJ_PROPS);
        let mut steps = 0;
        while self.is(p, TAG_PROPERTY) && steps < self.mem.len() / PROP_SIZE + 1 {
            let k = StrRef(self.u32_at(p as usize + PROP_KEY));
            if self.string_bytes(k) == key {
                return Some(p);
            }
            p = self.u32_at(p as usize + PROP_NEXT);
            steps += 1;
        }
        None
    }

    /// Property lookup along the prototype chain. Returns the holder and
    /// the property record.
    pub(crate) fn lookup(&self, o: ObjRef, key: &[u8]) -> Option<(ObjRef, u32)> {
        let mut cur = Some(o);
        let mut hops = 0;
        while let Some(obj) = cur {
            if let Some(p) = self.find_own(obj, key) {
                return Some((obj, p));
            }
            hops += 1;
            if hops > MAX_CHAIN {
                return None;
            }
            cur = self.proto(obj);
        }
        None
    }

    /// Property value along the prototype chain.
    pub(crate) fn get(&self, o: ObjRef, key: &[u8]) -> Option<Value> {
        self.lookup(o, key).map(|(_, p)| self.prop_value(p))
    }
}

/// Counters from one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GcStats {
    /// Bytes returned to the free list.
    pub freed: usize,
    /// Bytes still held by live records.
    pub live: usize,
}

/// Record allocator and collector over an arena.
pub(crate) struct Heap<'a> {
    arena: Arena<'a>,
    free_head: u32,
    gray_floor: u32,
    since_gc: usize,
}

impl<'a> Heap<'a> {
    pub(crate) fn new(arena: Arena<'a>) -> Self {
        Heap {
            arena,
            free_head: NIL,
            gray_floor: NIL,
            since_gc: 0,
        }
    }

    pub(crate) fn view(&self) -> HeapView<'_> {
        HeapView::new(self.arena.bytes(0, self.arena.low()).unwrap_or(&[]))
    }

    pub(crate) fn stats(&self) -> ArenaStats {
        self.arena.stats()
    }

    pub(crate) fn arena(&self) -> &Arena<'a> {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena<'a> {
        &mut self.arena
    }

    pub(crate) fn into_arena(self) -> Arena<'a> {
        self.arena
    }

    /// Bytes allocated since the last collection.
    pub(crate) fn allocated_since_gc(&self) -> usize {
        self.since_gc
    }

    fn put_u8(&mut self, off: usize, v: u8) {
        if let Some(b) = self.arena.bytes_mut(off, 1) {
            b[0] = v;
        }
    }

    fn put_u32(&mut self, off: usize, v: u32) {
        if let Some(b) = self.arena.bytes_mut(off, 4) {
            b.copy_from_slice(&v.to_le_bytes());
        }
    }

    fn get_u32(&self, off: usize) -> u32 {
        self.view().u32_at(off)
    }

    fn size(&self, rec: usize) -> usize {
        match self.get_u32(rec) {
            NIL => 0,
            s => s as usize,
        }
    }

    fn write_header(&mut self, rec: usize, size: usize, tag: u8) {
        self.put_u32(rec, size as u32);
        self.put_u8(rec + 4, tag);
        self.put_u8(rec + 5, WHITE);
    }

    fn mark(&self, rec: usize) -> u8 {
        self.view().u8_at(rec + 5)
    }

    fn set_mark(&mut self, rec: usize, mark: u8) {
        self.put_u8(rec + 5, mark);
    }

    fn take_free(&mut self, size: usize) -> Option<usize> {
        let mut prev = NIL;
        let mut cur = self.free_head;
        while cur != NIL {
            let rec = cur as usize;
            let block = self.size(rec);
            let next = self.get_u32(rec + FREE_NEXT);
            if block >= size {
                let replacement = if block - size >= MIN_RECORD {
                    let rest = rec + size;
                    self.write_header(rest, block - size, TAG_FREE);
                    self.put_u32(rest + FREE_NEXT, next);
                    self.put_u32(rec, size as u32);
                    rest as u32
                } else {
                    next
                };
                if prev == NIL {
                    self.free_head = replacement;
                } else {
                    self.put_u32(prev as usize + FREE_NEXT, replacement);
                }
                return Some(rec);
            }
            prev = cur;
            cur = next;
        }
        None
    }

    /// Allocate a zeroed record of at least `size` bytes (header included).
    fn alloc(&mut self, tag: u8, size: usize, reserve: Reserve) -> Result<usize, OutOfMemory> {
        let size = align_up(size.max(MIN_RECORD));
        let rec = match self.take_free(size) {
            Some(rec) => rec,
            None => {
                let rec = self.arena.alloc_low(size, reserve)?;
                self.put_u32(rec, size as u32);
                rec
            }
        };
        let actual = self.size(rec);
        if let Some(body) = self.arena.bytes_mut(rec + HEADER, actual - HEADER) {
            body.fill(0);
        }
        self.write_header(rec, actual, tag);
        self.since_gc += actual;
        Ok(rec)
    }

    /// Allocate a string with the given contents.
    pub(crate) fn new_string(&mut self, bytes: &[u8], reserve: Reserve) -> Result<StrRef, OutOfMemory> {
        let rec = self.alloc(TAG_STRING, STR_BYTES + bytes.len(), reserve)?;
        self.put_u32(rec + STR_LEN, bytes.len() as u32);
        if let Some(dst) = self.arena.bytes_mut(rec + STR_BYTES, bytes.len()) {
            dst.copy_from_slice(bytes);
        }
        Ok(StrRef(rec as u32))
    }

    /// Allocate a `len`-byte string record past every existing record and
    /// let `fill` write its contents while reading the records below it.
    pub(crate) fn new_string_with(
        &mut self,
        len: usize,
        reserve: Reserve,
        fill: impl FnOnce(HeapView<'_>, &mut [u8]),
    ) -> Result<StrRef, OutOfMemory> {
        let size = align_up((STR_BYTES + len).max(MIN_RECORD));
        let rec = self.arena.alloc_low(size, reserve)?;
        if let Some(body) = self.arena.bytes_mut(rec + HEADER, size - HEADER) {
            body.fill(0);
        }
        self.write_header(rec, size, TAG_STRING);
        self.put_u32(rec + STR_LEN, len as u32);
        self.since_gc += size;
        if let Some((below, dst)) = self.arena.split_below(rec + STR_BYTES, len) {
            fill(HeapView::new(below), dst);
        }
        Ok(StrRef(rec as u32))
    }

    /// Allocate the concatenation of two heap strings.
    pub(crate) fn concat(&mut self, a: StrRef, b: StrRef, reserve: Reserve) -> Result<StrRef, OutOfMemory> {
        let len_a = self.view().string_bytes(a).len();
        let len_b = self.view().string_bytes(b).len();
        let rec = self.alloc(TAG_STRING, STR_BYTES + len_a + len_b, reserve)?;
        self.put_u32(rec + STR_LEN, (len_a + len_b) as u32);
        let dst = rec + STR_BYTES;
        self.arena.copy_within(a.0 as usize + STR_BYTES, len_a, dst);
        self.arena.copy_within(b.0 as usize + STR_BYTES, len_b, dst + len_a);
        Ok(StrRef(rec as u32))
    }

    /// Allocate an object record.
    pub(crate) fn new_object(
        &mut self,
        class: Class,
        proto: Option<ObjRef>,
        data: [u32; 3],
        reserve: Reserve,
    ) -> Result<ObjRef, OutOfMemory> {
        let rec = self.alloc(TAG_OBJECT, OBJ_SIZE, reserve)?;
        self.put_u8(rec + OBJ_CLASS, class as u8);
        self.put_u32(rec + OBJ_PROTO, proto.map_or(NIL, |p| p.0));
        self.put_u32(rec + OBJ_PROPS, NIL);
        for (i, d) in data.iter().enumerate() {
            self.put_u32(rec + OBJ_DATA + 4 * i, *d);
        }
        Ok(ObjRef(rec as u32))
    }

    /// Overwrite the value of a property record.
    pub(crate) fn write_prop(&mut self, p: u32, value: Value) {
        if !self.view().is(p, TAG_PROPERTY) {
            return;
        }
        let (tag, payload) = encode(value);
        let off = p as usize + PROP_VALUE;
        self.put_u32(off, tag);
        if let Some(dst) = self.arena.bytes_mut(off + 4, 8) {
            dst.copy_from_slice(&payload);
        }
    }

    /// Set an own property, creating it when absent. Existing flags are kept.
    pub(crate) fn set_property(
        &mut self,
        o: ObjRef,
        key: StrRef,
        value: Value,
        flags: u32,
        reserve: Reserve,
    ) -> Result<u32, OutOfMemory> {
        let existing = {
            let view = self.view();
            view.find_own(o, view.string_bytes(key))
        };
        if let Some(p) = existing {
            self.write_prop(p, value);
            return Ok(p);
        }
        if !self.view().is(o.0, TAG_OBJECT) {
            return Ok(NIL);
        }
        let rec = self.alloc(TAG_PROPERTY, PROP_SIZE, reserve)?;
        let head = self.get_u32(o.0 as usize + OBJ_PROPS);
        self.put_u32(rec + PROP_KEY, key.0);
        self.put_u32(rec + PROP_NEXT, head);
        self.put_u32(rec + PROP_FLAGS, flags);
        self.write_prop(rec as u32, value);
        self.put_u32(o.0 as usize + OBJ_PROPS, rec as u32);
        Ok(rec as u32)
    }

    /// Grey a record if it is still white.
    pub(crate) fn shade_ref(&mut self, rec: u32) {
        if rec == NIL {
            return;
        }
        let view = self.view();
        if rec as usize % 8 != 0 || !(view.is(rec, TAG_STRING) || view.is(rec, TAG_OBJECT) || view.is(rec, TAG_PROPERTY)) {
            return;
        }
        if self.mark(rec as usize) == WHITE {
            self.set_mark(rec as usize, GRAY);
            if self.gray_floor == NIL || rec < self.gray_floor {
                self.gray_floor = rec;
            }
        }
    }

    /// Grey the record a value refers to.
    pub(crate) fn shade(&mut self, value: Value) {
        match value {
            Value::String(s) => self.shade_ref(s.0),
            Value::Object(o) | Value::Function(o) => self.shade_ref(o.0),
            _ => {}
        }
    }

    /// Blacken every grey record and everything it reaches. `on_closure`
    /// receives the program slot of every closure that turns black.
    pub(crate) fn trace(&mut self, on_closure: &mut dyn FnMut(u32)) {
        while self.gray_floor != NIL {
            let mut off = self.gray_floor as usize;
            self.gray_floor = NIL;
            let low = self.arena.low();
            while off + HEADER <= low {
                let size = self.size(off);
                if size < MIN_RECORD || off + size > low {
                    break;
                }
                if self.mark(off) == GRAY {
                    self.set_mark(off, BLACK);
                    self.trace_record(off, on_closure);
                }
                off += size;
            }
        }
    }

    fn trace_record(&mut self, rec: usize, on_closure: &mut dyn FnMut(u32)) {
        let view = self.view();
        match view.tag(rec as u32) {
            TAG_OBJECT => {
                let o = ObjRef(rec as u32);
                let proto = view.u32_at(rec + OBJ_PROTO);
                let props = view.u32_at(rec + OBJ_PROPS);
                let class = view.class(o);
                let data0 = view.data(o, 0);
                let data1 = view.data(o, 1);
                let data2 = view.data(o, 2);
                self.shade_ref(proto);
                self.shade_ref(props);
                match class {
                    Some(Class::Closure) => {
                        self.shade_ref(data2);
                        on_closure(data0);
                    }
                    Some(Class::Native) | Some(Class::Intrinsic) => self.shade_ref(data1),
                    _ => {}
                }
            }
            TAG_PROPERTY => {
                let key = view.u32_at(rec + PROP_KEY);
                let next = view.u32_at(rec + PROP_NEXT);
                let value = view.value_at(rec + PROP_VALUE);
                self.shade_ref(key);
                self.shade_ref(next);
                self.shade(value);
            }
            _ => {}
        }
    }

    /// Free every white record, coalesce neighbours, rebuild the free list
    /// in address order and retract the low cursor over a free tail.
    pub(crate) fn sweep(&mut self) -> GcStats {
        let low = self.arena.low();
        let mut stats = GcStats::default();
        let mut off = 0usize;
        let mut run: Option<usize> = None;
        let mut tail = NIL;
        self.free_head = NIL;

        while off + HEADER <= low {
            let size = self.size(off);
            if size < MIN_RECORD || off + size > low {
                break;
            }
            let tag = self.view().tag(off as u32);
            let dead = tag == TAG_FREE || self.mark(off) == WHITE;
            if dead {
                if tag != TAG_FREE {
                    stats.freed += size;
                }
                match run {
                    Some(start) => self.put_u32(start, (off + size - start) as u32),
                    None => {
                        self.write_header(off, size, TAG_FREE);
                        run = Some(off);
                    }
                }
            } else {
                stats.live += size;
                self.set_mark(off, WHITE);
                if let Some(start) = run.take() {
                    self.link_free(start, &mut tail);
                }
            }
            off += size;
        }

        if let Some(start) = run {
            self.arena.shrink_low(start);
        }
        self.gray_floor = NIL;
        self.since_gc = 0;
        stats
    }

    fn link_free(&mut self, rec: usize, tail: &mut u32) {
        self.put_u32(rec + FREE_NEXT, NIL);
        if *tail == NIL {
            self.free_head = rec as u32;
        } else {
            self.put_u32(*tail as usize + FREE_NEXT, rec as u32);
        }
        *tail = rec as u32;
    }

    /// Total bytes on the free list.
    pub(crate) fn free_list_bytes(&self) -> usize {
        let mut total = 0;
        let mut cur = self.free_head;
        while cur != NIL {
            total += self.size(cur as usize);
            cur = self.get_u32(cur as usize + FREE_NEXT);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(buf: &mut [u8]) -> Heap<'_> {
        Heap::new(Arena::new(buf))
    }

    #[test]
    fn test_string_roundtrip() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let s = heap.new_string(b"hello", Reserve::Normal).unwrap();
        assert_eq!(heap.view().string_bytes(s), b"hello");
        let t = heap.new_string(b" world", Reserve::Normal).unwrap();
        let u = heap.concat(s, t, Reserve::Normal).unwrap();
        assert_eq!(heap.view().string_bytes(u), b"hello world");
    }

    #[test]
    fn test_properties_and_prototype_chain() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let parent = heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal).unwrap();
        let child = heap.new_object(Class::Plain, Some(parent), [0; 3], Reserve::Normal).unwrap();
        let key = heap.new_string(b"x", Reserve::Normal).unwrap();
        heap.set_property(parent, key, Value::Int(1), 0, Reserve::Normal).unwrap();
        assert_eq!(heap.view().get(child, b"x"), Some(Value::Int(1)));

        let key2 = heap.new_string(b"x", Reserve::Normal).unwrap();
        heap.set_property(child, key2, Value::Float(2.5), 0, Reserve::Normal).unwrap();
        assert_eq!(heap.view().get(child, b"x"), Some(Value::Float(2.5)));
        assert_eq!(heap.view().get(parent, b"x"), Some(Value::Int(1)));
        assert_eq!(heap.view().get(child, b"y"), None);
    }

    #[test]
    fn test_set_property_keeps_flags() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let o = heap.new_object(Class::Scope, None, [1, 0, 0], Reserve::Normal).unwrap();
        let key = heap.new_string(b"k", Reserve::Normal).unwrap();
        let p = heap.set_property(o, key, Value::Null, PROP_CONST, Reserve::Normal).unwrap();
        heap.set_property(o, key, Value::Bool(true), 0, Reserve::Normal).unwrap();
        assert_eq!(heap.view().prop_flags(p), PROP_CONST);
        assert_eq!(heap.view().prop_value(p), Value::Bool(true));
    }

    #[test]
    fn test_collect_frees_unreachable_records() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let root = heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal).unwrap();
        let key = heap.new_string(b"keep", Reserve::Normal).unwrap();
        let kept = heap.new_string(b"kept value", Reserve::Normal).unwrap();
        heap.set_property(root, key, Value::String(kept), 0, Reserve::Normal).unwrap();
        let garbage = heap.new_string(b"garbage", Reserve::Normal).unwrap();
        heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal).unwrap();
        let before = heap.arena().low();

        heap.shade(Value::Object(root));
        heap.trace(&mut |_| {});
        let stats = heap.sweep();

        assert!(stats.freed >= 32 + 16);
        assert_eq!(heap.view().string_bytes(kept), b"kept value");
        assert_eq!(heap.view().get(root, b"keep"), Some(Value::String(kept)));
        // Garbage and the trailing object form a free tail, so the heap shrinks.
        assert!(heap.arena().low() < before);
        assert_eq!(heap.arena().low(), garbage.0 as usize);
        let again = heap.new_string(b"reuse", Reserve::Normal).unwrap();
        assert_eq!(again.0, garbage.0);
    }

    #[test]
    fn test_closure_callback_reports_program() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let scope = heap.new_object(Class::Scope, None, [1, 0, 0], Reserve::Normal).unwrap();
        let f = heap.new_object(Class::Closure, None, [7, 0, scope.0], Reserve::Normal).unwrap();
        let mut seen = alloc::vec::Vec::new();
        heap.shade(Value::Function(f));
        heap.trace(&mut |slot| seen.push(slot));
        heap.sweep();
        assert_eq!(seen, [7]);
        assert_eq!(heap.view().class(scope), Some(Class::Scope));
    }

    #[test]
    fn test_free_blocks_coalesce() {
        let mut buf = [0u8; 4096];
        let mut heap = heap(&mut buf);
        let keep = heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal).unwrap();
        heap.new_string(b"a", Reserve::Normal).unwrap();
        heap.new_string(b"b", Reserve::Normal).unwrap();
        let end = heap.new_object(Class::Plain, None, [0; 3], Reserve::Normal).unwrap();
        heap.shade(Value::Object(keep));
        heap.shade(Value::Object(end));
        heap.trace(&mut |_| {});
        heap.sweep();
        assert_eq!(heap.free_list_bytes(), 32);
        let big = heap.new_string(b"0123456789abcdef", Reserve::Normal).unwrap();
        assert_eq!(big.0, 32);
    }

    #[test]
    fn test_stale_handles_read_as_empty() {
        let mut buf = [0u8; 256];
        let heap = heap(&mut buf);
        assert_eq!(heap.view().string_bytes(StrRef(1000)), b"");
        assert_eq!(heap.view().class(ObjRef(8)), None);
        assert_eq!(heap.view().prop_value(NIL), Value::Undefined);
    }
}
