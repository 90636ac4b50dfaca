//! JavaScript value representation.
//!
//! A [`Value`] is a small `Copy` handle. Heap variants carry the arena
//! offset of a record; the storage behind them belongs to the realm and is
//! only valid until the next collection or teardown.

use core::fmt;
use core::fmt::Write as _;

/// Handle to a string record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrRef(pub(crate) u32);

/// Handle to an object record (plain objects, functions, errors, scopes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef(pub(crate) u32);

impl StrRef {
    /// Arena offset of the record.
    pub fn offset(self) -> u32 {
        self.0
    }
}

impl ObjRef {
    /// Arena offset of the record.
    pub fn offset(self) -> u32 {
        self.0
    }
}

/// JavaScript value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// undefined
    Undefined,
    /// null
    Null,
    /// Boolean
    Bool(bool),
    /// Number with an exact 32-bit integer representation.
    Int(i32),
    /// Any other number.
    Float(f64),
    /// String
    String(StrRef),
    /// Object (plain objects and errors).
    Object(ObjRef),
    /// Callable object.
    Function(ObjRef),
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl Value {
    /// Create a number, keeping it as `Int` when that is exact.
    pub fn number(n: f64) -> Self {
        let i = n as i32;
        if i as f64 == n && !(n == 0.0 && n.is_sign_negative()) {
            Value::Int(i)
        } else {
            Value::Float(n)
        }
    }

    /// Numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Heap object handle (objects and functions).
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Value::Object(o) | Value::Function(o) => Some(*o),
            _ => None,
        }
    }

    /// Check if undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if null or undefined.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if callable.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Check if a number.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Check if a string.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Truthiness for values that do not need heap access.
    /// Strings are handled by the realm (empty string is falsy).
    pub(crate) fn primitive_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => !(f.is_nan() || *f == 0.0),
            Value::String(_) => true,
            Value::Object(_) | Value::Function(_) => true,
        }
    }
}

/// Write a number the way `Number.prototype.toString()` does.
pub fn write_number<W: fmt::Write + ?Sized>(out: &mut W, n: f64) -> fmt::Result {
    if n.is_nan() {
        return out.write_str("NaN");
    }
    if n.is_infinite() {
        return out.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if n == 0.0 {
        return out.write_str("0");
    }

    let abs = if n < 0.0 { -n } else { n };
    if (1e-6..1e21).contains(&abs) {
        return write!(out, "{}", n);
    }

    // Exponent form: Rust writes "1e21" / "1e-7", JS wants "1e+21" / "1e-7".
    let mut tmp = ExpBuf::new();
    write!(tmp, "{:e}", n)?;
    let s = tmp.as_str();
    match s.find('e') {
        Some(pos) if !s[pos + 1..].starts_with('-') => {
            out.write_str(&s[..=pos])?;
            out.write_char('+')?;
            out.write_str(&s[pos + 1..])
        }
        _ => out.write_str(s),
    }
}

/// Small stack buffer for exponent formatting.
struct ExpBuf {
    buf: [u8; 32],
    len: usize,
}

impl ExpBuf {
    fn new() -> Self {
        ExpBuf {
            buf: [0; 32],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Write for ExpBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > self.buf.len() {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// ToInt32 conversion.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let t = libm::trunc(n);
    let m = libm::fmod(t, 4294967296.0);
    let m = if m < 0.0 { m + 4294967296.0 } else { m };
    m as u32 as i32
}

/// ToUint32 conversion.
pub fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

/// Parse a numeric string the way `Number(string)` does.
pub fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let (radix, digits) = if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (16, rest)
    } else if let Some(rest) = s.strip_prefix("0o").or_else(|| s.strip_prefix("0O")) {
        (8, rest)
    } else if let Some(rest) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        (2, rest)
    } else {
        // Rust accepts "inf" and "nan" spellings that JS does not.
        if s.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
            return f64::NAN;
        }
        return s.parse::<f64>().unwrap_or(f64::NAN);
    };
    match u64::from_str_radix(digits, radix) {
        Ok(v) => v as f64,
        Err(_) => f64::NAN,
    }
}
