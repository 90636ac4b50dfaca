//! Turning script values into host-readable bytes.
//!
//! There is no allocator to hand a `String` back with, so conversion has
//! three outcomes:
//!
//! - a string value is returned as a view of its own arena bytes;
//! - a short rendering is written into the caller's [`TextBuf`];
//! - a longer one is written into a block pinned at the top of the arena.
//!
//! Pinned blocks are never reclaimed before teardown, so converting many long
//! values slowly uses up the arena. A [`Text`] borrows both the realm and the
//! buffer, so nothing can allocate while it is alive.

use core::fmt;

use bmjs_engine::{JsResult, Realm, Reserve, Value};

/// Bytes the inline buffer holds.
pub const INLINE_TEXT_CAPACITY: usize = 16;

/// Caller-owned scratch space for short renderings.
#[derive(Debug, Clone)]
pub struct TextBuf {
    bytes: [u8; INLINE_TEXT_CAPACITY],
    len: usize,
    overflowed: bool,
}

impl TextBuf {
    pub const fn new() -> Self {
        Self {
            bytes: [0; INLINE_TEXT_CAPACITY],
            len: 0,
            overflowed: false,
        }
    }

    /// Whether the last conversion spilled into the arena.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }
}

impl Default for TextBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text<'t> {
    /// The bytes of a string value.
    Borrowed(&'t [u8]),
    /// Inside the caller's [`TextBuf`].
    Inline(&'t [u8]),
    /// Pinned in the arena until teardown.
    Overflow(&'t [u8]),
}

impl<'t> Text<'t> {
    pub fn as_bytes(&self) -> &'t [u8] {
        match *self {
            Text::Borrowed(bytes) | Text::Inline(bytes) | Text::Overflow(bytes) => bytes,
        }
    }

    /// The text as UTF-8, if it is valid.
    pub fn as_str(&self) -> Option<&'t str> {
        core::str::from_utf8(self.as_bytes()).ok()
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Writes into the inline buffer, failing once it is full.
struct InlineWriter<'b> {
    buf: &'b mut [u8; INLINE_TEXT_CAPACITY],
    len: usize,
}

impl fmt::Write for InlineWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let end = self.len + s.len();
        if end > INLINE_TEXT_CAPACITY {
            return Err(fmt::Error);
        }
        self.buf[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

/// Convert `value` to text.
///
/// Natives pass [`Reserve::Normal`]. Reporting after evaluation has stopped
/// passes [`Reserve::Critical`] so an out-of-memory exception can still be
/// printed. If the overflow block does not fit, the realm's out-of-memory
/// error is thrown.
pub fn to_text<'t>(
    realm: &'t mut Realm<'_>,
    value: Value,
    buf: &'t mut TextBuf,
    reserve: Reserve,
) -> JsResult<Text<'t>> {
    buf.len = 0;
    buf.overflowed = false;

    if let Value::String(s) = value {
        return Ok(Text::Borrowed(realm.string_bytes(s)));
    }

    let mut writer = InlineWriter {
        buf: &mut buf.bytes,
        len: 0,
    };
    if realm.render(value, &mut writer).is_ok() {
        let len = writer.len;
        buf.len = len;
        return Ok(Text::Inline(&buf.bytes[..len]));
    }

    buf.overflowed = true;
    realm.render_pinned(value, reserve).map(Text::Overflow)
}
