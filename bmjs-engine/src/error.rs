//! JavaScript error types.

use alloc::string::String;
use core::fmt;

use crate::arena::OutOfMemory;

/// Result type for operations that may throw.
///
/// The thrown value itself is kept in the realm's exception slot; see
/// [`crate::Realm::exception`].
pub type JsResult<T> = Result<T, Exception>;

/// Marker for a pending exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exception;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("exception pending")
    }
}

/// Built-in error constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Generic error.
    Error,
    /// Type error during execution.
    TypeError,
    /// Reference error (undefined variable).
    ReferenceError,
    /// Range error (call stack overflow, invalid lengths).
    RangeError,
    /// Syntax error during parsing.
    SyntaxError,
    /// Engine failure (out of memory, unimplemented host services).
    InternalError,
}

impl ErrorKind {
    /// All kinds, in prototype table order.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::Error,
        ErrorKind::TypeError,
        ErrorKind::ReferenceError,
        ErrorKind::RangeError,
        ErrorKind::SyntaxError,
        ErrorKind::InternalError,
    ];

    /// Get error name.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::InternalError => "InternalError",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_index(index: u32) -> ErrorKind {
        ErrorKind::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(ErrorKind::Error)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse failure with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Line number (1-based).
    pub line: usize,
    /// Column number (1-based).
    pub column: usize,
}

impl ParseError {
    /// Create a parse error.
    pub fn new<S: Into<String>>(message: S, line: usize, column: usize) -> Self {
        ParseError {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.line, self.column)
    }
}

/// Result type for lexing and parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Failure to install a host function on the global object.
#[derive(Debug, Clone, PartialEq)]
pub enum DefineError {
    /// The arena is exhausted.
    OutOfMemory(OutOfMemory),
    /// A path segment names an existing non-object value.
    NotAnObject(String),
}

impl From<OutOfMemory> for DefineError {
    fn from(err: OutOfMemory) -> Self {
        DefineError::OutOfMemory(err)
    }
}

impl fmt::Display for DefineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefineError::OutOfMemory(err) => write!(f, "{}", err),
            DefineError::NotAnObject(path) => write!(f, "{} is not an object", path),
        }
    }
}
