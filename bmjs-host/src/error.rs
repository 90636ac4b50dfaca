//! Context creation errors.
//!
//! These are configuration failures: once a context is `Ready`, every
//! further error is a script exception held in the realm.

use alloc::string::String;
use core::fmt;

use bmjs_engine::{DefineError, OutOfMemory};

/// Fatal error while creating a context.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextError {
    /// The region cannot hold the engine's baseline state.
    ArenaTooSmall { min: usize, actual: usize },
    /// The static region was already handed out.
    ArenaAlreadyClaimed,
    /// Two bindings share a global name.
    DuplicateBinding(String),
    /// A binding name is not a dotted identifier path.
    InvalidBindingName(String),
    /// The arena ran out while installing intrinsics or bindings.
    OutOfMemory(OutOfMemory),
}

impl From<OutOfMemory> for ContextError {
    fn from(err: OutOfMemory) -> Self {
        ContextError::OutOfMemory(err)
    }
}

impl From<DefineError> for ContextError {
    fn from(err: DefineError) -> Self {
        match err {
            DefineError::OutOfMemory(oom) => ContextError::OutOfMemory(oom),
            DefineError::NotAnObject(path) => ContextError::InvalidBindingName(path),
        }
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextError::ArenaTooSmall { min, actual } => {
                write!(f, "arena too small: {} bytes, need at least {}", actual, min)
            }
            ContextError::ArenaAlreadyClaimed => write!(f, "static arena already claimed"),
            ContextError::DuplicateBinding(name) => write!(f, "duplicate binding: {}", name),
            ContextError::InvalidBindingName(name) => {
                write!(f, "invalid binding name: {:?}", name)
            }
            ContextError::OutOfMemory(err) => write!(f, "context setup failed: {}", err),
        }
    }
}
