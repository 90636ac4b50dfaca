//! BMJS Engine
//!
//! A small JavaScript interpreter whose script data lives entirely inside
//! one caller-provided byte region.
//!
//! # Architecture
//!
//! - `arena`: Two-ended bump region over the borrowed buffer
//! - `heap`: Record layout, free list and mark-sweep collector
//! - `value`: Copy value handles and number formatting
//! - `token` / `lexer`: byte scanner with table-driven punctuators
//! - `ast` / `parser`: atom-interned syntax tree, recursive descent
//! - `interpreter`: tree walker with GC safe points between statements
//! - `realm`: Interpreter instance, intrinsics and the host boundary
//! - `render`: Value to text conversion
//!
//! # Usage
//!
//! ```ignore
//! use bmjs_engine::{Arena, EvalFlags, Realm, RealmConfig};
//!
//! let mut memory = [0u8; 16 * 1024];
//! let mut realm = Realm::new(Arena::new(&mut memory), RealmConfig::default())?;
//! let value = realm.eval(&mut host, b"1 + 2 * 3", "<eval>", EvalFlags::empty())?;
//! assert_eq!(value, Value::Int(7));
//! ```

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod arena;
pub mod ast;
pub mod error;
mod heap;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod realm;
mod render;
pub mod token;
pub mod value;

pub use arena::{Arena, ArenaStats, OutOfMemory, Reserve, MIN_FREE_SIZE};
pub use error::{DefineError, ErrorKind, Exception, JsResult, ParseError};
pub use heap::GcStats;
pub use parser::parse;
pub use realm::{EvalFlags, Host, Realm, RealmConfig};
pub use value::{ObjRef, StrRef, Value};

/// Engine version.
pub const VERSION: &str = "0.1.0";
