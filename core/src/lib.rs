//! Scripting engine embedded by moonbridge.
//!
//! Source is tokenized by [`token`], parsed into the tree in [`ast`] and evaluated
//! by a tree-walking interpreter. Hosts drive it through the stack API of
//! [`state::State`].

pub mod ast;
mod interp;
pub mod op;
pub mod state;
pub mod token;
pub mod util;
pub mod val;

pub use state::{GLOBALS_INDEX, MULTRET, REF_NIL, REGISTRY_INDEX, ScriptError, State, Status, upvalue_index};
pub use val::{NativeFn, Table, TableRef, Val, ValueType};
