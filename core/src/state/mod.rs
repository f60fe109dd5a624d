//! Stack-based embedding API.
//!
//! A [`State`] is one interpreter thread: a value stack, a stack of call frames and
//! a globals table. Threads created with [`State::new_thread`] share the registry
//! of the state that created them. Indices follow the usual conventions: positive
//! indices count from the bottom of the current frame (1 is the first slot),
//! negative indices count from the top (-1 is the top), and the pseudo-indices
//! [`REGISTRY_INDEX`], [`GLOBALS_INDEX`] and [`upvalue_index`] address the registry,
//! the thread's globals and the running native closure's upvalues.


use std::cell::{Cell, RefCell};
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Result, anyhow};

use crate::ast::Parser;
use crate::interp;
use crate::op::compare_lt;
use crate::util::stack::ensure_sufficient_stack;
use crate::val::{Function, NativeClosure, NativeFn, Table, TableRef, Val, ValueType};

pub const REGISTRY_INDEX: i32 = -10_000;
pub const GLOBALS_INDEX: i32 = -10_001;
/// Passed as `nresults` to keep every returned value.
pub const MULTRET: i32 = -1;
/// Returned by [`State::create_ref`] for a nil value.
pub const REF_NIL: i64 = -1;

const MAX_CALL_DEPTH: usize = 1000;

/// Pseudo-index of the `i`-th upvalue (1-based) of the running native closure.
pub const fn upvalue_index(i: i32) -> i32 {
    GLOBALS_INDEX - i
}

/// Outcome of loading or protected execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Runtime,
    Syntax,
    File,
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

/// Script error whose message is final: it already carries its `chunk:line:`
/// prefix, or deliberately has none.
#[derive(Debug, Clone)]
pub struct ScriptError {
    message: String,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ScriptError {}

struct Shared {
    registry: TableRef,
    free_refs: RefCell<Vec<i64>>,
    next_ref: Cell<i64>,
    string_methods: RefCell<Option<TableRef>>,
}

struct Frame {
    base: usize,
    closure: Option<Rc<NativeClosure>>,
}

struct ThreadState {
    stack: RefCell<Vec<Val>>,
    frames: RefCell<Vec<Frame>>,
    globals: RefCell<TableRef>,
    shared: Rc<Shared>,
    depth: Cell<usize>,
    /// Non-string value raised by `error`, waiting for a protected call to pick it up.
    pending_error: RefCell<Option<Val>>,
}

/// Handle to an interpreter thread. Clones refer to the same thread.
#[derive(Clone)]
pub struct State {
    inner: Rc<ThreadState>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "State(0x{:x}, top={})", self.addr(), self.top())
    }
}

fn new_table_ref() -> TableRef {
    Rc::new(RefCell::new(Table::new()))
}

fn chunk_display(code: &str) -> String {
    let first = code.lines().next().unwrap_or("");
    if first.len() < code.len() || first.chars().count() > 40 {
        let head: String = first.chars().take(40).collect();
        format!("[string \"{}...\"]", head)
    } else {
        format!("[string \"{}\"]", first)
    }
}

impl State {
    /// Creates an independent state with an empty globals table and registry.
    pub fn new() -> Self {
        let shared = Rc::new(Shared {
            registry: new_table_ref(),
            free_refs: RefCell::new(Vec::new()),
            next_ref: Cell::new(1),
            string_methods: RefCell::new(None),
        });
        Self::with_shared(shared, new_table_ref())
    }

    fn with_shared(shared: Rc<Shared>, globals: TableRef) -> Self {
        State {
            inner: Rc::new(ThreadState {
                stack: RefCell::new(Vec::new()),
                frames: RefCell::new(vec![Frame { base: 0, closure: None }]),
                globals: RefCell::new(globals),
                shared,
                depth: Cell::new(0),
                pending_error: RefCell::new(None),
            }),
        }
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const u8 as usize
    }

    /// Whether both handles belong to the same registry (same root state).
    pub fn same_universe(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.inner.shared, &other.inner.shared)
    }

    /// Creates a thread sharing this state's registry and, initially, its globals.
    /// The new thread is pushed onto this state's stack and returned.
    pub fn new_thread(&self) -> State {
        let thread = State::with_shared(self.inner.shared.clone(), self.globals());
        self.push(Val::Thread(thread.clone()));
        tracing::trace!(target: "moonbridge_core::state", thread = thread.addr(), "thread created");
        thread
    }

    pub fn globals(&self) -> TableRef {
        self.inner.globals.borrow().clone()
    }

    pub fn registry(&self) -> TableRef {
        self.inner.shared.registry.clone()
    }

    pub(crate) fn string_methods(&self) -> Option<TableRef> {
        self.inner.shared.string_methods.borrow().clone()
    }

    /// Installs the table consulted when a string value is indexed (`s:upper()`).
    pub fn set_string_methods(&self, methods: TableRef) {
        *self.inner.shared.string_methods.borrow_mut() = Some(methods);
    }

    // ---- stack layout -------------------------------------------------------------

    fn base(&self) -> usize {
        self.inner.frames.borrow().last().map(|f| f.base).unwrap_or(0)
    }

    /// Number of slots in the current frame.
    pub fn top(&self) -> i32 {
        (self.inner.stack.borrow().len() - self.base()) as i32
    }

    /// Grows (with nils) or shrinks the current frame. Negative values count from the top.
    pub fn set_top(&self, idx: i32) {
        let base = self.base();
        let mut stack = self.inner.stack.borrow_mut();
        let new_len = if idx >= 0 {
            base + idx as usize
        } else {
            (stack.len() as i64 + idx as i64 + 1).max(base as i64) as usize
        };
        stack.resize(new_len, Val::Nil);
    }

    pub fn pop(&self, n: i32) {
        self.set_top(-n - 1);
    }

    fn is_pseudo(idx: i32) -> bool {
        idx <= REGISTRY_INDEX
    }

    /// Converts a relative index into an absolute one; pseudo-indices are unchanged.
    pub fn abs_index(&self, idx: i32) -> i32 {
        if idx > 0 || Self::is_pseudo(idx) {
            idx
        } else {
            self.top() + idx + 1
        }
    }

    fn slot(&self, idx: i32) -> Option<usize> {
        let base = self.base();
        let len = self.inner.stack.borrow().len();
        if idx > 0 {
            let pos = base + idx as usize - 1;
            (pos < len).then_some(pos)
        } else if idx < 0 && !Self::is_pseudo(idx) {
            let pos = len as i64 + idx as i64;
            (pos >= base as i64).then_some(pos as usize)
        } else {
            None
        }
    }

    /// Copy of the value at `idx`; nil for an index that does not refer to a slot.
    pub fn get(&self, idx: i32) -> Val {
        self.value_at(idx).unwrap_or_default()
    }

    fn value_at(&self, idx: i32) -> Option<Val> {
        match idx {
            REGISTRY_INDEX => Some(Val::Table(self.registry())),
            GLOBALS_INDEX => Some(Val::Table(self.globals())),
            i if i < GLOBALS_INDEX => {
                let n = (GLOBALS_INDEX - i) as usize;
                let frames = self.inner.frames.borrow();
                let closure = frames.last()?.closure.as_ref()?;
                closure.upvalues.get(n - 1).cloned()
            }
            _ => {
                let pos = self.slot(idx)?;
                Some(self.inner.stack.borrow()[pos].clone())
            }
        }
    }

    pub fn push(&self, val: Val) {
        self.inner.stack.borrow_mut().push(val);
    }

    fn pop_val(&self) -> Val {
        if self.top() <= 0 {
            return Val::Nil;
        }
        self.inner.stack.borrow_mut().pop().unwrap_or_default()
    }

    pub fn push_nil(&self) {
        self.push(Val::Nil);
    }

    pub fn push_bool(&self, b: bool) {
        self.push(Val::Bool(b));
    }

    pub fn push_integer(&self, i: i64) {
        self.push(Val::Int(i));
    }

    pub fn push_number(&self, n: f64) {
        self.push(Val::Float(n));
    }

    pub fn push_string(&self, s: &str) {
        self.push(Val::from(s));
    }

    /// Pushes a copy of the value at `idx`.
    pub fn push_value(&self, idx: i32) {
        let v = self.get(idx);
        self.push(v);
    }

    pub fn push_globals(&self) {
        self.push(Val::Table(self.globals()));
    }

    /// Pops `n` values and pushes a native closure holding them as upvalues.
    pub fn push_closure(&self, func: NativeFn, n: usize) {
        let upvalues = {
            let mut stack = self.inner.stack.borrow_mut();
            let at = stack.len().saturating_sub(n).max(self.base());
            stack.split_off(at)
        };
        self.push(Val::Function(Function::Native(Rc::new(NativeClosure { func, upvalues }))));
    }

    pub fn push_function(&self, func: NativeFn) {
        self.push_closure(func, 0);
    }

    /// Moves the top value into position `idx`, shifting the values above it up.
    pub fn insert(&self, idx: i32) {
        let Some(pos) = self.slot(idx) else {
            return;
        };
        let mut stack = self.inner.stack.borrow_mut();
        if let Some(v) = stack.pop() {
            let at = pos.min(stack.len());
            stack.insert(at, v);
        }
    }

    pub fn remove(&self, idx: i32) {
        if let Some(pos) = self.slot(idx) {
            self.inner.stack.borrow_mut().remove(pos);
        }
    }

    /// Pops the top value into position `idx`. `GLOBALS_INDEX` replaces the thread's
    /// globals table, which must then be a table.
    pub fn replace(&self, idx: i32) -> Result<()> {
        if idx == GLOBALS_INDEX {
            return match self.pop_val() {
                Val::Table(t) => {
                    *self.inner.globals.borrow_mut() = t;
                    Ok(())
                }
                other => Err(anyhow!("globals must be a table, got {}", other.type_name())),
            };
        }
        let pos = self.slot(idx).ok_or_else(|| anyhow!("invalid index {}", idx))?;
        let v = self.pop_val();
        let mut stack = self.inner.stack.borrow_mut();
        if pos < stack.len() {
            stack[pos] = v;
        }
        Ok(())
    }

    /// Pops a table and makes it this thread's globals.
    pub fn set_globals(&self) -> Result<()> {
        self.replace(GLOBALS_INDEX)
    }

    // ---- type queries and conversions ---------------------------------------------

    pub fn type_of(&self, idx: i32) -> ValueType {
        match self.value_at(idx) {
            Some(v) => v.value_type(),
            None => ValueType::None,
        }
    }

    pub fn type_name(&self, idx: i32) -> &'static str {
        self.type_of(idx).name()
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Nil
    }

    pub fn is_none_or_nil(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), ValueType::None | ValueType::Nil)
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Table
    }

    pub fn is_function(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Function
    }

    pub fn is_boolean(&self, idx: i32) -> bool {
        self.type_of(idx) == ValueType::Boolean
    }

    /// Exactly an integer-representation number (no string coercion).
    pub fn is_integer(&self, idx: i32) -> bool {
        matches!(self.value_at(idx), Some(Val::Int(_)))
    }

    /// Numbers and strings convertible to numbers.
    pub fn is_number(&self, idx: i32) -> bool {
        self.to_number(idx).is_some()
    }

    /// Strings and numbers (which convert to strings).
    pub fn is_string(&self, idx: i32) -> bool {
        matches!(self.type_of(idx), ValueType::String | ValueType::Number)
    }

    pub fn to_integer(&self, idx: i32) -> Option<i64> {
        self.value_at(idx)?.to_integer()
    }

    pub fn to_number(&self, idx: i32) -> Option<f64> {
        self.value_at(idx)?.to_number()
    }

    pub fn to_boolean(&self, idx: i32) -> bool {
        self.get(idx).truthy()
    }

    pub fn to_str(&self, idx: i32) -> Option<String> {
        self.value_at(idx)?.to_str().map(|s| s.to_string())
    }

    pub fn to_thread(&self, idx: i32) -> Option<State> {
        match self.value_at(idx)? {
            Val::Thread(s) => Some(s),
            _ => None,
        }
    }

    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.value_at(a), self.value_at(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn less_than(&self, a: i32, b: i32) -> Result<bool> {
        match (self.value_at(a), self.value_at(b)) {
            (Some(x), Some(y)) => compare_lt(&x, &y),
            _ => Ok(false),
        }
    }

    /// `#` of a string or table; 0 for other values.
    pub fn raw_len(&self, idx: i32) -> usize {
        match self.get(idx) {
            Val::Str(s) => s.len(),
            Val::Table(t) => t.borrow().len().max(0) as usize,
            _ => 0,
        }
    }

    // ---- tables -------------------------------------------------------------------

    pub fn new_table(&self) {
        self.push(Val::table(Table::new()));
    }

    fn table_at(&self, idx: i32) -> Result<TableRef> {
        match self.value_at(idx) {
            Some(Val::Table(t)) => Ok(t),
            Some(other) => Err(anyhow!("attempt to index a {} value", other.type_name())),
            None => Err(anyhow!("attempt to index a no value")),
        }
    }

    fn index_value(&self, obj: Val, key: &Val) -> Result<Val> {
        match obj {
            Val::Table(t) => Ok(t.borrow().get(key)),
            Val::Str(_) => match self.string_methods() {
                Some(methods) => Ok(methods.borrow().get(key)),
                None => Err(anyhow!("attempt to index a string value")),
            },
            other => Err(anyhow!("attempt to index a {} value", other.type_name())),
        }
    }

    /// Pops a key and pushes `t[key]` for the value `t` at `idx`.
    pub fn get_table(&self, idx: i32) -> Result<ValueType> {
        let obj = self.get(idx);
        let key = self.pop_val();
        let v = self.index_value(obj, &key)?;
        let ty = v.value_type();
        self.push(v);
        Ok(ty)
    }

    /// Pushes `t[key]` for the value `t` at `idx`.
    pub fn get_field(&self, idx: i32, key: &str) -> Result<ValueType> {
        let obj = self.get(idx);
        let v = self.index_value(obj, &Val::from(key))?;
        let ty = v.value_type();
        self.push(v);
        Ok(ty)
    }

    /// Performs `t[key] = value` where the value is on top and the key just below it;
    /// pops both.
    pub fn set_table(&self, idx: i32) -> Result<()> {
        let t = self.table_at(idx)?;
        let value = self.pop_val();
        let key = self.pop_val();
        t.borrow_mut().set(key, value)
    }

    /// Performs `t[key] = value` with the value popped from the top.
    pub fn set_field(&self, idx: i32, key: &str) -> Result<()> {
        let t = self.table_at(idx)?;
        let value = self.pop_val();
        t.borrow_mut().set(Val::from(key), value)
    }

    pub fn raw_get_i(&self, idx: i32, n: i64) -> Result<ValueType> {
        let t = self.table_at(idx)?;
        let v = t.borrow().get_int(n);
        let ty = v.value_type();
        self.push(v);
        Ok(ty)
    }

    pub fn raw_set_i(&self, idx: i32, n: i64) -> Result<()> {
        let t = self.table_at(idx)?;
        let value = self.pop_val();
        t.borrow_mut().set(Val::Int(n), value)
    }

    pub fn get_global(&self, name: &str) -> ValueType {
        let v = self.globals().borrow().get_str(name);
        let ty = v.value_type();
        self.push(v);
        ty
    }

    pub fn set_global(&self, name: &str) {
        let value = self.pop_val();
        self.globals().borrow_mut().set_str(name, value);
    }

    /// Pops a key and pushes the next key/value pair of the table at `idx`.
    /// Returns false, pushing nothing, when the traversal is over.
    pub fn next(&self, idx: i32) -> Result<bool> {
        let t = self.table_at(idx)?;
        let key = self.pop_val();
        let entry = t.borrow().next(&key)?;
        match entry {
            Some((k, v)) => {
                self.push(k);
                self.push(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- registry references ------------------------------------------------------

    /// Pops the top value and anchors it in the registry, returning its reference.
    pub fn create_ref(&self) -> i64 {
        let value = self.pop_val();
        if value.is_nil() {
            return REF_NIL;
        }
        let shared = &self.inner.shared;
        let r = shared.free_refs.borrow_mut().pop().unwrap_or_else(|| {
            let r = shared.next_ref.get();
            shared.next_ref.set(r + 1);
            r
        });
        shared.registry.borrow_mut().set_int(r, value);
        r
    }

    pub fn release_ref(&self, r: i64) {
        if r <= 0 {
            return;
        }
        let shared = &self.inner.shared;
        shared.registry.borrow_mut().set_int(r, Val::Nil);
        shared.free_refs.borrow_mut().push(r);
    }

    pub fn push_ref(&self, r: i64) {
        let v = self.inner.shared.registry.borrow().get_int(r);
        self.push(v);
    }

    /// Pops `n` values from `from` and pushes them onto `to`, preserving order.
    pub fn xmove(from: &State, to: &State, n: i32) {
        if n <= 0 || from == to {
            return;
        }
        let moved = {
            let mut stack = from.inner.stack.borrow_mut();
            let at = stack.len().saturating_sub(n as usize).max(from.base());
            stack.split_off(at)
        };
        to.inner.stack.borrow_mut().extend(moved);
    }

    // ---- calls --------------------------------------------------------------------

    /// Records a non-string error value for the protected call that will catch the
    /// returned error.
    pub fn raise(&self, value: Val) -> anyhow::Error {
        let message = match &value {
            Val::Str(s) => return anyhow!("{}", s),
            Val::Int(_) | Val::Float(_) => value.to_string(),
            other => format!("(error object is a {} value)", other.type_name()),
        };
        *self.inner.pending_error.borrow_mut() = Some(value);
        anyhow::Error::new(ScriptError::new(message))
    }

    /// The value raised for `err`: the pending non-string value if there is one,
    /// otherwise the error message.
    pub fn take_error(&self, err: &anyhow::Error) -> Val {
        match self.inner.pending_error.borrow_mut().take() {
            Some(v) => v,
            None => Val::from(err.to_string()),
        }
    }

    /// Calls `func` with `args` outside of the stack protocol.
    pub fn call_value(&self, func: &Val, args: Vec<Val>) -> Result<Vec<Val>> {
        let Val::Function(f) = func else {
            return Err(anyhow!("attempt to call a {} value", func.type_name()));
        };
        let depth = self.inner.depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(anyhow!("stack overflow"));
        }
        self.inner.depth.set(depth + 1);
        let result = ensure_sufficient_stack(|| match f {
            Function::Lua(closure) => interp::call_lua(self, closure, args),
            Function::Native(closure) => self.call_native(closure, args),
        });
        self.inner.depth.set(depth);
        result
    }

    fn call_native(&self, closure: &Rc<NativeClosure>, args: Vec<Val>) -> Result<Vec<Val>> {
        let base = {
            let mut stack = self.inner.stack.borrow_mut();
            let base = stack.len();
            stack.extend(args);
            base
        };
        self.inner.frames.borrow_mut().push(Frame {
            base,
            closure: Some(closure.clone()),
        });
        let result = (closure.func)(self);
        let results = {
            let mut stack = self.inner.stack.borrow_mut();
            let out = match &result {
                Ok(n) => {
                    let at = stack.len().saturating_sub(*n).max(base);
                    stack.split_off(at)
                }
                Err(_) => Vec::new(),
            };
            stack.truncate(base);
            out
        };
        self.inner.frames.borrow_mut().pop();
        result.map(|_| results)
    }

    /// Pops the function and its `nargs` arguments, calls it, and pushes the results
    /// adjusted to `nresults` (all of them for [`MULTRET`]).
    pub fn call(&self, nargs: i32, nresults: i32) -> Result<()> {
        self.call_keeping_error(nargs, nresults).inspect_err(|_| {
            self.inner.pending_error.borrow_mut().take();
        })
    }

    fn call_keeping_error(&self, nargs: i32, nresults: i32) -> Result<()> {
        let func_pos = self.top() - nargs;
        if func_pos < 1 {
            return Err(anyhow!("not enough values on the stack for a call with {} arguments", nargs));
        }
        let (func, args) = {
            let base = self.base();
            let mut stack = self.inner.stack.borrow_mut();
            let args = stack.split_off(base + func_pos as usize);
            let func = stack.pop().unwrap_or_default();
            (func, args)
        };
        let mut results = self.call_value(&func, args)?;
        if nresults != MULTRET {
            results.resize(nresults.max(0) as usize, Val::Nil);
        }
        self.inner.stack.borrow_mut().extend(results);
        Ok(())
    }

    /// Like [`call`](Self::call), but a failure pushes the error value instead of
    /// propagating it.
    pub fn pcall(&self, nargs: i32, nresults: i32) -> Status {
        let func_pos = self.top() - nargs;
        match self.call_keeping_error(nargs, nresults) {
            Ok(()) => Status::Ok,
            Err(err) => {
                // the function and arguments are already gone
                let value = self.take_error(&err);
                self.set_top(func_pos.max(1) - 1);
                self.push(value);
                Status::Runtime
            }
        }
    }

    // ---- loading ------------------------------------------------------------------

    /// Compiles `code` and pushes it as a function, or pushes the error message.
    pub fn load(&self, code: &str, chunk_name: &str) -> Status {
        match Parser::parse_source(code) {
            Ok(block) => {
                tracing::debug!(target: "moonbridge_core::load", chunk = chunk_name, statements = block.len(), "chunk compiled");
                self.push(interp::chunk_closure(block, self.globals(), Rc::from(chunk_name)));
                Status::Ok
            }
            Err(err) => {
                self.push_string(&err.with_chunk(chunk_name));
                Status::Syntax
            }
        }
    }

    pub fn load_string(&self, code: &str) -> Status {
        self.load(code, &chunk_display(code))
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Status {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(code) => self.load(&code, &path.display().to_string()),
            Err(err) => {
                self.push_string(&format!("cannot open {}: {}", path.display(), err));
                Status::File
            }
        }
    }

    /// Loads and runs `code`; on failure the error message is left on the stack.
    pub fn do_string(&self, code: &str) -> Status {
        match self.load_string(code) {
            Status::Ok => self.pcall(0, MULTRET),
            status => status,
        }
    }

    pub fn do_file(&self, path: impl AsRef<Path>) -> Status {
        match self.load_file(path) {
            Status::Ok => self.pcall(0, MULTRET),
            status => status,
        }
    }
}
