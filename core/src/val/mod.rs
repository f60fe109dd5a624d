mod convert;
mod table;


use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::ast::FuncBody;
use crate::interp::Env;
use crate::state::State;

pub use convert::{format_float, format_general, format_number, str_to_number};
pub use table::Table;

pub type TableRef = Rc<RefCell<Table>>;

/// Native function callable from scripts.
///
/// Arguments are on the callee's stack frame (index 1 is the first argument);
/// the function pushes its results and returns how many it pushed.
pub type NativeFn = fn(&State) -> anyhow::Result<usize>;

/// Type tag of a value, or `None` for an index that does not refer to a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    None,
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Thread,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::None => "no value",
            ValueType::Nil => "nil",
            ValueType::Boolean => "boolean",
            ValueType::Number => "number",
            ValueType::String => "string",
            ValueType::Table => "table",
            ValueType::Function => "function",
            ValueType::Thread => "thread",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Default)]
pub enum Val {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Table(TableRef),
    Function(Function),
    Thread(State),
}

#[derive(Clone)]
pub enum Function {
    Lua(Rc<LuaClosure>),
    Native(Rc<NativeClosure>),
}

pub struct LuaClosure {
    pub(crate) proto: Rc<FuncBody>,
    pub(crate) env: Env,
    pub(crate) globals: TableRef,
    pub(crate) chunk: Rc<str>,
}

pub struct NativeClosure {
    pub func: NativeFn,
    pub upvalues: Vec<Val>,
}

impl Function {
    pub(crate) fn addr(&self) -> usize {
        match self {
            Function::Lua(f) => Rc::as_ptr(f) as *const u8 as usize,
            Function::Native(f) => Rc::as_ptr(f) as *const u8 as usize,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Lua(f) => f.proto.name.as_deref(),
            Function::Native(_) => None,
        }
    }
}

impl Val {
    pub fn table(table: Table) -> Val {
        Val::Table(Rc::new(RefCell::new(table)))
    }

    pub fn native(func: NativeFn) -> Val {
        Val::Function(Function::Native(Rc::new(NativeClosure {
            func,
            upvalues: Vec::new(),
        })))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Val::Nil => ValueType::Nil,
            Val::Bool(_) => ValueType::Boolean,
            Val::Int(_) | Val::Float(_) => ValueType::Number,
            Val::Str(_) => ValueType::String,
            Val::Table(_) => ValueType::Table,
            Val::Function(_) => ValueType::Function,
            Val::Thread(_) => ValueType::Thread,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.value_type().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Val::Nil)
    }

    /// Everything except `nil` and `false` is true.
    pub fn truthy(&self) -> bool {
        !matches!(self, Val::Nil | Val::Bool(false))
    }

    /// Numeric view with string coercion.
    pub fn to_number(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Float(f) => Some(*f),
            Val::Str(s) => match str_to_number(s)? {
                Val::Int(i) => Some(i as f64),
                Val::Float(f) => Some(f),
                _ => None,
            },
            _ => None,
        }
    }

    /// Integer view: integers, floats with an exact integral value, and numeric strings.
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            Val::Float(f) => float_to_integer(*f),
            Val::Str(s) => match str_to_number(s)? {
                Val::Int(i) => Some(i),
                Val::Float(f) => float_to_integer(f),
                _ => None,
            },
            _ => None,
        }
    }

    /// Arithmetic operand: numbers as they are, numeric strings converted.
    pub(crate) fn to_arith(&self) -> Option<Val> {
        match self {
            Val::Int(_) | Val::Float(_) => Some(self.clone()),
            Val::Str(s) => str_to_number(s),
            _ => None,
        }
    }

    /// String view for strings and numbers, the only values with an implicit conversion.
    pub fn to_str(&self) -> Option<Rc<str>> {
        match self {
            Val::Str(s) => Some(s.clone()),
            Val::Int(_) | Val::Float(_) => Some(Rc::from(format_number(self))),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Val::Table(t) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn addr(&self) -> Option<usize> {
        match self {
            Val::Table(t) => Some(Rc::as_ptr(t) as *const u8 as usize),
            Val::Function(f) => Some(f.addr()),
            Val::Thread(s) => Some(s.addr()),
            _ => None,
        }
    }
}

pub(crate) fn float_to_integer(f: f64) -> Option<i64> {
    // -2^63 is exact in f64, 2^63 is not a valid i64
    if f.fract() == 0.0 && f >= -9_223_372_036_854_775_808.0 && f < 9_223_372_036_854_775_808.0 {
        Some(f as i64)
    } else {
        None
    }
}

/// Raw equality: no coercion between strings and numbers, integers equal floats of
/// the same mathematical value, reference types compare by identity.
impl PartialEq for Val {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Val::Nil, Val::Nil) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Int(i), Val::Float(f)) | (Val::Float(f), Val::Int(i)) => float_to_integer(*f) == Some(*i),
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Table(a), Val::Table(b)) => Rc::ptr_eq(a, b),
            (Val::Function(a), Val::Function(b)) => a.addr() == b.addr(),
            (Val::Thread(a), Val::Thread(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Nil => f.write_str("nil"),
            Val::Bool(b) => write!(f, "{}", b),
            Val::Int(_) | Val::Float(_) => f.write_str(&format_number(self)),
            Val::Str(s) => f.write_str(s),
            Val::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Val::Function(func) => match func {
                Function::Lua(_) => write!(f, "function: 0x{:x}", func.addr()),
                Function::Native(_) => write!(f, "function: builtin: 0x{:x}", func.addr()),
            },
            Val::Thread(s) => write!(f, "thread: 0x{:x}", s.addr()),
        }
    }
}

impl fmt::Debug for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Str(s) => write!(f, "{:?}", s),
            Val::Float(x) => write!(f, "{:?}", x),
            _ => write!(f, "{}", self),
        }
    }
}

impl From<bool> for Val {
    fn from(b: bool) -> Self {
        Val::Bool(b)
    }
}

impl From<i64> for Val {
    fn from(i: i64) -> Self {
        Val::Int(i)
    }
}

impl From<i32> for Val {
    fn from(i: i32) -> Self {
        Val::Int(i as i64)
    }
}

impl From<f64> for Val {
    fn from(f: f64) -> Self {
        Val::Float(f)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::Str(Rc::from(s))
    }
}

impl From<String> for Val {
    fn from(s: String) -> Self {
        Val::Str(Rc::from(s))
    }
}

impl From<Table> for Val {
    fn from(t: Table) -> Self {
        Val::table(t)
    }
}
