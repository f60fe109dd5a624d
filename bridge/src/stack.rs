//! Typed push/read of host values on an interpreter stack.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;
use std::str::FromStr;

use moonbridge_core::{State, Val, ValueType};

use crate::error::{BridgeError, Result};
use crate::range::{Native, NativeInteger, NativeNumber, Numeric};

/// Restores the stack depth observed at creation when dropped.
///
/// Every bridge operation holds one of these while it has slots pushed, so an
/// early `?` return leaves the stack exactly as it found it.
pub struct SlotGuard<'s> {
    state: &'s State,
    depth: i32,
    armed: bool,
}

impl<'s> SlotGuard<'s> {
    pub fn new(state: &'s State) -> Self {
        SlotGuard {
            state,
            depth: state.top(),
            armed: true,
        }
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Number of slots pushed since the guard was created.
    pub fn pushed(&self) -> i32 {
        self.state.top() - self.depth
    }

    /// Keeps whatever is currently pushed.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.state.top() > self.depth {
            tracing::trace!(target: "moonbridge::stack", released = self.state.top() - self.depth, "slots released");
            self.state.set_top(self.depth);
        }
    }
}

/// Values that can be pushed onto the stack as exactly one slot.
pub trait ToStack {
    fn push_to(self, state: &State) -> Result<()>;
}

/// Values that can be read from one stack slot.
pub trait FromStack: Sized {
    /// Whether a nil slot is a legitimate value of this type.
    const ACCEPTS_NIL: bool = false;
    /// Human-readable kind used in type errors.
    const EXPECTED: &'static str;

    fn read_from(state: &State, index: i32) -> Result<Self>;
}

fn unexpected(expected: &'static str, state: &State, index: i32) -> BridgeError {
    BridgeError::UnexpectedType {
        expected,
        found: state.type_name(index),
    }
}

impl ToStack for bool {
    fn push_to(self, state: &State) -> Result<()> {
        state.push_bool(self);
        Ok(())
    }
}

impl FromStack for bool {
    const EXPECTED: &'static str = "boolean";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        match state.get(index) {
            Val::Bool(b) => Ok(b),
            _ => Err(unexpected(Self::EXPECTED, state, index)),
        }
    }
}

impl ToStack for &str {
    fn push_to(self, state: &State) -> Result<()> {
        state.push_string(self);
        Ok(())
    }
}

impl ToStack for String {
    fn push_to(self, state: &State) -> Result<()> {
        state.push_string(&self);
        Ok(())
    }
}

impl ToStack for &String {
    fn push_to(self, state: &State) -> Result<()> {
        state.push_string(self);
        Ok(())
    }
}

impl FromStack for String {
    const EXPECTED: &'static str = "string";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        match state.type_of(index) {
            ValueType::String | ValueType::Number => state.to_str(index).ok_or_else(|| unexpected(Self::EXPECTED, state, index)),
            _ => Err(unexpected(Self::EXPECTED, state, index)),
        }
    }
}

impl ToStack for char {
    fn push_to(self, state: &State) -> Result<()> {
        let mut buf = [0u8; 4];
        state.push_string(self.encode_utf8(&mut buf));
        Ok(())
    }
}

impl FromStack for char {
    const EXPECTED: &'static str = "character";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        match state.get(index) {
            Val::Str(s) => s.chars().next().ok_or_else(|| unexpected(Self::EXPECTED, state, index)),
            _ => Err(unexpected(Self::EXPECTED, state, index)),
        }
    }
}

fn push_numeric<T: Numeric>(value: T, state: &State) -> Result<()> {
    match value.to_native() {
        Some(Native::Integer(i)) => state.push_integer(i),
        Some(Native::Number(n)) => state.push_number(n),
        None => return Err(BridgeError::range(T::NAME, NativeInteger::NAME, Some(&value))),
    }
    Ok(())
}

fn read_numeric<T: Numeric>(state: &State, index: i32) -> Result<T> {
    match state.get(index) {
        Val::Int(i) => T::from_integer(i).ok_or_else(|| BridgeError::range(NativeInteger::NAME, T::NAME, Some(&i))),
        Val::Float(f) => T::from_number(f).ok_or_else(|| BridgeError::range(NativeNumber::NAME, T::NAME, Some(&f))),
        _ => Err(unexpected("number", state, index)),
    }
}

macro_rules! numeric_stack {
    ($($t:ty),* $(,)?) => {$(
        impl ToStack for $t {
            fn push_to(self, state: &State) -> Result<()> {
                push_numeric(self, state)
            }
        }

        impl FromStack for $t {
            const EXPECTED: &'static str = <$t as Numeric>::NAME;

            fn read_from(state: &State, index: i32) -> Result<Self> {
                read_numeric(state, index)
            }
        }
    )*};
}

numeric_stack!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: ToStack> ToStack for Option<T> {
    fn push_to(self, state: &State) -> Result<()> {
        match self {
            Some(v) => v.push_to(state),
            None => {
                state.push_nil();
                Ok(())
            }
        }
    }
}

impl<T: FromStack> FromStack for Option<T> {
    const ACCEPTS_NIL: bool = true;
    const EXPECTED: &'static str = T::EXPECTED;

    fn read_from(state: &State, index: i32) -> Result<Self> {
        if state.is_none_or_nil(index) {
            return Ok(None);
        }
        T::read_from(state, index).map(Some)
    }
}

/// Pushed as a sequence table `{v1, v2, ...}`.
impl<T: ToStack> ToStack for Vec<T> {
    fn push_to(self, state: &State) -> Result<()> {
        let guard = SlotGuard::new(state);
        state.new_table();
        for (i, item) in self.into_iter().enumerate() {
            item.push_to(state)?;
            state.raw_set_i(-2, i as i64 + 1).map_err(|_| BridgeError::not_a_table("sequence"))?;
        }
        guard.disarm();
        Ok(())
    }
}

impl<T: FromStack> FromStack for Vec<T> {
    const EXPECTED: &'static str = "sequence table";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        if !state.is_table(index) {
            return Err(unexpected(Self::EXPECTED, state, index));
        }
        let index = state.abs_index(index);
        let len = state.raw_len(index);
        let mut out = Vec::with_capacity(len);
        for i in 1..=len {
            let guard = SlotGuard::new(state);
            state.raw_get_i(index, i as i64).map_err(|_| BridgeError::not_a_table("sequence"))?;
            out.push(T::read_from(state, -1)?);
            drop(guard);
        }
        Ok(out)
    }
}

// ---- structured values --------------------------------------------------------

/// Writes named fields into the table being built for an [`IntoFields`] value.
pub struct FieldWriter<'s> {
    state: &'s State,
    table: i32,
}

impl FieldWriter<'_> {
    pub fn field<V: ToStack>(&mut self, name: &str, value: V) -> Result<&mut Self> {
        let guard = SlotGuard::new(self.state);
        self.state.push_string(name);
        value.push_to(self.state)?;
        self.state
            .set_table(self.table)
            .map_err(|_| BridgeError::not_a_table(name))?;
        drop(guard);
        Ok(self)
    }
}

/// Decomposes a host value into named fields; such values push as tables.
pub trait IntoFields {
    fn write_fields(self, fields: &mut FieldWriter<'_>) -> Result<()>;
}

impl<T: IntoFields> ToStack for T {
    fn push_to(self, state: &State) -> Result<()> {
        let guard = SlotGuard::new(state);
        state.new_table();
        let mut writer = FieldWriter {
            state,
            table: state.abs_index(-1),
        };
        self.write_fields(&mut writer)?;
        guard.disarm();
        Ok(())
    }
}

impl<V: ToStack> IntoFields for BTreeMap<String, V> {
    fn write_fields(self, fields: &mut FieldWriter<'_>) -> Result<()> {
        for (name, value) in self {
            fields.field(&name, value)?;
        }
        Ok(())
    }
}

impl<V: ToStack, S: BuildHasher> IntoFields for HashMap<String, V, S> {
    fn write_fields(self, fields: &mut FieldWriter<'_>) -> Result<()> {
        for (name, value) in self {
            fields.field(&name, value)?;
        }
        Ok(())
    }
}

/// Flat text view of a table, in traversal order.
///
/// Keys and scalar values are read as text; nested tables, functions and
/// threads read as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| BridgeError::unresolved(name))
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T> {
        let raw = self.require(name)?;
        raw.trim().parse().map_err(|_| BridgeError::InvalidField {
            field: name.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn text_of(value: &Val) -> String {
    match value {
        Val::Table(_) | Val::Function(_) | Val::Thread(_) | Val::Nil => String::new(),
        Val::Bool(b) => b.to_string(),
        v => v.to_str().map(|s| s.to_string()).unwrap_or_default(),
    }
}

impl FieldMap {
    /// Reads the table at `index` without leaving anything on the stack.
    pub fn read(state: &State, index: i32) -> Result<Self> {
        if !state.is_table(index) {
            return Err(BridgeError::UnexpectedType {
                expected: "table",
                found: state.type_name(index),
            });
        }
        let index = state.abs_index(index);
        let guard = SlotGuard::new(state);
        let mut entries = Vec::new();
        state.push_nil();
        while state.next(index).map_err(|_| BridgeError::not_a_table("table"))? {
            entries.push((text_of(&state.get(-2)), text_of(&state.get(-1))));
            state.pop(1);
        }
        drop(guard);
        Ok(FieldMap { entries })
    }
}

/// Composes a host value from the named fields of a table.
pub trait FromFields: Sized {
    fn from_fields(fields: &FieldMap) -> Result<Self>;
}

impl<T: FromFields> FromStack for T {
    const EXPECTED: &'static str = "table";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        let fields = FieldMap::read(state, index)?;
        T::from_fields(&fields)
    }
}

impl FromFields for FieldMap {
    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(fields.clone())
    }
}

impl FromFields for BTreeMap<String, String> {
    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }
}

impl<S: BuildHasher + Default> FromFields for HashMap<String, String, S> {
    fn from_fields(fields: &FieldMap) -> Result<Self> {
        Ok(fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }
}
