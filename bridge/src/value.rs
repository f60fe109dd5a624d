use std::rc::Rc;

use moonbridge_core::{State, Table, TableRef, Val, ValueType};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::{BridgeError, Result};
use crate::stack::{FromStack, ToStack};

/// Owned snapshot of an interpreter value.
///
/// Tables are copied deeply; a table that contains itself (directly or
/// through its descendants) is cut at the repeated table, which reads as an
/// empty table. Functions and threads keep only their kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Table(Vec<(ScriptValue, ScriptValue)>),
    Function,
    Thread,
}

impl ScriptValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ScriptValue::Nil => ValueType::Nil,
            ScriptValue::Boolean(_) => ValueType::Boolean,
            ScriptValue::Integer(_) | ScriptValue::Number(_) => ValueType::Number,
            ScriptValue::String(_) => ValueType::String,
            ScriptValue::Table(_) => ValueType::Table,
            ScriptValue::Function => ValueType::Function,
            ScriptValue::Thread => ValueType::Thread,
        }
    }

    /// Field lookup by string key on a table snapshot.
    pub fn get(&self, key: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Table(entries) => entries
                .iter()
                .find(|(k, _)| matches!(k, ScriptValue::String(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    fn snapshot(value: &Val, ancestors: &mut Vec<*const ()>) -> ScriptValue {
        match value {
            Val::Nil => ScriptValue::Nil,
            Val::Bool(b) => ScriptValue::Boolean(*b),
            Val::Int(i) => ScriptValue::Integer(*i),
            Val::Float(f) => ScriptValue::Number(*f),
            Val::Str(s) => ScriptValue::String(s.to_string()),
            Val::Function(_) => ScriptValue::Function,
            Val::Thread(_) => ScriptValue::Thread,
            Val::Table(t) => Self::snapshot_table(t, ancestors),
        }
    }

    fn snapshot_table(table: &TableRef, ancestors: &mut Vec<*const ()>) -> ScriptValue {
        let id = Rc::as_ptr(table) as *const ();
        if ancestors.contains(&id) {
            return ScriptValue::Table(Vec::new());
        }
        ancestors.push(id);
        let entries = table
            .borrow()
            .iter()
            .map(|(k, v)| (Self::snapshot(k, ancestors), Self::snapshot(v, ancestors)))
            .collect();
        ancestors.pop();
        ScriptValue::Table(entries)
    }

    fn to_val(&self) -> Result<Val> {
        Ok(match self {
            ScriptValue::Nil => Val::Nil,
            ScriptValue::Boolean(b) => Val::Bool(*b),
            ScriptValue::Integer(i) => Val::Int(*i),
            ScriptValue::Number(f) => Val::Float(*f),
            ScriptValue::String(s) => Val::from(s.as_str()),
            ScriptValue::Table(entries) => {
                let mut table = Table::new();
                for (k, v) in entries {
                    table.set(k.to_val()?, v.to_val()?).map_err(|e| BridgeError::InvalidField {
                        field: k.to_string(),
                        value: e.to_string(),
                    })?;
                }
                Val::table(table)
            }
            ScriptValue::Function | ScriptValue::Thread => {
                return Err(BridgeError::UnexpectedType {
                    expected: "a value that can be recreated",
                    found: self.value_type().name(),
                });
            }
        })
    }
}

impl std::fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptValue::Nil => f.write_str("nil"),
            ScriptValue::Boolean(b) => write!(f, "{}", b),
            ScriptValue::Integer(i) => write!(f, "{}", i),
            ScriptValue::Number(n) => write!(f, "{}", Val::Float(*n)),
            ScriptValue::String(s) => f.write_str(s),
            ScriptValue::Table(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match k {
                        ScriptValue::String(s) => write!(f, "{} = ", s)?,
                        other => write!(f, "[{}] = ", other)?,
                    }
                    match v {
                        ScriptValue::String(s) => write!(f, "{:?}", s)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                f.write_str("}")
            }
            ScriptValue::Function => f.write_str("function"),
            ScriptValue::Thread => f.write_str("thread"),
        }
    }
}

impl ToStack for ScriptValue {
    fn push_to(self, state: &State) -> Result<()> {
        state.push(self.to_val()?);
        Ok(())
    }
}

impl FromStack for ScriptValue {
    const ACCEPTS_NIL: bool = true;
    const EXPECTED: &'static str = "any value";

    fn read_from(state: &State, index: i32) -> Result<Self> {
        Ok(Self::snapshot(&state.get(index), &mut Vec::new()))
    }
}

/// Sequences (keys `1..=n`) serialize as arrays, other tables as maps keyed by
/// the key's text.
impl Serialize for ScriptValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ScriptValue::Nil => serializer.serialize_unit(),
            ScriptValue::Boolean(b) => serializer.serialize_bool(*b),
            ScriptValue::Integer(i) => serializer.serialize_i64(*i),
            ScriptValue::Number(n) => serializer.serialize_f64(*n),
            ScriptValue::String(s) => serializer.serialize_str(s),
            ScriptValue::Function => serializer.serialize_str("<function>"),
            ScriptValue::Thread => serializer.serialize_str("<thread>"),
            ScriptValue::Table(entries) => {
                let is_sequence = !entries.is_empty()
                    && entries
                        .iter()
                        .enumerate()
                        .all(|(i, (k, _))| *k == ScriptValue::Integer(i as i64 + 1));
                if is_sequence {
                    let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                    for (_, v) in entries {
                        seq.serialize_element(v)?;
                    }
                    seq.end()
                } else {
                    let mut map = serializer.serialize_map(Some(entries.len()))?;
                    for (k, v) in entries {
                        map.serialize_entry(&k.to_string(), v)?;
                    }
                    map.end()
                }
            }
        }
    }
}
