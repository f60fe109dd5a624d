use std::fmt;

use moonbridge_core::{State, ValueType};

use crate::error::{BridgeError, Result};
use crate::function::{Args, Returns, ScriptFunction, invoke};
use crate::path::{DottedPath, resolve, resolve_parent};
use crate::registry::{self, HostFunction};
use crate::stack::{FromStack, SlotGuard, ToStack};

/// A lazy reference to the value at a dotted path in one context.
///
/// Nothing is resolved until an operation runs, and every operation leaves the
/// stack as it found it.
#[derive(Clone)]
pub struct ValueRef {
    state: State,
    path: DottedPath,
}

impl ValueRef {
    pub fn new(state: State, path: DottedPath) -> Self {
        ValueRef { state, path }
    }

    pub fn path(&self) -> &DottedPath {
        &self.path
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// Reference to `name` inside this value.
    pub fn field(&self, name: &str) -> Result<ValueRef> {
        Ok(ValueRef {
            state: self.state.clone(),
            path: self.path.join(name)?,
        })
    }

    pub fn get<T: FromStack>(&self) -> Result<T> {
        let guard = SlotGuard::new(&self.state);
        resolve(&self.state, &self.path)?;
        if !T::ACCEPTS_NIL && self.state.is_nil(-1) {
            return Err(BridgeError::unresolved(self.path.to_string()));
        }
        let value = T::read_from(&self.state, -1)?;
        drop(guard);
        Ok(value)
    }

    pub fn set<T: ToStack>(&self, value: T) -> Result<()> {
        let state = &self.state;
        let guard = SlotGuard::new(state);
        resolve_parent(state, &self.path)?;
        if self.path.is_global() {
            value.push_to(state)?;
            state.set_global(self.path.head());
        } else {
            state.push_string(self.path.last());
            value.push_to(state)?;
            state
                .set_table(-3)
                .map_err(|_| BridgeError::not_a_table(self.path.last()))?;
        }
        drop(guard);
        Ok(())
    }

    pub fn is_nil(&self) -> Result<bool> {
        let guard = SlotGuard::new(&self.state);
        resolve(&self.state, &self.path)?;
        let nil = self.state.is_nil(-1);
        drop(guard);
        Ok(nil)
    }

    pub fn value_type(&self) -> Result<ValueType> {
        let guard = SlotGuard::new(&self.state);
        resolve(&self.state, &self.path)?;
        let ty = self.state.type_of(-1);
        drop(guard);
        Ok(ty)
    }

    /// Raw equality of the two referenced values.
    pub fn equals(&self, other: &ValueRef) -> Result<bool> {
        self.compare(other, |state| Ok(state.raw_equal(-2, -1)))
    }

    pub fn less_than(&self, other: &ValueRef) -> Result<bool> {
        self.compare(other, |state| {
            state.less_than(-2, -1).map_err(|_| BridgeError::UnexpectedType {
                expected: "two numbers or two strings",
                found: state.type_name(-1),
            })
        })
    }

    /// Resolves both values onto this context's stack and applies `op` to
    /// slots -2 (self) and -1 (other).
    fn compare(&self, other: &ValueRef, op: impl FnOnce(&State) -> Result<bool>) -> Result<bool> {
        let lhs = &self.state;
        let guard = SlotGuard::new(lhs);
        resolve(lhs, &self.path)?;

        if lhs == &other.state {
            resolve(lhs, &other.path)?;
        } else {
            let rhs = &other.state;
            let rhs_guard = SlotGuard::new(rhs);
            resolve(rhs, &other.path)?;
            let (lt, rt) = (lhs.type_of(-1), rhs.type_of(-1));
            if !is_primitive(lt) || !is_primitive(rt) {
                return Err(BridgeError::CrossContextComparison {
                    lhs: lt.name(),
                    rhs: rt.name(),
                });
            }
            State::xmove(rhs, lhs, 1);
            drop(rhs_guard);
        }
        let result = op(lhs)?;
        drop(guard);
        Ok(result)
    }

    /// Calls the referenced function, expecting `R::COUNT` results.
    pub fn call<R: Returns, A: Args>(&self, args: A) -> Result<R> {
        let function = ScriptFunction::from_path(self.path.clone(), R::COUNT);
        invoke(&self.state, &function, args)
    }

    /// Stores host function `f` at this path.
    pub fn register<M, F: HostFunction<M>>(&self, f: F) -> Result<usize> {
        registry::register(&self.state, &self.path, f)
    }

    /// Names of the referenced table's fields with the type of each value.
    pub fn fields(&self) -> Result<Vec<(String, ValueType)>> {
        let state = &self.state;
        let guard = SlotGuard::new(state);
        resolve(state, &self.path)?;
        if !state.is_table(-1) {
            return Err(BridgeError::not_a_table(self.path.to_string()));
        }
        let table = state.abs_index(-1);
        let mut out = Vec::new();
        state.push_nil();
        while state
            .next(table)
            .map_err(|_| BridgeError::not_a_table(self.path.to_string()))?
        {
            let key = match state.get(-2).to_str() {
                Some(s) => s.to_string(),
                None => state.get(-2).to_string(),
            };
            out.push((key, state.type_of(-1)));
            state.pop(1);
        }
        drop(guard);
        Ok(out)
    }
}

fn is_primitive(ty: ValueType) -> bool {
    matches!(
        ty,
        ValueType::Nil | ValueType::Boolean | ValueType::Number | ValueType::String
    )
}

impl fmt::Debug for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueRef").field(&self.path.to_string()).finish()
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}
