use std::fmt;

use moonbridge_core::{State, Status};

use crate::error::{BridgeError, Result};
use crate::path::{DottedPath, resolve_function};
use crate::stack::{FromStack, SlotGuard, ToStack};
use crate::value::ScriptValue;

/// A script function and the number of results it is declared to return.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptFunction {
    name: DottedPath,
    results: usize,
}

impl ScriptFunction {
    pub fn new(name: &str, results: usize) -> Result<Self> {
        Ok(ScriptFunction {
            name: DottedPath::parse(name)?,
            results,
        })
    }

    /// A function called for its effects only.
    pub fn procedure(name: &str) -> Result<Self> {
        Self::new(name, 0)
    }

    pub fn from_path(name: DottedPath, results: usize) -> Self {
        ScriptFunction { name, results }
    }

    pub fn name(&self) -> &DottedPath {
        &self.name
    }

    pub fn results(&self) -> usize {
        self.results
    }
}

impl fmt::Display for ScriptFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.results)
    }
}

/// Arguments pushed left to right before a call.
pub trait Args {
    /// Pushes every argument, returning how many slots were pushed.
    fn push_all(self, state: &State) -> Result<i32>;
}

impl Args for () {
    fn push_all(self, _state: &State) -> Result<i32> {
        Ok(0)
    }
}

impl<T: ToStack> Args for T {
    fn push_all(self, state: &State) -> Result<i32> {
        self.push_to(state)?;
        Ok(1)
    }
}

/// A run-time number of arguments, pushed one slot each.
#[derive(Debug, Clone, PartialEq)]
pub struct Spread<T>(pub Vec<T>);

impl<T: ToStack> Args for Spread<T> {
    fn push_all(self, state: &State) -> Result<i32> {
        let count = self.0.len() as i32;
        for arg in self.0 {
            arg.push_to(state)?;
        }
        Ok(count)
    }
}

/// Host-side bindings for the results of a call.
pub trait Returns: Sized {
    const COUNT: usize;

    /// Reads `COUNT` results; the last one is on top of the stack.
    fn read_all(state: &State) -> Result<Self>;
}

impl Returns for () {
    const COUNT: usize = 0;

    fn read_all(_state: &State) -> Result<Self> {
        Ok(())
    }
}

impl<T: FromStack> Returns for T {
    const COUNT: usize = 1;

    fn read_all(state: &State) -> Result<Self> {
        T::read_from(state, -1)
    }
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! tuple_calls {
    ($($name:ident),+) => {
        impl<$($name: ToStack),+> Args for ($($name,)+) {
            #[allow(non_snake_case)]
            fn push_all(self, state: &State) -> Result<i32> {
                let ($($name,)+) = self;
                $($name.push_to(state)?;)+
                Ok(count!($($name)+) as i32)
            }
        }

        impl<$($name: FromStack),+> Returns for ($($name,)+) {
            const COUNT: usize = count!($($name)+);

            fn read_all(state: &State) -> Result<Self> {
                // first result sits COUNT slots below the top
                let mut next = -(Self::COUNT as i32);
                Ok(($({
                    next += 1;
                    $name::read_from(state, next - 1)?
                },)+))
            }
        }
    };
}

tuple_calls!(A);
tuple_calls!(A, B);
tuple_calls!(A, B, C);
tuple_calls!(A, B, C, D);
tuple_calls!(A, B, C, D, E);
tuple_calls!(A, B, C, D, E, F);
tuple_calls!(A, B, C, D, E, F, G);
tuple_calls!(A, B, C, D, E, F, G, H);

/// Calls `function` with `args` and reads its results as `R`.
///
/// The result count of `R` is checked against the declaration before the
/// interpreter is touched. The stack is back at its original depth afterwards,
/// whatever the outcome.
pub fn invoke<R: Returns, A: Args>(state: &State, function: &ScriptFunction, args: A) -> Result<R> {
    if R::COUNT > 0 && function.results == 0 {
        return Err(BridgeError::NoReturnValues {
            function: function.name.to_string(),
        });
    }
    if R::COUNT != function.results {
        return Err(BridgeError::ArityMismatch {
            function: function.name.to_string(),
            declared: function.results,
            requested: R::COUNT,
        });
    }
    call_then(state, function, args, R::read_all)
}

/// Calls `function` and snapshots however many results it declares.
pub fn invoke_values<A: Args>(state: &State, function: &ScriptFunction, args: A) -> Result<Vec<ScriptValue>> {
    call_then(state, function, args, |state| {
        let count = function.results as i32;
        (0..count)
            .map(|i| ScriptValue::read_from(state, i - count))
            .collect()
    })
}

fn call_then<T, A: Args>(
    state: &State,
    function: &ScriptFunction,
    args: A,
    read: impl FnOnce(&State) -> Result<T>,
) -> Result<T> {
    let guard = SlotGuard::new(state);
    resolve_function(state, &function.name)?;
    let nargs = args.push_all(state)?;
    tracing::debug!(target: "moonbridge::call", function = %function.name, nargs, results = function.results, "calling");
    if state.pcall(nargs, function.results as i32) != Status::Ok {
        let message = state
            .to_str(-1)
            .unwrap_or_else(|| format!("({} error object)", state.type_name(-1)));
        tracing::debug!(target: "moonbridge::call", function = %function.name, %message, "call failed");
        return Err(BridgeError::ScriptRuntime {
            function: function.name.to_string(),
            message,
        });
    }
    let values = read(state)?;
    drop(guard);
    Ok(values)
}
