//! Host functions callable from scripts.
//!
//! Registered functions live in a process-wide, append-only arena. The script
//! sees a native trampoline closure whose single upvalue is the arena index.

use std::fmt::Display;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{anyhow, bail};
use moonbridge_core::{State, upvalue_index};
use once_cell::sync::Lazy;

use crate::error::{BridgeError, Result};
use crate::path::{DottedPath, resolve_parent};
use crate::stack::{FromStack, SlotGuard, ToStack};

type Thunk = Arc<dyn Fn(&State) -> anyhow::Result<usize> + Send + Sync>;

struct Entry {
    name: Arc<str>,
    arity: usize,
    thunk: Thunk,
}

static FUNCTIONS: Lazy<RwLock<Vec<Entry>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// What a host function returns to the script.
pub trait HostReturn {
    /// Pushes the results, returning how many were pushed.
    fn push_results(self, state: &State) -> anyhow::Result<usize>;
}

impl HostReturn for () {
    fn push_results(self, _state: &State) -> anyhow::Result<usize> {
        Ok(0)
    }
}

impl<T: ToStack> HostReturn for T {
    fn push_results(self, state: &State) -> anyhow::Result<usize> {
        self.push_to(state)?;
        Ok(1)
    }
}

/// `Err` becomes a script-level error carrying the error's message.
impl<T: HostReturn, E: Display> HostReturn for std::result::Result<T, E> {
    fn push_results(self, state: &State) -> anyhow::Result<usize> {
        match self {
            Ok(v) => v.push_results(state),
            Err(e) => Err(anyhow!("{}", e)),
        }
    }
}

/// Host closures that can be exposed to scripts.
///
/// Implemented for `Fn(A1, ..., An) -> R` with up to eight arguments, where
/// each argument is [`FromStack`] and `R` is [`HostReturn`]. `Marker` only
/// disambiguates the implementations.
pub trait HostFunction<Marker>: Send + Sync + 'static {
    const ARITY: usize;

    fn call_with(&self, state: &State) -> anyhow::Result<usize>;
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! host_function {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg,)*> HostFunction<fn($($arg,)*) -> Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: HostReturn,
            $($arg: FromStack,)*
        {
            const ARITY: usize = count!($($arg)*);

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call_with(&self, state: &State) -> anyhow::Result<usize> {
                let mut index = 0;
                $(
                    index += 1;
                    let $arg = $arg::read_from(state, index)?;
                )*
                (self)($($arg),*).push_results(state)
            }
        }
    };
}

host_function!();
host_function!(A);
host_function!(A, B);
host_function!(A, B, C);
host_function!(A, B, C, D);
host_function!(A, B, C, D, E);
host_function!(A, B, C, D, E, F);
host_function!(A, B, C, D, E, F, G);
host_function!(A, B, C, D, E, F, G, H);

fn trampoline(state: &State) -> anyhow::Result<usize> {
    let index = state
        .to_integer(upvalue_index(1))
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| anyhow!("host function trampoline without an index"))?;
    let (name, arity, thunk) = {
        let arena = FUNCTIONS.read().unwrap_or_else(PoisonError::into_inner);
        let entry = arena
            .get(index)
            .ok_or_else(|| anyhow!("no host function registered at index {}", index))?;
        (entry.name.clone(), entry.arity, entry.thunk.clone())
    };
    let given = state.top() as usize;
    if given != arity {
        bail!(
            "host function '{}' expects {} argument(s) but was called with {}",
            name,
            arity,
            given
        );
    }
    thunk(state)
}

/// Registers `f` and stores its trampoline at `path` (a global or a field of
/// an existing table). Returns the arena index.
pub fn register<M, F: HostFunction<M>>(state: &State, path: &DottedPath, f: F) -> Result<usize> {
    let guard = SlotGuard::new(state);
    resolve_parent(state, path)?;

    let index = {
        let mut arena = FUNCTIONS.write().unwrap_or_else(PoisonError::into_inner);
        arena.push(Entry {
            name: Arc::from(path.to_string()),
            arity: F::ARITY,
            thunk: Arc::new(move |state: &State| f.call_with(state)),
        });
        arena.len() - 1
    };

    if path.is_global() {
        state.push_integer(index as i64);
        state.push_closure(trampoline, 1);
        state.set_global(path.head());
    } else {
        state.push_string(path.last());
        state.push_integer(index as i64);
        state.push_closure(trampoline, 1);
        state
            .set_table(-3)
            .map_err(|_| BridgeError::not_a_table(path.last()))?;
    }
    drop(guard);
    tracing::debug!(target: "moonbridge::registry", index, function = %path, arity = F::ARITY, "host function registered");
    Ok(index)
}

/// Number of host functions registered in this process.
pub fn registered_count() -> usize {
    FUNCTIONS.read().unwrap_or_else(PoisonError::into_inner).len()
}
