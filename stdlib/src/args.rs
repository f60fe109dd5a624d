//! Argument checking shared by the native libraries.

use std::rc::Rc;

use anyhow::{Result, anyhow};
use moonbridge_core::{State, TableRef, Val};

pub(crate) fn arg_error(n: i32, func: &str, msg: &str) -> anyhow::Error {
    anyhow!("bad argument #{} to '{}' ({})", n, func, msg)
}

fn type_error(state: &State, n: i32, func: &str, expected: &str) -> anyhow::Error {
    let got = if n > state.top() { "no value" } else { state.type_name(n) };
    arg_error(n, func, &format!("{} expected, got {}", expected, got))
}

pub(crate) fn check_any(state: &State, n: i32, func: &str) -> Result<Val> {
    if n > state.top() {
        return Err(arg_error(n, func, "value expected"));
    }
    Ok(state.get(n))
}

pub(crate) fn check_table(state: &State, n: i32, func: &str) -> Result<TableRef> {
    match state.get(n) {
        Val::Table(t) => Ok(t),
        _ => Err(type_error(state, n, func, "table")),
    }
}

pub(crate) fn check_integer(state: &State, n: i32, func: &str) -> Result<i64> {
    match state.get(n) {
        v @ (Val::Int(_) | Val::Float(_) | Val::Str(_)) => match v.to_integer() {
            Some(i) => Ok(i),
            None if v.to_number().is_some() => Err(arg_error(n, func, "number has no integer representation")),
            None => Err(type_error(state, n, func, "number")),
        },
        _ => Err(type_error(state, n, func, "number")),
    }
}

pub(crate) fn opt_integer(state: &State, n: i32, func: &str, default: i64) -> Result<i64> {
    if state.is_none_or_nil(n) {
        Ok(default)
    } else {
        check_integer(state, n, func)
    }
}

pub(crate) fn check_number(state: &State, n: i32, func: &str) -> Result<f64> {
    state.to_number(n).ok_or_else(|| type_error(state, n, func, "number"))
}

pub(crate) fn check_str(state: &State, n: i32, func: &str) -> Result<Rc<str>> {
    state.get(n).to_str().ok_or_else(|| type_error(state, n, func, "string"))
}

pub(crate) fn opt_str(state: &State, n: i32, func: &str) -> Result<Option<Rc<str>>> {
    if state.is_none_or_nil(n) {
        Ok(None)
    } else {
        check_str(state, n, func).map(Some)
    }
}

/// Pushes every value and returns how many were pushed.
pub(crate) fn push_all(state: &State, values: impl IntoIterator<Item = Val>) -> usize {
    let mut n = 0;
    for v in values {
        state.push(v);
        n += 1;
    }
    n
}
