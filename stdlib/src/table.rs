use anyhow::{Result, anyhow};
use moonbridge_core::op::compare_lt;
use moonbridge_core::val::NativeFn;
use moonbridge_core::{State, Val};

use crate::Library;
use crate::args::{arg_error, check_any, check_integer, check_table, opt_str};

pub struct TableLibrary;

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("insert", insert),
    ("remove", remove),
    ("concat", concat),
    ("sort", sort),
    ("unpack", crate::base::unpack),
];

impl Library for TableLibrary {
    fn name(&self) -> &'static str {
        "table"
    }

    fn functions(&self) -> &'static [(&'static str, NativeFn)] {
        FUNCTIONS
    }
}

fn insert(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "insert")?;
    let len = t.borrow().len();
    match state.top() {
        2 => {
            let v = state.get(2);
            t.borrow_mut().set_int(len + 1, v);
        }
        3 => {
            let pos = check_integer(state, 2, "insert")?;
            if pos < 1 || pos > len + 1 {
                return Err(arg_error(2, "insert", "position out of bounds"));
            }
            let mut t = t.borrow_mut();
            for i in (pos..=len).rev() {
                let v = t.get_int(i);
                t.set_int(i + 1, v);
            }
            t.set_int(pos, state.get(3));
        }
        _ => return Err(anyhow!("wrong number of arguments to 'insert'")),
    }
    Ok(0)
}

fn remove(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "remove")?;
    let len = t.borrow().len();
    let pos = if state.is_none_or_nil(2) { len } else { check_integer(state, 2, "remove")? };
    if len == 0 && state.is_none_or_nil(2) {
        state.push_nil();
        return Ok(1);
    }
    if len + 1 == pos {
        state.push(t.borrow().get_int(pos));
        t.borrow_mut().set_int(pos, Val::Nil);
        return Ok(1);
    }
    if pos < 1 || pos > len + 1 {
        return Err(arg_error(2, "remove", "position out of bounds"));
    }
    let mut t = t.borrow_mut();
    let removed = t.get_int(pos);
    for i in pos..len {
        let v = t.get_int(i + 1);
        t.set_int(i, v);
    }
    t.set_int(len, Val::Nil);
    state.push(removed);
    Ok(1)
}

fn concat(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "concat")?;
    let sep = opt_str(state, 2, "concat")?.unwrap_or_else(|| "".into());
    let first = if state.is_none_or_nil(3) { 1 } else { check_integer(state, 3, "concat")? };
    let last = if state.is_none_or_nil(4) { t.borrow().len() } else { check_integer(state, 4, "concat")? };
    let t = t.borrow();
    let mut parts = Vec::new();
    for i in first..=last {
        let v = t.get_int(i);
        match v.to_str() {
            Some(s) => parts.push(s),
            None => {
                return Err(anyhow!("invalid value (at index {}) in table for 'concat'", i));
            }
        }
    }
    let joined = parts.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(&*sep);
    state.push(Val::from(joined));
    Ok(1)
}

fn sort(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "sort")?;
    let comparator = match state.is_none_or_nil(2) {
        true => None,
        false => match check_any(state, 2, "sort")? {
            f @ Val::Function(_) => Some(f),
            _ => return Err(arg_error(2, "sort", "function expected")),
        },
    };
    let len = t.borrow().len();
    let values: Vec<Val> = {
        let t = t.borrow();
        (1..=len).map(|i| t.get_int(i)).collect()
    };
    let less = |x: &Val, y: &Val| -> Result<bool> {
        match &comparator {
            Some(f) => Ok(state
                .call_value(f, vec![x.clone(), y.clone()])?
                .first()
                .is_some_and(Val::truthy)),
            None => compare_lt(x, y),
        }
    };
    let sorted = merge_sort(values, &less)?;

    let mut t = t.borrow_mut();
    for (i, v) in sorted.into_iter().enumerate() {
        t.set_int(i as i64 + 1, v);
    }
    Ok(0)
}

/// Stable merge sort with a comparator that can fail.
fn merge_sort(mut values: Vec<Val>, less: &dyn Fn(&Val, &Val) -> Result<bool>) -> Result<Vec<Val>> {
    if values.len() <= 1 {
        return Ok(values);
    }
    let right = values.split_off(values.len() / 2);
    let left = merge_sort(values, less)?;
    let right = merge_sort(right, less)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => less(r, l)?,
            _ => break,
        };
        if take_right {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}
