use std::io::Write;

use anyhow::{Result, anyhow};
use moonbridge_core::state::ScriptError;
use moonbridge_core::val::{NativeFn, str_to_number};
use moonbridge_core::{MULTRET, State, Status, Val};

use crate::Library;
use crate::args::{arg_error, check_any, check_integer, check_table, opt_integer, push_all};

/// Global functions (`print`, `pairs`, `pcall`, ...).
pub struct BaseLibrary;

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("print", print),
    ("type", type_),
    ("tostring", tostring),
    ("tonumber", tonumber),
    ("pairs", pairs),
    ("ipairs", ipairs),
    ("next", next),
    ("select", select),
    ("error", error),
    ("assert", assert),
    ("pcall", pcall),
    ("rawget", rawget),
    ("rawset", rawset),
    ("rawequal", rawequal),
    ("rawlen", rawlen),
    ("unpack", unpack),
];

impl Library for BaseLibrary {
    fn name(&self) -> &'static str {
        "_G"
    }

    fn functions(&self) -> &'static [(&'static str, NativeFn)] {
        FUNCTIONS
    }

    fn open(&self, state: &State) -> Result<()> {
        let globals = state.globals();
        let mut globals = globals.borrow_mut();
        for (name, func) in FUNCTIONS {
            globals.set_str(name, Val::native(*func));
        }
        globals.set_str("_G", Val::Table(state.globals()));
        globals.set_str("_VERSION", Val::from("Lua 5.1"));
        Ok(())
    }
}

fn print(state: &State) -> Result<usize> {
    let line = (1..=state.top())
        .map(|i| state.get(i).to_string())
        .collect::<Vec<_>>()
        .join("\t");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}", line)?;
    Ok(0)
}

fn type_(state: &State) -> Result<usize> {
    let v = check_any(state, 1, "type")?;
    state.push_string(v.type_name());
    Ok(1)
}

fn tostring(state: &State) -> Result<usize> {
    let v = check_any(state, 1, "tostring")?;
    state.push(Val::from(v.to_string()));
    Ok(1)
}

fn tonumber(state: &State) -> Result<usize> {
    if state.is_none_or_nil(2) {
        let v = check_any(state, 1, "tonumber")?;
        let n = match v {
            Val::Int(_) | Val::Float(_) => v,
            Val::Str(s) => str_to_number(&s).unwrap_or_default(),
            _ => Val::Nil,
        };
        state.push(n);
        return Ok(1);
    }
    let base = check_integer(state, 2, "tonumber")?;
    if !(2..=36).contains(&base) {
        return Err(arg_error(2, "tonumber", "base out of range"));
    }
    let text = state.get(1).to_str().ok_or_else(|| arg_error(1, "tonumber", "string expected"))?;
    let text = text.trim().to_ascii_lowercase();
    let (neg, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.as_str()),
    };
    match i64::from_str_radix(digits, base as u32) {
        Ok(n) if !digits.is_empty() => state.push_integer(if neg { n.wrapping_neg() } else { n }),
        _ => state.push_nil(),
    }
    Ok(1)
}

fn next(state: &State) -> Result<usize> {
    check_table(state, 1, "next")?;
    state.set_top(2);
    if state.next(1)? {
        Ok(2)
    } else {
        state.push_nil();
        Ok(1)
    }
}

fn pairs(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "pairs")?;
    state.push_function(next);
    state.push(Val::Table(t));
    state.push_nil();
    Ok(3)
}

fn ipairs_step(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "ipairs")?;
    let i = check_integer(state, 2, "ipairs")?.wrapping_add(1);
    let v = t.borrow().get_int(i);
    if v.is_nil() {
        state.push_nil();
        return Ok(1);
    }
    state.push_integer(i);
    state.push(v);
    Ok(2)
}

fn ipairs(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "ipairs")?;
    state.push_function(ipairs_step);
    state.push(Val::Table(t));
    state.push_integer(0);
    Ok(3)
}

fn select(state: &State) -> Result<usize> {
    let count = state.top() - 1;
    if state.to_str(1).as_deref() == Some("#") {
        state.push_integer(count as i64);
        return Ok(1);
    }
    let n = check_integer(state, 1, "select")?;
    let first = if n < 0 {
        if -n > count as i64 {
            return Err(arg_error(1, "select", "index out of range"));
        }
        count as i64 + n + 1
    } else if n == 0 {
        return Err(arg_error(1, "select", "index out of range"));
    } else {
        n.min(count as i64 + 1)
    };
    Ok((count as i64 - first + 1).max(0) as usize)
}

fn error(state: &State) -> Result<usize> {
    let level = opt_integer(state, 2, "error", 1)?;
    match state.get(1) {
        Val::Str(msg) if level > 0 => Err(anyhow!("{}", msg)),
        Val::Str(msg) => Err(anyhow::Error::new(ScriptError::new(msg.to_string()))),
        other => Err(state.raise(other)),
    }
}

fn assert(state: &State) -> Result<usize> {
    let v = check_any(state, 1, "assert")?;
    if v.truthy() {
        return Ok(state.top() as usize);
    }
    match state.get(2) {
        Val::Nil => Err(anyhow!("assertion failed!")),
        Val::Str(msg) => Err(anyhow::Error::new(ScriptError::new(msg.to_string()))),
        other => Err(state.raise(other)),
    }
}

fn pcall(state: &State) -> Result<usize> {
    check_any(state, 1, "pcall")?;
    let nargs = state.top() - 1;
    let ok = state.pcall(nargs, MULTRET) == Status::Ok;
    state.push_bool(ok);
    state.insert(1);
    Ok(state.top() as usize)
}

fn rawget(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "rawget")?;
    let k = check_any(state, 2, "rawget")?;
    let v = t.borrow().get(&k);
    state.push(v);
    Ok(1)
}

fn rawset(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "rawset")?;
    let k = check_any(state, 2, "rawset")?;
    let v = check_any(state, 3, "rawset")?;
    t.borrow_mut().set(k, v)?;
    state.push(Val::Table(t));
    Ok(1)
}

fn rawequal(state: &State) -> Result<usize> {
    check_any(state, 1, "rawequal")?;
    check_any(state, 2, "rawequal")?;
    state.push_bool(state.raw_equal(1, 2));
    Ok(1)
}

fn rawlen(state: &State) -> Result<usize> {
    match state.get(1) {
        Val::Table(_) | Val::Str(_) => {
            state.push_integer(state.raw_len(1) as i64);
            Ok(1)
        }
        _ => Err(arg_error(1, "rawlen", "table or string expected")),
    }
}

pub(crate) fn unpack(state: &State) -> Result<usize> {
    let t = check_table(state, 1, "unpack")?;
    let first = opt_integer(state, 2, "unpack", 1)?;
    let last = match state.is_none_or_nil(3) {
        true => t.borrow().len(),
        false => check_integer(state, 3, "unpack")?,
    };
    if first > last {
        return Ok(0);
    }
    if last - first >= 1_000_000 {
        return Err(anyhow!("too many results to unpack"));
    }
    let t = t.borrow();
    Ok(push_all(state, (first..=last).map(|i| t.get_int(i))))
}
