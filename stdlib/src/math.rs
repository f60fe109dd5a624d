use anyhow::Result;
use moonbridge_core::val::NativeFn;
use moonbridge_core::{State, Val};

use crate::Library;
use crate::args::{arg_error, check_any, check_number};

pub struct MathLibrary;

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("abs", abs),
    ("ceil", ceil),
    ("floor", floor),
    ("sqrt", sqrt),
    ("sin", sin),
    ("cos", cos),
    ("tan", tan),
    ("exp", exp),
    ("log", log),
    ("fmod", fmod),
    ("modf", modf),
    ("max", max),
    ("min", min),
    ("tointeger", tointeger),
    ("type", type_),
];

impl Library for MathLibrary {
    fn name(&self) -> &'static str {
        "math"
    }

    fn functions(&self) -> &'static [(&'static str, NativeFn)] {
        FUNCTIONS
    }

    fn constants(&self) -> Vec<(&'static str, Val)> {
        vec![
            ("pi", Val::Float(std::f64::consts::PI)),
            ("huge", Val::Float(f64::INFINITY)),
            ("maxinteger", Val::Int(i64::MAX)),
            ("mininteger", Val::Int(i64::MIN)),
        ]
    }
}

/// Number argument with its representation kept (integers stay integers).
fn check_numeric(state: &State, n: i32, func: &str) -> Result<Val> {
    match state.get(n) {
        v @ (Val::Int(_) | Val::Float(_)) => Ok(v),
        Val::Str(s) => match moonbridge_core::val::str_to_number(&s) {
            Some(v) => Ok(v),
            None => Err(arg_error(n, func, "number expected, got string")),
        },
        _ => check_number(state, n, func).map(Val::Float),
    }
}

/// Integral float results become integers when they fit.
fn integral(f: f64) -> Val {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Val::Int(f as i64)
    } else {
        Val::Float(f)
    }
}

fn float_fn(state: &State, func: &str, op: fn(f64) -> f64) -> Result<usize> {
    let x = check_number(state, 1, func)?;
    state.push_number(op(x));
    Ok(1)
}

fn abs(state: &State) -> Result<usize> {
    match check_numeric(state, 1, "abs")? {
        Val::Int(i) => state.push_integer(i.wrapping_abs()),
        v => state.push_number(v.to_number().unwrap_or_default().abs()),
    }
    Ok(1)
}

fn ceil(state: &State) -> Result<usize> {
    match check_numeric(state, 1, "ceil")? {
        Val::Int(i) => state.push_integer(i),
        v => state.push(integral(v.to_number().unwrap_or_default().ceil())),
    }
    Ok(1)
}

fn floor(state: &State) -> Result<usize> {
    match check_numeric(state, 1, "floor")? {
        Val::Int(i) => state.push_integer(i),
        v => state.push(integral(v.to_number().unwrap_or_default().floor())),
    }
    Ok(1)
}

fn sqrt(state: &State) -> Result<usize> {
    float_fn(state, "sqrt", f64::sqrt)
}

fn sin(state: &State) -> Result<usize> {
    float_fn(state, "sin", f64::sin)
}

fn cos(state: &State) -> Result<usize> {
    float_fn(state, "cos", f64::cos)
}

fn tan(state: &State) -> Result<usize> {
    float_fn(state, "tan", f64::tan)
}

fn exp(state: &State) -> Result<usize> {
    float_fn(state, "exp", f64::exp)
}

fn log(state: &State) -> Result<usize> {
    let x = check_number(state, 1, "log")?;
    let result = if state.is_none_or_nil(2) {
        x.ln()
    } else {
        match check_number(state, 2, "log")? {
            b if b == 2.0 => x.log2(),
            b if b == 10.0 => x.log10(),
            b => x.ln() / b.ln(),
        }
    };
    state.push_number(result);
    Ok(1)
}

fn fmod(state: &State) -> Result<usize> {
    match (check_numeric(state, 1, "fmod")?, check_numeric(state, 2, "fmod")?) {
        (Val::Int(_), Val::Int(0)) => return Err(arg_error(2, "fmod", "zero")),
        (Val::Int(a), Val::Int(b)) => state.push_integer(a.wrapping_rem(b)),
        (a, b) => state.push_number(a.to_number().unwrap_or_default() % b.to_number().unwrap_or_default()),
    }
    Ok(1)
}

fn modf(state: &State) -> Result<usize> {
    let x = check_number(state, 1, "modf")?;
    let int_part = if x.is_infinite() { x } else { x.trunc() };
    let frac = if x.is_infinite() { 0.0 } else { x - int_part };
    state.push_number(int_part);
    state.push_number(frac);
    Ok(2)
}

fn extreme(state: &State, func: &str, pick_later: fn(&Val, &Val) -> Result<bool>) -> Result<usize> {
    let mut best = check_numeric(state, 1, func)?;
    for i in 2..=state.top() {
        let v = check_numeric(state, i, func)?;
        if pick_later(&best, &v)? {
            best = v;
        }
    }
    state.push(best);
    Ok(1)
}

fn max(state: &State) -> Result<usize> {
    extreme(state, "max", |best, v| moonbridge_core::op::compare_lt(best, v))
}

fn min(state: &State) -> Result<usize> {
    extreme(state, "min", |best, v| moonbridge_core::op::compare_lt(v, best))
}

fn tointeger(state: &State) -> Result<usize> {
    match state.get(1) {
        Val::Int(i) => state.push_integer(i),
        Val::Float(f) => match Val::Float(f).to_integer() {
            Some(i) => state.push_integer(i),
            None => state.push_nil(),
        },
        _ => state.push_nil(),
    }
    Ok(1)
}

fn type_(state: &State) -> Result<usize> {
    match check_any(state, 1, "type")? {
        Val::Int(_) => state.push_string("integer"),
        Val::Float(_) => state.push_string("float"),
        _ => state.push_nil(),
    }
    Ok(1)
}
