use anyhow::{Result, anyhow};
use moonbridge_core::val::{NativeFn, format_general};
use moonbridge_core::{State, Val};

use crate::Library;
use crate::args::{arg_error, check_any, check_integer, check_str, opt_integer, push_all};

/// `string` table; also installed as the method table of string values.
pub struct StringLibrary;

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("len", len),
    ("sub", sub),
    ("upper", upper),
    ("lower", lower),
    ("rep", rep),
    ("reverse", reverse),
    ("byte", byte),
    ("char", char_),
    ("find", find),
    ("format", format),
];

impl Library for StringLibrary {
    fn name(&self) -> &'static str {
        "string"
    }

    fn functions(&self) -> &'static [(&'static str, NativeFn)] {
        FUNCTIONS
    }

    fn open(&self, state: &State) -> Result<()> {
        let methods = Val::table(self.build());
        if let Val::Table(t) = &methods {
            state.set_string_methods(t.clone());
        }
        state.push(methods);
        state.set_global(self.name());
        Ok(())
    }
}

/// Converts 1-based, possibly negative, string positions into a byte range.
fn byte_range(len: usize, i: i64, j: i64) -> (usize, usize) {
    let len = len as i64;
    let start = match i {
        i if i < 0 => (len + i + 1).max(1),
        0 => 1,
        i => i,
    };
    let end = match j {
        j if j < 0 => len + j + 1,
        j => j.min(len),
    };
    if start > end {
        (0, 0)
    } else {
        ((start - 1) as usize, end as usize)
    }
}

fn len(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "len")?;
    state.push_integer(s.len() as i64);
    Ok(1)
}

fn sub(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "sub")?;
    let i = opt_integer(state, 2, "sub", 1)?;
    let j = opt_integer(state, 3, "sub", -1)?;
    let (start, end) = byte_range(s.len(), i, j);
    let bytes = &s.as_bytes()[start..end];
    state.push(Val::from(String::from_utf8_lossy(bytes).into_owned()));
    Ok(1)
}

fn upper(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "upper")?;
    state.push(Val::from(s.to_uppercase()));
    Ok(1)
}

fn lower(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "lower")?;
    state.push(Val::from(s.to_lowercase()));
    Ok(1)
}

fn rep(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "rep")?;
    let n = check_integer(state, 2, "rep")?;
    let sep = state.to_str(3).unwrap_or_default();
    if n <= 0 {
        state.push_string("");
        return Ok(1);
    }
    let total = (s.len() + sep.len()).saturating_mul(n as usize);
    if total >= 1 << 30 {
        return Err(anyhow!("resulting string too large"));
    }
    let parts = vec![s.as_ref(); n as usize];
    state.push(Val::from(parts.join(sep.as_str())));
    Ok(1)
}

fn reverse(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "reverse")?;
    state.push(Val::from(s.chars().rev().collect::<String>()));
    Ok(1)
}

fn byte(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "byte")?;
    let i = opt_integer(state, 2, "byte", 1)?;
    let j = opt_integer(state, 3, "byte", i)?;
    let (start, end) = byte_range(s.len(), i, j);
    Ok(push_all(
        state,
        s.as_bytes()[start..end].iter().map(|b| Val::Int(*b as i64)),
    ))
}

fn char_(state: &State) -> Result<usize> {
    let mut bytes = Vec::with_capacity(state.top() as usize);
    for n in 1..=state.top() {
        let c = check_integer(state, n, "char")?;
        let b = u8::try_from(c).map_err(|_| arg_error(n, "char", "value out of range"))?;
        bytes.push(b);
    }
    state.push(Val::from(String::from_utf8_lossy(&bytes).into_owned()));
    Ok(1)
}

/// Plain substring search; returns the 1-based start and end of the match.
fn find(state: &State) -> Result<usize> {
    let s = check_str(state, 1, "find")?;
    let needle = check_str(state, 2, "find")?;
    let init = opt_integer(state, 3, "find", 1)?;
    let start = match init {
        i if i < 0 => (s.len() as i64 + i).max(0) as usize,
        0 => 0,
        i => (i - 1) as usize,
    };
    if start > s.len() {
        state.push_nil();
        return Ok(1);
    }
    match s.as_bytes()[start..]
        .windows(needle.len().max(1))
        .position(|w| needle.is_empty() || w == needle.as_bytes())
    {
        Some(pos) => {
            let first = start + pos + 1;
            state.push_integer(first as i64);
            state.push_integer((first + needle.len() - 1) as i64);
            Ok(2)
        }
        None if needle.is_empty() => {
            state.push_integer(start as i64 + 1);
            state.push_integer(start as i64);
            Ok(2)
        }
        None => {
            state.push_nil();
            Ok(1)
        }
    }
}

struct Spec {
    left: bool,
    plus: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, body: String) -> String {
        if body.len() >= self.width {
            return body;
        }
        let fill = self.width - body.len();
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(rest) => ("-", rest),
                None => ("", body.as_str()),
            };
            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }

    fn signed(&self, body: String) -> String {
        if self.plus && !body.starts_with('-') {
            format!("+{}", body)
        } else {
            body
        }
    }
}

fn format(state: &State) -> Result<usize> {
    let fmt = check_str(state, 1, "format")?;
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut arg = 1;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut spec = Spec {
            left: false,
            plus: false,
            zero: false,
            width: 0,
            precision: None,
        };
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            spec.precision = Some(p);
        }
        let Some(conv) = chars.next() else {
            return Err(anyhow!("invalid conversion '%' to 'format'"));
        };

        arg += 1;
        let piece = match conv {
            'd' | 'i' => {
                let n = check_integer(state, arg, "format")?;
                spec.signed(n.to_string())
            }
            'u' => check_integer(state, arg, "format")?.to_string(),
            'c' => {
                let n = check_integer(state, arg, "format")?;
                char::from_u32(n as u32).map(String::from).unwrap_or_default()
            }
            'x' => format!("{:x}", check_integer(state, arg, "format")?),
            'X' => format!("{:X}", check_integer(state, arg, "format")?),
            'o' => format!("{:o}", check_integer(state, arg, "format")?),
            'f' | 'F' => {
                let n = number_arg(state, arg)?;
                spec.signed(format!("{:.*}", spec.precision.unwrap_or(6), n))
            }
            'e' | 'E' => {
                let n = number_arg(state, arg)?;
                let s = c_exponent(format!("{:.*e}", spec.precision.unwrap_or(6), n));
                spec.signed(if conv == 'E' { s.to_uppercase() } else { s })
            }
            'g' | 'G' => {
                let n = number_arg(state, arg)?;
                let s = format_general(n, spec.precision.unwrap_or(6));
                spec.signed(if conv == 'G' { s.to_uppercase() } else { s })
            }
            's' => {
                let v = check_any(state, arg, "format")?;
                let s = v.to_string();
                match spec.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                }
            }
            'q' => quote(&check_str(state, arg, "format")?),
            other => return Err(anyhow!("invalid conversion '%{}' to 'format'", other)),
        };
        out.push_str(&spec.pad(piece));
    }

    state.push(Val::from(out));
    Ok(1)
}

fn number_arg(state: &State, n: i32) -> Result<f64> {
    state
        .to_number(n)
        .ok_or_else(|| arg_error(n, "format", &format!("number expected, got {}", state.type_name(n))))
}

/// Rust writes `1.5e2`; C writes `1.5e+02`.
fn c_exponent(s: String) -> String {
    match s.split_once('e') {
        Some((m, e)) => {
            let (sign, digits) = match e.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', e),
            };
            format!("{}e{}{:0>2}", m, sign, digits)
        }
        None => s,
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
