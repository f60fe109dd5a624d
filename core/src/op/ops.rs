use std::fmt::{self, Display};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

use anyhow::{Result, anyhow};

use crate::val::{Val, format_number};

fn err_arith<R>(l: &Val, r: &Val) -> Result<R> {
    let bad = if l.to_arith().is_none() { l } else { r };
    Err(anyhow!("attempt to perform arithmetic on a {} value", bad.type_name()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}

impl UnOp {
    pub(crate) fn eval_val(&self, val: &Val) -> Result<Val> {
        match self {
            UnOp::Neg => -val,
            UnOp::Not => Ok(Val::Bool(!val.truthy())),
            UnOp::Len => match val {
                Val::Str(s) => Ok(Val::Int(s.len() as i64)),
                Val::Table(t) => Ok(Val::Int(t.borrow().len())),
                _ => Err(anyhow!("attempt to get length of a {} value", val.type_name())),
            },
        }
    }
}

impl Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "not"),
            UnOp::Len => write!(f, "#"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Priority of unary operators: binds tighter than everything but `^`.
pub(crate) const UNARY_PRIORITY: u8 = 12;

impl BinOp {
    /// (left, right) binding priorities; right-associative operators have right < left.
    pub(crate) fn priority(&self) -> (u8, u8) {
        match self {
            BinOp::Or => (1, 1),
            BinOp::And => (2, 2),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => (3, 3),
            BinOp::Concat => (9, 8),
            BinOp::Add | BinOp::Sub => (10, 10),
            BinOp::Mul | BinOp::Div | BinOp::IDiv | BinOp::Mod => (11, 11),
            BinOp::Pow => (14, 13),
        }
    }

    /// Evaluates every operator except the short-circuiting `and`/`or`.
    pub(crate) fn eval_val(&self, l: &Val, r: &Val) -> Result<Val> {
        match self {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::Div => l / r,
            BinOp::Mod => l % r,
            BinOp::IDiv => idiv(l, r),
            BinOp::Pow => pow(l, r),
            BinOp::Concat => concat(l, r),
            BinOp::Eq => Ok(Val::Bool(l == r)),
            BinOp::Ne => Ok(Val::Bool(l != r)),
            BinOp::Lt => compare_lt(l, r).map(Val::Bool),
            BinOp::Le => compare_le(l, r).map(Val::Bool),
            BinOp::Gt => compare_lt(r, l).map(Val::Bool),
            BinOp::Ge => compare_le(r, l).map(Val::Bool),
            BinOp::And | BinOp::Or => Err(anyhow!("'{}' must be evaluated lazily", self)),
        }
    }
}

impl Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::Concat => "..",
            BinOp::Eq => "==",
            BinOp::Ne => "~=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        };
        f.write_str(s)
    }
}

/// Both operands as numbers, keeping integers when both are integers.
enum Operands {
    Ints(i64, i64),
    Floats(f64, f64),
}

fn operands(l: &Val, r: &Val) -> Result<Operands> {
    match (l.to_arith(), r.to_arith()) {
        (Some(Val::Int(a)), Some(Val::Int(b))) => Ok(Operands::Ints(a, b)),
        (Some(a), Some(b)) => match (a.to_number(), b.to_number()) {
            (Some(a), Some(b)) => Ok(Operands::Floats(a, b)),
            _ => err_arith(l, r),
        },
        _ => err_arith(l, r),
    }
}

impl Add for &Val {
    type Output = Result<Val>;

    fn add(self, rhs: Self) -> Self::Output {
        Ok(match operands(self, rhs)? {
            Operands::Ints(a, b) => Val::Int(a.wrapping_add(b)),
            Operands::Floats(a, b) => Val::Float(a + b),
        })
    }
}

impl Sub for &Val {
    type Output = Result<Val>;

    fn sub(self, rhs: Self) -> Self::Output {
        Ok(match operands(self, rhs)? {
            Operands::Ints(a, b) => Val::Int(a.wrapping_sub(b)),
            Operands::Floats(a, b) => Val::Float(a - b),
        })
    }
}

impl Mul for &Val {
    type Output = Result<Val>;

    fn mul(self, rhs: Self) -> Self::Output {
        Ok(match operands(self, rhs)? {
            Operands::Ints(a, b) => Val::Int(a.wrapping_mul(b)),
            Operands::Floats(a, b) => Val::Float(a * b),
        })
    }
}

impl Div for &Val {
    type Output = Result<Val>;

    /// Division always produces a float.
    fn div(self, rhs: Self) -> Self::Output {
        Ok(match operands(self, rhs)? {
            Operands::Ints(a, b) => Val::Float(a as f64 / b as f64),
            Operands::Floats(a, b) => Val::Float(a / b),
        })
    }
}

impl Rem for &Val {
    type Output = Result<Val>;

    /// Modulo with the sign of the divisor.
    fn rem(self, rhs: Self) -> Self::Output {
        Ok(match operands(self, rhs)? {
            Operands::Ints(_, 0) => return Err(anyhow!("attempt to perform 'n%%0'")),
            Operands::Ints(a, b) => {
                let m = a.wrapping_rem(b);
                Val::Int(if m != 0 && (m ^ b) < 0 { m + b } else { m })
            }
            Operands::Floats(a, b) => {
                let m = a % b;
                Val::Float(if m != 0.0 && (m < 0.0) != (b < 0.0) { m + b } else { m })
            }
        })
    }
}

impl Neg for &Val {
    type Output = Result<Val>;

    fn neg(self) -> Self::Output {
        match self.to_arith() {
            Some(Val::Int(i)) => Ok(Val::Int(i.wrapping_neg())),
            Some(Val::Float(f)) => Ok(Val::Float(-f)),
            _ => Err(anyhow!("attempt to perform arithmetic on a {} value", self.type_name())),
        }
    }
}

fn idiv(l: &Val, r: &Val) -> Result<Val> {
    Ok(match operands(l, r)? {
        Operands::Ints(_, 0) => return Err(anyhow!("attempt to perform 'n//0'")),
        Operands::Ints(a, b) => {
            let q = a.wrapping_div(b);
            Val::Int(if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
        }
        Operands::Floats(a, b) => Val::Float((a / b).floor()),
    })
}

fn pow(l: &Val, r: &Val) -> Result<Val> {
    Ok(match operands(l, r)? {
        Operands::Ints(a, b) => Val::Float((a as f64).powf(b as f64)),
        Operands::Floats(a, b) => Val::Float(a.powf(b)),
    })
}

fn concat(l: &Val, r: &Val) -> Result<Val> {
    let piece = |v: &Val| -> Result<String> {
        match v {
            Val::Str(s) => Ok(s.to_string()),
            Val::Int(_) | Val::Float(_) => Ok(format_number(v)),
            _ => Err(anyhow!("attempt to concatenate a {} value", v.type_name())),
        }
    };
    let mut out = piece(l)?;
    out.push_str(&piece(r)?);
    Ok(Val::from(out))
}

fn err_compare<R>(l: &Val, r: &Val) -> Result<R> {
    if l.type_name() == r.type_name() {
        Err(anyhow!("attempt to compare two {} values", l.type_name()))
    } else {
        Err(anyhow!("attempt to compare {} with {}", l.type_name(), r.type_name()))
    }
}

pub fn compare_lt(l: &Val, r: &Val) -> Result<bool> {
    match (l, r) {
        (Val::Int(a), Val::Int(b)) => Ok(a < b),
        (Val::Float(a), Val::Float(b)) => Ok(a < b),
        (Val::Int(a), Val::Float(b)) => Ok((*a as f64) < *b),
        (Val::Float(a), Val::Int(b)) => Ok(*a < *b as f64),
        (Val::Str(a), Val::Str(b)) => Ok(a < b),
        _ => err_compare(l, r),
    }
}

pub fn compare_le(l: &Val, r: &Val) -> Result<bool> {
    match (l, r) {
        (Val::Int(a), Val::Int(b)) => Ok(a <= b),
        (Val::Float(a), Val::Float(b)) => Ok(a <= b),
        (Val::Int(a), Val::Float(b)) => Ok((*a as f64) <= *b),
        (Val::Float(a), Val::Int(b)) => Ok(*a <= *b as f64),
        (Val::Str(a), Val::Str(b)) => Ok(a <= b),
        _ => err_compare(l, r),
    }
}
