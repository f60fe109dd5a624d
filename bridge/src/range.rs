//! Type-level "does every value of A fit in B" checks for numeric conversions.

use std::fmt::Display;

/// Integer type the engine stores natively.
pub type NativeInteger = i64;
/// Floating type the engine stores natively.
pub type NativeNumber = f64;

/// Set of values a numeric type can represent exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Integer { min: i128, max: i128 },
    Float { mantissa_digits: u32, max_exp: i32 },
}

/// True iff every value of `source` is exactly representable in `target`.
pub const fn fits(source: Domain, target: Domain) -> bool {
    match (source, target) {
        (Domain::Integer { min: smin, max: smax }, Domain::Integer { min: tmin, max: tmax }) => {
            smin >= tmin && smax <= tmax
        }
        (Domain::Integer { min, max }, Domain::Float { mantissa_digits, .. }) => {
            let limit = 1i128 << mantissa_digits;
            min >= -limit && max <= limit
        }
        (
            Domain::Float {
                mantissa_digits: sm,
                max_exp: se,
            },
            Domain::Float {
                mantissa_digits: tm,
                max_exp: te,
            },
        ) => sm <= tm && se <= te,
        (Domain::Float { .. }, Domain::Integer { .. }) => false,
    }
}

pub const fn fits_in<S: Numeric, T: Numeric>() -> bool {
    fits(S::DOMAIN, T::DOMAIN)
}

/// A value as the engine stores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Native {
    Integer(NativeInteger),
    Number(NativeNumber),
}

/// Host numeric types that can cross the boundary.
///
/// Conversions return `None` when the concrete value does not fit; they never
/// truncate or saturate.
pub trait Numeric: Copy + Display + Sized + 'static {
    const NAME: &'static str;
    const DOMAIN: Domain;

    fn to_native(self) -> Option<Native>;
    fn from_integer(value: NativeInteger) -> Option<Self>;
    fn from_number(value: NativeNumber) -> Option<Self>;
}

/// Exact integral value of `f`, if it has one within `i128`.
fn integral(f: f64) -> Option<i128> {
    const LIMIT: f64 = 170_141_183_460_469_231_731_687_303_715_884_105_728.0; // 2^127
    (f.is_finite() && f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f)).then(|| f as i128)
}

macro_rules! integer_numeric {
    ($($t:ty),* $(,)?) => {$(
        impl Numeric for $t {
            const NAME: &'static str = stringify!($t);
            const DOMAIN: Domain = Domain::Integer {
                min: <$t>::MIN as i128,
                max: <$t>::MAX as i128,
            };

            fn to_native(self) -> Option<Native> {
                if fits_in::<$t, NativeInteger>() {
                    Some(Native::Integer(self as NativeInteger))
                } else {
                    NativeInteger::try_from(self).ok().map(Native::Integer)
                }
            }

            fn from_integer(value: NativeInteger) -> Option<Self> {
                if fits_in::<NativeInteger, $t>() {
                    Some(value as $t)
                } else {
                    <$t>::try_from(value).ok()
                }
            }

            fn from_number(value: NativeNumber) -> Option<Self> {
                integral(value).and_then(|i| <$t>::try_from(i).ok())
            }
        }
    )*};
}

integer_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! float_numeric {
    ($($t:ident),* $(,)?) => {$(
        impl Numeric for $t {
            const NAME: &'static str = stringify!($t);
            const DOMAIN: Domain = Domain::Float {
                mantissa_digits: $t::MANTISSA_DIGITS,
                max_exp: $t::MAX_EXP,
            };

            fn to_native(self) -> Option<Native> {
                if fits_in::<$t, NativeNumber>() {
                    Some(Native::Number(self as NativeNumber))
                } else {
                    None
                }
            }

            fn from_integer(value: NativeInteger) -> Option<Self> {
                if fits_in::<NativeInteger, $t>() {
                    return Some(value as $t);
                }
                let converted = value as $t;
                (integral(converted as f64) == Some(value as i128)).then_some(converted)
            }

            fn from_number(value: NativeNumber) -> Option<Self> {
                if fits_in::<NativeNumber, $t>() || value.abs() <= $t::MAX as f64 {
                    Some(value as $t)
                } else {
                    None
                }
            }
        }
    )*};
}

float_numeric!(f32, f64);
