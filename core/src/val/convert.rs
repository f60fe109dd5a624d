use crate::val::Val;

/// Formats numbers the way `tostring` does; other values yield an empty string.
pub fn format_number(v: &Val) -> String {
    match v {
        Val::Int(i) => {
            let mut buf = itoa::Buffer::new();
            buf.format(*i).to_string()
        }
        Val::Float(f) => format_float(*f),
        _ => String::new(),
    }
}

/// `%.14g`, with a trailing `.0` for integral values so floats stay recognizable.
pub fn format_float(f: f64) -> String {
    let out = format_general(f, 14);
    if f.is_finite() && !out.contains(['.', 'e']) {
        format!("{}.0", out)
    } else {
        out
    }
}

/// C's `%.{precision}g`.
pub fn format_general(f: f64, precision: usize) -> String {
    if f.is_nan() {
        return if f.is_sign_negative() { "-nan".into() } else { "nan".into() };
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf".into() } else { "inf".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".into() } else { "0".into() };
    }

    let precision = precision.max(1) as i32;
    // Round to `precision` significant digits first, then read the decimal exponent back
    let sci = format!("{:.*e}", (precision - 1) as usize, f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= precision {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exp.abs());
    }

    let decimals = (precision - 1 - exp).max(0) as usize;
    trim_fraction(&format!("{:.*}", decimals, f)).to_string()
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Converts a numeric string (`"10"`, `" 0x1F "`, `"2.5e3"`) to a number value.
pub fn str_to_number(s: &str) -> Option<Val> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut value: i64 = 0;
        for b in hex.bytes() {
            let d = (b as char).to_digit(16)? as i64;
            value = value.wrapping_mul(16).wrapping_add(d);
        }
        return Some(Val::Int(if negative { value.wrapping_neg() } else { value }));
    }

    // Rust accepts "inf"/"nan" spellings that scripts must not
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    if !body.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    if !body.contains(['.', 'e', 'E'])
        && let Ok(i) = s.parse::<i64>()
    {
        return Some(Val::Int(i));
    }
    s.parse::<f64>().ok().map(Val::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(102.0351), "102.0351");
        assert_eq!(format_float(0.1 + 0.2), "0.3");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e100), "1e+100");
        assert_eq!(format_float(1e-5), "1e-05");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(123456789012.0), "123456789012.0");
    }

    #[test]
    fn test_str_to_number() {
        assert_eq!(str_to_number("10"), Some(Val::Int(10)));
        assert_eq!(str_to_number(" -7 "), Some(Val::Int(-7)));
        assert_eq!(str_to_number("0x1F"), Some(Val::Int(31)));
        assert_eq!(str_to_number("2.5e3"), Some(Val::Float(2500.0)));
        assert_eq!(str_to_number("inf"), None);
        assert_eq!(str_to_number("1.2.3"), None);
        assert_eq!(str_to_number(""), None);
        assert_eq!(str_to_number("abc"), None);
    }
}
