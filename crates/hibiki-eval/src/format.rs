//! printf-style formatting for `fn:sprintf` and the `format` filter.

use std::iter::Peekable;
use std::str::Chars;

use crate::json::{JsonOptions, to_json};
use crate::value::format_number;
use crate::{EvalError, Value};

/// Largest width or precision a conversion may ask for.
pub const MAX_FIELD_WIDTH: usize = 1024;

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
}

/// Format `args` according to `fmt`. Missing arguments format as `null`.
///
/// Supported conversions: `%%`, `%s`, `%v`, `%d`, `%i`, `%f`, `%e`, `%x`, `%j`,
/// with the `-`, `0`, `+` and space flags, a width and a precision.
pub fn sprintf(fmt: &str, args: &[Value]) -> Result<String, EvalError> {
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars().peekable();
    let mut next_arg = 0;

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

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }
        spec.width = read_count(&mut chars, "width")?;
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(read_count(&mut chars, "precision")?);
        }

        let Some(conv) = chars.next() else {
            return Err(EvalError::function("sprintf", "format ends inside a conversion"));
        };
        let arg = args.get(next_arg).cloned().unwrap_or(Value::Null);
        next_arg += 1;

        let (body, numeric) = match conv {
            's' => {
                let s = arg.to_display_string();
                match spec.precision {
                    Some(p) => (s.chars().take(p).collect(), false),
                    None => (s, false),
                }
            }
            'v' => (arg.to_display_string(), false),
            'd' | 'i' => (format_integer(arg.to_number()), true),
            'f' => (format_fixed(arg.to_number(), spec.precision.unwrap_or(6)), true),
            'e' => (format_exp(arg.to_number(), spec.precision.unwrap_or(6)), true),
            'x' => (format_hex(arg.to_number()), true),
            'j' => (to_json(&arg, JsonOptions::default())?, false),
            other => {
                return Err(EvalError::function(
                    "sprintf",
                    format!("unknown conversion '%{other}'"),
                ));
            }
        };
        out.push_str(&pad(body, numeric, &spec));
    }
    Ok(out)
}

fn read_count(chars: &mut Peekable<Chars<'_>>, what: &str) -> Result<usize, EvalError> {
    let mut n: usize = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_add(d as usize))
            .filter(|n| *n <= MAX_FIELD_WIDTH)
            .ok_or_else(|| EvalError::function("sprintf", format!("{what} larger than {MAX_FIELD_WIDTH}")))?;
        chars.next();
    }
    Ok(n)
}

fn format_integer(n: f64) -> String {
    if n.is_finite() {
        format!("{:.0}", n.trunc())
    } else {
        format_number(n)
    }
}

fn format_fixed(n: f64, precision: usize) -> String {
    if n.is_finite() {
        format!("{:.*}", precision, n)
    } else {
        format_number(n)
    }
}

/// C-style exponent: `1.500000e+02`.
fn format_exp(n: f64, precision: usize) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let raw = format!("{:.*e}", precision, n);
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}

fn format_hex(n: f64) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let n = n.trunc() as i64;
    if n < 0 {
        format!("-{:x}", n.unsigned_abs())
    } else {
        format!("{:x}", n)
    }
}

fn pad(body: String, numeric: bool, spec: &Spec) -> String {
    let (sign, digits) = match body.strip_prefix('-') {
        Some(rest) if numeric => ("-", rest.to_string()),
        _ if numeric && spec.plus => ("+", body.clone()),
        _ if numeric && spec.space => (" ", body.clone()),
        _ => ("", body.clone()),
    };
    let len = sign.len() + digits.chars().count();
    if len >= spec.width {
        return format!("{sign}{digits}");
    }
    let fill = spec.width - len;
    if spec.left {
        format!("{sign}{digits}{}", " ".repeat(fill))
    } else if spec.zero && numeric {
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{sign}{digits}", " ".repeat(fill))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(f: &str, args: Vec<Value>) -> String {
        sprintf(f, &args).unwrap()
    }

    #[test]
    fn test_plain_and_percent() {
        assert_eq!(fmt("100%% done", vec![]), "100% done");
        assert_eq!(fmt("%s and %v", vec!["a".into(), 2i64.into()]), "a and 2");
        assert_eq!(fmt("%s", vec![]), "null");
    }

    #[test]
    fn test_integers() {
        assert_eq!(fmt("%d", vec![12.9.into()]), "12");
        assert_eq!(fmt("%5d|", vec![42i64.into()]), "   42|");
        assert_eq!(fmt("%-5d|", vec![42i64.into()]), "42   |");
        assert_eq!(fmt("%05d", vec![(-42i64).into()]), "-0042");
        assert_eq!(fmt("%+d", vec![7i64.into()]), "+7");
        assert_eq!(fmt("%x", vec![255i64.into()]), "ff");
    }

    #[test]
    fn test_floats() {
        assert_eq!(fmt("%.2f", vec![1.23456.into()]), "1.23");
        assert_eq!(fmt("%f", vec![1.5.into()]), "1.500000");
        assert_eq!(fmt("%.3e", vec![1234.56.into()]), "1.235e+03");
        assert_eq!(fmt("%d", vec!["abc".into()]), "NaN");
    }

    #[test]
    fn test_string_precision_and_json() {
        assert_eq!(fmt("%.3s", vec!["abcdef".into()]), "abc");
        let arr = Value::array(vec![1i64.into(), "x".into()]);
        assert_eq!(fmt("%j", vec![arr]), r#"[1,"x"]"#);
    }

    #[test]
    fn test_bad_conversion() {
        assert!(sprintf("%q", &[]).is_err());
        assert!(sprintf("abc %", &[]).is_err());
    }

    #[test]
    fn test_field_width_is_bounded() {
        assert_eq!(fmt("%1024d", vec![1i64.into()]).len(), MAX_FIELD_WIDTH);
        assert!(matches!(
            sprintf("%1025d", &[1i64.into()]),
            Err(EvalError::Function { .. })
        ));
        assert!(sprintf("%99999999999999999999d", &[1i64.into()]).is_err());
        assert!(sprintf("%.99999999999999999999f", &[1.5.into()]).is_err());
    }
}
