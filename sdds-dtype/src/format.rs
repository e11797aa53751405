//! ASCII rendering of values, including the printf-style `format_string` field attribute.

use crate::escape::{char_token, quote_token};
use crate::{LongDouble, Value};

/// A parsed printf conversion such as `%10.4lf`.
///
/// Literal text before and after the conversion is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    prefix: String,
    suffix: String,
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    width: usize,
    precision: Option<usize>,
    conversion: Conversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Int,
    Unsigned,
    Fixed,
    Exp { upper: bool },
    General { upper: bool },
    Str,
    Char,
}

impl FormatSpec {
    /// Parse a format string holding exactly one conversion, returning `None` for anything
    /// outside the supported subset.
    pub fn parse(format: &str) -> Option<Self> {
        let start = find_conversion(format)?;
        let prefix = format[..start].replace("%%", "%");
        let rest = &format[start + 1..];
        let bytes = rest.as_bytes();
        let mut i = 0;

        let (mut left, mut zero, mut plus, mut space) = (false, false, false, false);
        while i < bytes.len() {
            match bytes[i] {
                b'-' => left = true,
                b'0' => zero = true,
                b'+' => plus = true,
                b' ' => space = true,
                b'#' => {}
                _ => break,
            }
            i += 1;
        }

        let width_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let width = rest[width_start..i].parse().unwrap_or(0);

        let mut precision = None;
        if i < bytes.len() && bytes[i] == b'.' {
            i += 1;
            let prec_start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            precision = Some(rest[prec_start..i].parse().unwrap_or(0));
        }

        while i < bytes.len() && matches!(bytes[i], b'l' | b'h' | b'L' | b'q') {
            i += 1;
        }

        let conversion = match bytes.get(i)? {
            b'd' | b'i' => Conversion::Int,
            b'u' => Conversion::Unsigned,
            b'f' | b'F' => Conversion::Fixed,
            b'e' => Conversion::Exp { upper: false },
            b'E' => Conversion::Exp { upper: true },
            b'g' => Conversion::General { upper: false },
            b'G' => Conversion::General { upper: true },
            b's' => Conversion::Str,
            b'c' => Conversion::Char,
            _ => return None,
        };
        let suffix = &rest[i + 1..];
        if find_conversion(suffix).is_some() {
            return None;
        }

        Some(Self {
            prefix,
            suffix: suffix.replace("%%", "%"),
            left,
            zero,
            plus,
            space,
            width,
            precision,
            conversion,
        })
    }

    /// Render `value` with this conversion.
    ///
    /// Numeric conversions accept any numeric value; `%s` renders any value as text and `%c`
    /// accepts characters only. Returns `None` when the value does not suit the conversion.
    pub fn format(&self, value: &Value) -> Option<String> {
        let body = match self.conversion {
            Conversion::Int => {
                let v = integer_of(value)?;
                self.signed(v < 0, v.unsigned_abs().to_string())
            }
            Conversion::Unsigned => {
                let v = integer_of(value)?;
                self.signed(false, v.to_string())
            }
            Conversion::Fixed => {
                let v = value.as_f64()?;
                self.float(v, |a| format!("{:.*}", self.precision.unwrap_or(6), a))
            }
            Conversion::Exp { upper } => {
                let v = value.as_f64()?;
                self.float(v, |a| c_exponent(a, self.precision.unwrap_or(6), upper))
            }
            Conversion::General { upper } => {
                let v = value.as_f64()?;
                self.float(v, |a| c_general(a, self.precision.unwrap_or(6), upper))
            }
            Conversion::Str => {
                let mut s = match value {
                    Value::String(s) => s.clone(),
                    Value::Char(c) => (*c as char).to_string(),
                    other => other.to_string(),
                };
                if let Some(p) = self.precision {
                    s = s.chars().take(p).collect();
                }
                self.pad(s)
            }
            Conversion::Char => match value {
                Value::Char(c) => self.pad((*c as char).to_string()),
                _ => return None,
            },
        };
        Some(format!("{}{}{}", self.prefix, body, self.suffix))
    }

    fn float(&self, v: f64, render: impl Fn(f64) -> String) -> String {
        if v.is_nan() {
            return self.pad("nan".to_string());
        }
        if v.is_infinite() {
            return self.signed(v < 0.0, "inf".to_string());
        }
        self.signed(v.is_sign_negative() && v != 0.0, render(v.abs()))
    }

    fn signed(&self, negative: bool, digits: String) -> String {
        let sign = if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        };
        if self.zero && !self.left && sign.len() + digits.len() < self.width {
            let zeros = "0".repeat(self.width - sign.len() - digits.len());
            return format!("{sign}{zeros}{digits}");
        }
        self.pad(format!("{sign}{digits}"))
    }

    fn pad(&self, s: String) -> String {
        let len = s.chars().count();
        if len >= self.width {
            s
        } else if self.left {
            format!("{s:<width$}", width = self.width)
        } else {
            format!("{s:>width$}", width = self.width)
        }
    }
}

fn find_conversion(format: &str) -> Option<usize> {
    let bytes = format.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if bytes.get(i + 1) == Some(&b'%') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

#[allow(clippy::cast_possible_truncation)]
fn integer_of(value: &Value) -> Option<i128> {
    match value {
        Value::U64(v) => Some(i128::from(*v)),
        Value::I64(v) => Some(i128::from(*v)),
        Value::Char(c) => Some(i128::from(*c)),
        Value::String(_) => None,
        other => other.as_f64().map(|f| f.trunc() as i128),
    }
}

/// `%.*e` with a C style exponent of at least two digits.
fn c_exponent(v: f64, precision: usize, upper: bool) -> String {
    let rendered = format!("{v:.precision$e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exp: i32 = exponent.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exp.unsigned_abs())
}

/// `%.*g`: the shorter of fixed and exponent notation with trailing zeros removed.
#[allow(clippy::cast_possible_truncation)]
fn c_general(v: f64, precision: usize, upper: bool) -> String {
    let precision = precision.max(1);
    if v == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{:.*e}", precision - 1, v);
    let exp: i64 = scientific
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    if exp < -4 || exp >= precision as i64 {
        let rendered = c_exponent(v, precision - 1, upper);
        let (mantissa, exponent) = rendered
            .split_once(if upper { 'E' } else { 'e' })
            .unwrap_or((&rendered, ""));
        format!(
            "{}{}{}",
            trim_zeros(mantissa),
            if upper { 'E' } else { 'e' },
            exponent
        )
    } else {
        let decimals = (precision as i64 - 1 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Shortest text that parses back to the same double.
pub fn render_f64(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let a = v.abs();
    if a != 0.0 && !(1e-5..1e16).contains(&a) {
        format!("{v:e}")
    } else {
        format!("{v}")
    }
}

fn render_f32(v: f32) -> String {
    let a = v.abs();
    if v.is_finite() && a != 0.0 && !(1e-5..1e16).contains(&a) {
        format!("{v:e}")
    } else if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf" } else { "-inf" }.to_string()
    } else {
        format!("{v}")
    }
}

/// Render a value as a single ASCII data token.
///
/// When `spec` is given and suits the value it is applied; otherwise the shortest round-trip
/// rendering is used. Strings and characters are quoted when they would not read back as one
/// token, padding included.
pub fn render_token(value: &Value, spec: Option<&FormatSpec>) -> String {
    if let Some(formatted) = spec.and_then(|s| s.format(value)) {
        return match value {
            Value::String(_) | Value::Char(_) => quote_token(&formatted).into_owned(),
            _ if formatted.trim().is_empty() => render_plain(value),
            _ => formatted,
        };
    }
    render_plain(value)
}

fn render_plain(value: &Value) -> String {
    match value {
        Value::F80(LongDouble(v)) | Value::F64(v) => render_f64(*v),
        Value::F32(v) => render_f32(*v),
        Value::Char(c) => char_token(*c),
        Value::String(s) => quote_token(s).into_owned(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("%d", Value::I32(-42), "-42")]
    #[case("%5d", Value::I32(42), "   42")]
    #[case("%-5d|", Value::I32(42), "42   |")]
    #[case("%05ld", Value::I64(-42), "-0042")]
    #[case("%+d", Value::I16(7), "+7")]
    #[case("%u", Value::U64(u64::MAX), "18446744073709551615")]
    #[case("%.3f", Value::F64(3.14159), "3.142")]
    #[case("%10.2lf", Value::F64(-1.5), "     -1.50")]
    #[case("%e", Value::F64(1234.5), "1.234500e+03")]
    #[case("%.2E", Value::F32(0.00012), "1.20E-04")]
    #[case("%g", Value::F64(0.0001), "0.0001")]
    #[case("%g", Value::F64(1234567.0), "1.23457e+06")]
    #[case("%g", Value::F64(100.0), "100")]
    #[case("%.3g", Value::F64(2.5), "2.5")]
    #[case("%s", Value::String("abc".into()), "abc")]
    #[case("%.2s", Value::String("abc".into()), "ab")]
    #[case("%c", Value::Char(b'z'), "z")]
    #[case("x=%d%%", Value::I32(3), "x=3%")]
    fn printf_subset(#[case] format: &str, #[case] value: Value, #[case] expected: &str) {
        let spec = FormatSpec::parse(format).unwrap();
        assert_eq!(spec.format(&value).unwrap(), expected);
    }

    #[rstest]
    #[case("%q")]
    #[case("no conversion")]
    #[case("%d %d")]
    #[case("%")]
    fn unsupported_formats(#[case] format: &str) {
        assert!(FormatSpec::parse(format).is_none());
    }

    #[test]
    fn render_round_trips() {
        for v in [0.1, 1.0 / 3.0, 1e300, -2.5e-9, 42.0] {
            let token = render_token(&Value::F64(v), None);
            assert_eq!(token.parse::<f64>().unwrap(), v);
        }
        assert_eq!(render_token(&Value::from("two words"), None), "\"two words\"");
        assert_eq!(render_token(&Value::I32(5), None), "5");
    }

    #[test]
    fn string_format_is_quoted_when_needed() {
        let spec = FormatSpec::parse("%10s").unwrap();
        assert_eq!(render_token(&Value::from("a b"), Some(&spec)), "\"       a b\"");
        assert_eq!(render_token(&Value::from("ab"), Some(&spec)), "\"        ab\"");
        let spec = FormatSpec::parse("%s").unwrap();
        assert_eq!(render_token(&Value::from("ab"), Some(&spec)), "ab");
    }
}
