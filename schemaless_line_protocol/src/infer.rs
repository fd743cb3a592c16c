//! The type inference table: literal syntax to [`ScalarType`].
//!
//! | form                      | type                     |
//! |---------------------------|--------------------------|
//! | `-12`                     | [`ScalarType::BigInt`]   |
//! | `-12i`                    | [`ScalarType::Int`]      |
//! | `12u`                     | [`ScalarType::UInt`]     |
//! | `-12b`                    | [`ScalarType::TinyInt`]  |
//! | `-12s`                    | [`ScalarType::SmallInt`] |
//! | `-12w`                    | [`ScalarType::IntW`]     |
//! | `1.5f`, `2f`              | [`ScalarType::Float`]    |
//! | `-1.5`                    | [`ScalarType::Double`]   |
//! | `true`, `false`           | [`ScalarType::Bool`]     |
//! | `"bytes"`                 | [`ScalarType::Binary`]   |
//! | `L"chars"`                | [`ScalarType::NChar`]    |
//!
//! Inference happens once, when the line is parsed; everything downstream works with the
//! decoded [`Literal`].

use crate::{EscapedStr, Error, Result};
use schemaless_types::column::{ScalarType, Value};
use std::fmt;

/// Integer suffixes and the type each one selects.
const INTEGER_SUFFIXES: [(char, ScalarType); 5] = [
    ('b', ScalarType::TinyInt),
    ('s', ScalarType::SmallInt),
    ('i', ScalarType::Int),
    ('w', ScalarType::IntW),
    ('u', ScalarType::UInt),
];

const FLOAT_SUFFIX: char = 'f';

/// A decoded tag or field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal<'a> {
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    IntW(i32),
    UInt(u32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Binary(EscapedStr<'a>),
    NChar(EscapedStr<'a>),
}

impl Literal<'_> {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::TinyInt(_) => ScalarType::TinyInt,
            Self::SmallInt(_) => ScalarType::SmallInt,
            Self::Int(_) => ScalarType::Int,
            Self::IntW(_) => ScalarType::IntW,
            Self::UInt(_) => ScalarType::UInt,
            Self::BigInt(_) => ScalarType::BigInt,
            Self::Float(_) => ScalarType::Float,
            Self::Double(_) => ScalarType::Double,
            Self::Bool(_) => ScalarType::Bool,
            Self::Binary(_) => ScalarType::Binary,
            Self::NChar(_) => ScalarType::NChar,
        }
    }

    /// Width of this value as a column would record it: bytes for `Binary`, characters
    /// for `NChar`, and the storage size for everything else.
    pub fn width(&self) -> u32 {
        let len = match self {
            Self::Binary(s) => s.len(),
            Self::NChar(s) => s.chars().count(),
            other => return other.scalar_type().fixed_width().unwrap_or_default(),
        };
        u32::try_from(len).unwrap_or(u32::MAX)
    }

    /// Copy out into an owned [`Value`].
    pub fn to_value(&self) -> Value {
        match self {
            Self::TinyInt(v) => Value::TinyInt(*v),
            Self::SmallInt(v) => Value::SmallInt(*v),
            Self::Int(v) => Value::Int(*v),
            Self::IntW(v) => Value::IntW(*v),
            Self::UInt(v) => Value::UInt(*v),
            Self::BigInt(v) => Value::BigInt(*v),
            Self::Float(v) => Value::Float(*v),
            Self::Double(v) => Value::Double(*v),
            Self::Bool(v) => Value::Bool(*v),
            Self::Binary(s) => Value::Binary(s.to_string()),
            Self::NChar(s) => Value::NChar(s.to_string()),
        }
    }
}

impl fmt::Display for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TinyInt(v) => write!(f, "{v}b"),
            Self::SmallInt(v) => write!(f, "{v}s"),
            Self::Int(v) => write!(f, "{v}i"),
            Self::IntW(v) => write!(f, "{v}w"),
            Self::UInt(v) => write!(f, "{v}u"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}{FLOAT_SUFFIX}"),
            // Debug keeps the decimal point on whole numbers
            Self::Double(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Binary(s) => write_quoted(f, s),
            Self::NChar(s) => {
                f.write_str("L")?;
                write_quoted(f, s)
            }
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    let mut last = 0;
    for (idx, delim) in value.match_indices(['"', '\\']) {
        write!(f, r#"{}\{delim}"#, &value[last..idx])?;
        last = idx + delim.len();
    }
    f.write_str(&value[last..])?;
    f.write_str("\"")
}

/// Classify an unquoted token.
pub fn infer_literal(token: &str) -> Result<Literal<'static>> {
    match token {
        "true" => return Ok(Literal::Bool(true)),
        "false" => return Ok(Literal::Bool(false)),
        _ => {}
    }

    let invalid = || Error::LiteralInvalid {
        value: token.to_string(),
    };
    let out_of_range = |scalar_type: ScalarType| Error::LiteralOutOfRange {
        value: token.to_string(),
        scalar_type,
    };

    if let Some(body) = token.strip_suffix(FLOAT_SUFFIX) {
        decimal_shape(body).ok_or_else(invalid)?;
        let v: f32 = body.parse().map_err(|_| invalid())?;
        if !v.is_finite() {
            return Err(out_of_range(ScalarType::Float));
        }
        return Ok(Literal::Float(v));
    }

    let suffixed = token.chars().last().and_then(|last| {
        INTEGER_SUFFIXES
            .iter()
            .find(|(suffix, _)| *suffix == last)
            .map(|(suffix, scalar_type)| (&token[..token.len() - suffix.len_utf8()], *scalar_type))
    });

    if let Some((body, scalar_type)) = suffixed {
        if decimal_shape(body) != Some(false) {
            return Err(invalid());
        }
        // the digit run is well formed, so a parse failure can only be range
        let v: i64 = body.parse().map_err(|_| out_of_range(scalar_type))?;
        let literal = match scalar_type {
            ScalarType::TinyInt => i8::try_from(v).ok().map(Literal::TinyInt),
            ScalarType::SmallInt => i16::try_from(v).ok().map(Literal::SmallInt),
            ScalarType::Int => i32::try_from(v).ok().map(Literal::Int),
            ScalarType::IntW => i32::try_from(v).ok().map(Literal::IntW),
            ScalarType::UInt => u32::try_from(v).ok().map(Literal::UInt),
            _ => None,
        };
        return literal.ok_or_else(|| out_of_range(scalar_type));
    }

    match decimal_shape(token) {
        Some(false) => token
            .parse()
            .map(Literal::BigInt)
            .map_err(|_| out_of_range(ScalarType::BigInt)),
        Some(true) => {
            let v: f64 = token.parse().map_err(|_| invalid())?;
            if v.is_finite() {
                Ok(Literal::Double(v))
            } else {
                Err(out_of_range(ScalarType::Double))
            }
        }
        None => Err(invalid()),
    }
}

/// Checks `s` against `-?digits(.digits)?`. Returns whether a fractional part is present,
/// or `None` when the shape does not match.
fn decimal_shape(s: &str) -> Option<bool> {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };

    let all_digits = |d: &str| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) {
        return None;
    }
    match fraction {
        Some(fraction) if all_digits(fraction) => Some(true),
        Some(_) => None,
        None => Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn suffix_table() {
        assert_eq!(infer_literal("32b").unwrap(), Literal::TinyInt(32));
        assert_eq!(infer_literal("-64s").unwrap(), Literal::SmallInt(-64));
        assert_eq!(infer_literal("3i").unwrap(), Literal::Int(3));
        assert_eq!(infer_literal("32w").unwrap(), Literal::IntW(32));
        assert_eq!(infer_literal("7u").unwrap(), Literal::UInt(7));
        assert_eq!(infer_literal("88.88f").unwrap(), Literal::Float(88.88));
        assert_eq!(infer_literal("2f").unwrap(), Literal::Float(2.0));
    }

    #[test]
    fn unsuffixed() {
        assert_eq!(infer_literal("4").unwrap(), Literal::BigInt(4));
        assert_eq!(infer_literal("-9223372036854775808").unwrap(), Literal::BigInt(i64::MIN));
        assert_eq!(infer_literal("0.5").unwrap(), Literal::Double(0.5));
        assert_eq!(infer_literal("true").unwrap(), Literal::Bool(true));
        assert_eq!(infer_literal("false").unwrap(), Literal::Bool(false));
    }

    #[test]
    fn int_and_w_are_distinct() {
        let i = infer_literal("32i").unwrap();
        let w = infer_literal("32w").unwrap();
        assert_ne!(i.scalar_type(), w.scalar_type());
        assert_eq!(i.width(), w.width());
    }

    #[test]
    fn out_of_range() {
        for (token, expected) in [
            ("128b", ScalarType::TinyInt),
            ("40000s", ScalarType::SmallInt),
            ("2147483648i", ScalarType::Int),
            ("-1u", ScalarType::UInt),
            ("99999999999999999999", ScalarType::BigInt),
            ("99999999999999999999i", ScalarType::Int),
        ] {
            match infer_literal(token) {
                Err(Error::LiteralOutOfRange { scalar_type, .. }) => {
                    assert_eq!(scalar_type, expected, "{token}")
                }
                other => panic!("{token}: expected out of range, got {other:?}"),
            }
        }
    }

    #[test]
    fn no_matching_rule() {
        for token in ["", "abc", "1.", ".5", "1.5i", "--1", "1x", "True", "i", "f", "1e5"] {
            assert!(
                matches!(infer_literal(token), Err(Error::LiteralInvalid { .. })),
                "{token}"
            );
        }
    }

    #[test]
    fn widths() {
        assert_eq!(Literal::Binary("iamszhou".into()).width(), 8);
        assert_eq!(Literal::NChar("passitagin_stf".into()).width(), 14);
        // multi-byte characters count once for NCHAR, per byte for BINARY
        assert_eq!(Literal::NChar("温度".into()).width(), 2);
        assert_eq!(Literal::Binary("温度".into()).width(), 6);
        assert_eq!(Literal::Bool(true).width(), 1);
        assert_eq!(Literal::BigInt(1).width(), 8);
    }

    #[test]
    fn owned_values() {
        assert_eq!(infer_literal("7u").unwrap().to_value(), Value::UInt(7));
        assert_eq!(
            Literal::NChar("ste".into()).to_value(),
            Value::NChar("ste".to_string())
        );
    }

    #[test]
    fn display() {
        assert_eq!(Literal::Double(4.0).to_string(), "4.0");
        assert_eq!(Literal::Float(88.88).to_string(), "88.88f");
        assert_eq!(Literal::UInt(7).to_string(), "7u");
        assert_eq!(Literal::NChar(r#"a"b\c"#.into()).to_string(), r#"L"a\"b\\c""#);
    }

    proptest! {
        #[test]
        fn small_ints_keep_their_suffix_type(v in any::<i16>()) {
            let literal = infer_literal(&format!("{v}s")).unwrap();
            prop_assert_eq!(literal.scalar_type(), ScalarType::SmallInt);
            prop_assert_eq!(literal, Literal::SmallInt(v));
        }

        #[test]
        fn bare_integers_are_bigint(v in any::<i64>()) {
            prop_assert_eq!(infer_literal(&v.to_string()).unwrap(), Literal::BigInt(v));
        }
    }
}
