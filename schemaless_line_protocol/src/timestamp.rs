//! Timestamp tokens and their conversion to a database's precision.
//!
//! A token is a run of digits optionally followed by a unit suffix naming the unit the
//! digits are written in. Without a suffix the digits are already in the database
//! precision. A bare `0` stands for the ingest time.

use schemaless_types::write::Precision;
use snafu::Snafu;
use std::fmt;

#[derive(Debug, Snafu)]
pub enum TimestampError {
    #[snafu(display("Timestamp '{token}' does not start with a digit"))]
    TimestampEmpty { token: String },

    #[snafu(display("Timestamp '{token}' has an unrecognized unit suffix '{suffix}'"))]
    TimestampUnitUnknown { token: String, suffix: String },

    #[snafu(display("Timestamp '{token}' is out of range for {precision} precision"))]
    TimestampOverflow { token: String, precision: Precision },
}

/// The unit a timestamp literal is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// `b`
    Nanosecond,
    /// `u`
    Microsecond,
    /// `a`
    Millisecond,
    /// `s`
    Second,
    /// `m`
    Minute,
    /// `h`
    Hour,
    /// `d`
    Day,
    /// `w`
    Week,
}

impl TimeUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let unit = match suffix {
            "b" => Self::Nanosecond,
            "u" => Self::Microsecond,
            "a" => Self::Millisecond,
            "s" => Self::Second,
            "m" => Self::Minute,
            "h" => Self::Hour,
            "d" => Self::Day,
            "w" => Self::Week,
            _ => return None,
        };
        Some(unit)
    }

    pub fn suffix(&self) -> char {
        match self {
            Self::Nanosecond => 'b',
            Self::Microsecond => 'u',
            Self::Millisecond => 'a',
            Self::Second => 's',
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
        }
    }

    pub fn nanos(&self) -> i128 {
        const SECOND: i128 = 1_000_000_000;
        match self {
            Self::Nanosecond => 1,
            Self::Microsecond => 1_000,
            Self::Millisecond => 1_000_000,
            Self::Second => SECOND,
            Self::Minute => 60 * SECOND,
            Self::Hour => 3_600 * SECOND,
            Self::Day => 86_400 * SECOND,
            Self::Week => 7 * 86_400 * SECOND,
        }
    }
}

impl From<Precision> for TimeUnit {
    fn from(precision: Precision) -> Self {
        match precision {
            Precision::Millisecond => Self::Millisecond,
            Precision::Microsecond => Self::Microsecond,
            Precision::Nanosecond => Self::Nanosecond,
        }
    }
}

/// A parsed but not yet converted timestamp.
///
/// ```
/// use schemaless_line_protocol::timestamp::{TimeUnit, TimestampToken};
/// use schemaless_types::write::Precision;
///
/// let token = TimestampToken::parse("1626006933641a").unwrap();
/// assert_eq!(token.unit(), Some(TimeUnit::Millisecond));
/// assert_eq!(token.resolve(Precision::Microsecond, 0).unwrap(), 1_626_006_933_641_000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampToken<'a> {
    raw: &'a str,
    value: i128,
    unit: Option<TimeUnit>,
}

impl<'a> TimestampToken<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, TimestampError> {
        let digits_end = raw
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(raw.len());
        let (digits, suffix) = raw.split_at(digits_end);

        if digits.is_empty() {
            return Err(TimestampError::TimestampEmpty {
                token: raw.to_string(),
            });
        }

        let unit = if suffix.is_empty() {
            None
        } else {
            Some(TimeUnit::from_suffix(suffix).ok_or_else(|| {
                TimestampError::TimestampUnitUnknown {
                    token: raw.to_string(),
                    suffix: suffix.to_string(),
                }
            })?)
        };

        // only a digit run too long for i128 fails here
        let value = digits
            .parse()
            .map_err(|_| TimestampError::TimestampOverflow {
                token: raw.to_string(),
                precision: Precision::Nanosecond,
            })?;

        Ok(Self { raw, value, unit })
    }

    pub fn unit(&self) -> Option<TimeUnit> {
        self.unit
    }

    /// True for the bare `0` token, which resolves to the ingest time.
    pub fn is_now(&self) -> bool {
        self.value == 0 && self.unit.is_none()
    }

    /// Convert to ticks of `precision`. `now_nanos` is used for the bare `0` token.
    ///
    /// Conversions to a coarser unit truncate toward zero.
    pub fn resolve(&self, precision: Precision, now_nanos: i64) -> Result<i64, TimestampError> {
        let target = TimeUnit::from(precision).nanos();
        let (value, source) = if self.is_now() {
            (i128::from(now_nanos), TimeUnit::Nanosecond.nanos())
        } else {
            (self.value, self.unit.map_or(target, |u| u.nanos()))
        };

        // every unit is a whole multiple of the finer ones
        let converted = if source >= target {
            value.checked_mul(source / target)
        } else {
            Some(value / (target / source))
        };

        converted
            .and_then(|v| i64::try_from(v).ok())
            .ok_or_else(|| TimestampError::TimestampOverflow {
                token: self.raw.to_string(),
                precision,
            })
    }
}

impl fmt::Display for TimestampToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw)
    }
}

/// Parse and resolve `raw` in one step.
pub fn resolve_timestamp(
    raw: &str,
    precision: Precision,
    now_nanos: i64,
) -> Result<i64, TimestampError> {
    TimestampToken::parse(raw)?.resolve(precision, now_nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn unsuffixed_is_in_database_precision() {
        let ts = "1626006833639000000";
        assert_eq!(
            resolve_timestamp(ts, Precision::Microsecond, 0).unwrap(),
            1_626_006_833_639_000_000
        );
        assert_eq!(
            resolve_timestamp(ts, Precision::Nanosecond, 0).unwrap(),
            1_626_006_833_639_000_000
        );
    }

    #[test]
    fn millisecond_suffix_into_microseconds() {
        assert_eq!(
            resolve_timestamp("1626006933641a", Precision::Microsecond, 0).unwrap(),
            1_626_006_933_641_000
        );
    }

    #[test]
    fn coarser_precision_truncates() {
        assert_eq!(
            resolve_timestamp("1626006833639999999b", Precision::Millisecond, 0).unwrap(),
            1_626_006_833_639
        );
        assert_eq!(
            resolve_timestamp("1999u", Precision::Millisecond, 0).unwrap(),
            1
        );
    }

    #[test]
    fn every_suffix() {
        let cases = [
            ("1b", 1),
            ("1u", 1_000),
            ("1a", 1_000_000),
            ("1s", 1_000_000_000),
            ("1m", 60_000_000_000),
            ("1h", 3_600_000_000_000),
            ("1d", 86_400_000_000_000),
            ("1w", 604_800_000_000_000),
        ];
        for (token, nanos) in cases {
            assert_eq!(
                resolve_timestamp(token, Precision::Nanosecond, 0).unwrap(),
                nanos,
                "{token}"
            );
        }
    }

    #[test]
    fn bare_zero_is_now() {
        let now = 1_700_000_000_123_456_789;
        assert_eq!(
            resolve_timestamp("0", Precision::Millisecond, now).unwrap(),
            1_700_000_000_123
        );
        assert_eq!(
            resolve_timestamp("0", Precision::Nanosecond, now).unwrap(),
            now
        );
        // a suffixed zero is the epoch
        assert_eq!(resolve_timestamp("0s", Precision::Nanosecond, now).unwrap(), 0);
    }

    #[test]
    fn malformed() {
        assert!(matches!(
            TimestampToken::parse(""),
            Err(TimestampError::TimestampEmpty { .. })
        ));
        assert!(matches!(
            TimestampToken::parse("a"),
            Err(TimestampError::TimestampEmpty { .. })
        ));
        assert!(matches!(
            TimestampToken::parse("-5"),
            Err(TimestampError::TimestampEmpty { .. })
        ));

        let err = TimestampToken::parse("1626006933641x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Timestamp '1626006933641x' has an unrecognized unit suffix 'x'"
        );
        assert!(matches!(
            TimestampToken::parse("16ms"),
            Err(TimestampError::TimestampUnitUnknown { suffix, .. }) if suffix == "ms"
        ));
    }

    #[test]
    fn overflow() {
        assert!(matches!(
            resolve_timestamp("99999999999w", Precision::Nanosecond, 0),
            Err(TimestampError::TimestampOverflow { .. })
        ));
        assert!(matches!(
            resolve_timestamp("9223372036854775808", Precision::Nanosecond, 0),
            Err(TimestampError::TimestampOverflow { .. })
        ));
        assert!(matches!(
            resolve_timestamp(&"9".repeat(60), Precision::Nanosecond, 0),
            Err(TimestampError::TimestampOverflow { .. })
        ));
    }

    proptest! {
        #[test]
        fn seconds_into_millis(secs in 0i64..9_000_000_000) {
            let resolved = resolve_timestamp(&format!("{secs}s"), Precision::Millisecond, 0).unwrap();
            prop_assert_eq!(resolved, secs * 1_000);
        }
    }
}
