use serde::{Deserialize, Serialize};

/// The fixed timestamp precision of a database.
///
/// Timestamps without a unit suffix are interpreted directly in this precision, and every
/// stored row timestamp is expressed in it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Millisecond => "ms",
            Self::Microsecond => "us",
            Self::Nanosecond => "ns",
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let p = match s {
            "ms" => Self::Millisecond,
            "us" => Self::Microsecond,
            "ns" => Self::Nanosecond,
            _ => return Err(format!("unrecognized precision unit: {s}")),
        };
        Ok(p)
    }
}

/// What to do when a row lands on a `(subtable, timestamp)` that already holds a row.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// The later row replaces the earlier one.
    #[default]
    Overwrite,
    /// Both rows are kept, in submission order.
    Coexist,
    /// The later line fails and the stored row is left untouched.
    Reject,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overwrite => f.write_str("overwrite"),
            Self::Coexist => f.write_str("coexist"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "overwrite" => Ok(Self::Overwrite),
            "coexist" => Ok(Self::Coexist),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("unrecognized duplicate timestamp policy: {s}")),
        }
    }
}

/// Order in which the columns introduced by a single line are appended to a supertable.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnOrder {
    /// Columns keep the order in which their keys appear in the line.
    #[default]
    FirstSeen,
    /// Columns from one line are appended sorted by key.
    Sorted,
}

impl std::fmt::Display for ColumnOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstSeen => f.write_str("first-seen"),
            Self::Sorted => f.write_str("sorted"),
        }
    }
}

impl std::str::FromStr for ColumnOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "first-seen" => Ok(Self::FirstSeen),
            "sorted" => Ok(Self::Sorted),
            _ => Err(format!("unrecognized column order: {s}")),
        }
    }
}
