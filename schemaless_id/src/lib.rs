//! Identifiers handed out by the schema registry.
//!
//! Ids are scoped: a [`TableId`] is unique within its database, and a [`ColumnId`] or
//! [`SubtableId`] is unique within its supertable. The registry owns the counters, so
//! there is no process-wide id state.

use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Serialize, Deserialize, Hash)]
pub struct DbId(u32);

impl DbId {
    pub fn next(&self) -> Self {
        Self(self.0.checked_add(1).expect("Overflowed with DB IDs"))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DbId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for DbId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Serialize, Deserialize, Hash)]
pub struct TableId(u32);

impl TableId {
    pub fn next(&self) -> Self {
        Self(self.0.checked_add(1).expect("Overflowed with Table IDs"))
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for TableId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Serialize, Deserialize, Hash)]
pub struct ColumnId(u16);

impl ColumnId {
    pub fn next(&self) -> Self {
        Self(self.0.checked_add(1).expect("Overflowed with Column IDs"))
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for ColumnId {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one subtable (a fixed tag-value combination) of a supertable.
#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Serialize, Deserialize, Hash)]
pub struct SubtableId(u64);

impl SubtableId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubtableId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for SubtableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully qualified address of a subtable, used to key row storage.
#[derive(Debug, Copy, Clone, Eq, PartialOrd, Ord, PartialEq, Serialize, Deserialize, Hash)]
pub struct SubtablePath {
    pub db_id: DbId,
    pub table_id: TableId,
    pub subtable_id: SubtableId,
}
