//! The in memory buffer of a subtable.

use schemaless_id::ColumnId;
use schemaless_types::column::Value;
use schemaless_types::write::DuplicatePolicy;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("a row with timestamp {time} already exists")]
    DuplicateTimestamp { time: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A value for one field column of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: ColumnId,
    pub value: Value,
}

/// A row of a subtable. Fields the line did not carry are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub time: i64,
    pub fields: Vec<Field>,
}

impl Row {
    pub fn field(&self, id: ColumnId) -> Option<&Value> {
        self.fields.iter().find(|f| f.id == id).map(|f| &f.value)
    }
}

/// Rows of one subtable ordered by timestamp.
#[derive(Debug, Default)]
pub struct TableBuffer {
    rows: BTreeMap<i64, Vec<Row>>,
    row_count: usize,
}

impl TableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `row`, resolving a clash on its timestamp according to `policy`.
    pub fn add_row(&mut self, row: Row, policy: DuplicatePolicy) -> Result<()> {
        match self.rows.entry(row.time) {
            Entry::Vacant(entry) => {
                entry.insert(vec![row]);
                self.row_count += 1;
            }
            Entry::Occupied(mut entry) => match policy {
                DuplicatePolicy::Overwrite => {
                    let rows = entry.get_mut();
                    self.row_count -= rows.len();
                    rows.clear();
                    rows.push(row);
                    self.row_count += 1;
                }
                DuplicatePolicy::Coexist => {
                    entry.get_mut().push(row);
                    self.row_count += 1;
                }
                DuplicatePolicy::Reject => {
                    return Err(Error::DuplicateTimestamp { time: row.time });
                }
            },
        }
        Ok(())
    }

    /// Drop the rows stored at `time`.
    pub fn remove_time(&mut self, time: i64) {
        if let Some(rows) = self.rows.remove(&time) {
            self.row_count -= rows.len();
        }
    }

    pub fn contains_time(&self, time: i64) -> bool {
        self.rows.contains_key(&time)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Rows in timestamp order, and in arrival order within a timestamp.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.values().flatten()
    }

    pub fn timestamp_min_max(&self) -> Option<(i64, i64)> {
        let min = self.rows.keys().next()?;
        let max = self.rows.keys().next_back()?;
        Some((*min, *max))
    }
}
