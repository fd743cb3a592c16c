//! This package ingests schema-less line protocol. Each line names a supertable, a set of
//! typed tag values identifying one of its subtables, typed field values and a timestamp.
//! Lines are checked and merged into the catalog's schema one at a time, so a batch can
//! create a table on its first line and add to it on later ones. Rows are then buffered
//! in memory per subtable.
//!
//! A bad line never fails a batch on its own: it is recorded as a [`WriteLineError`] and
//! the remaining lines go ahead. Only a missing destination database fails a whole call,
//! unless partial acceptance has been turned off.

pub mod write_buffer;

use schemaless_catalog::catalog::Catalog;
use schemaless_types::column::Value;
use schemaless_types::write::{ColumnOrder, DuplicatePolicy};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

pub use write_buffer::{Error, Result};

/// Accepts batches of line protocol.
pub trait Bufferer: Debug + Send + Sync + 'static {
    /// Ingest a batch given as individual lines. Line numbers in the summary are
    /// positions in `lines`, starting at 1.
    fn ingest_lines(&self, db_name: &str, lines: &[&str]) -> Result<IngestSummary>;

    /// Ingest newline delimited line protocol. Blank lines and `#` comments are skipped.
    fn ingest_lp(&self, db_name: &str, lp: &str) -> Result<IngestSummary>;

    /// Returns the catalog
    fn catalog(&self) -> Arc<Catalog>;
}

/// Reads back what has been buffered.
pub trait WriteBuffer: Bufferer {
    /// Number of rows stored across every subtable of `table_name`.
    fn row_count(&self, db_name: &str, table_name: &str) -> Result<usize>;

    /// Every row of `table_name`, projected onto the table's current columns.
    fn rows(&self, db_name: &str, table_name: &str) -> Result<RowSet>;
}

/// Settings for the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteConfig {
    /// Record failing lines and keep going. When off, the first failing line fails the
    /// call and none of the batch's rows are stored.
    pub accept_partial: bool,
    pub duplicate_policy: DuplicatePolicy,
    pub column_order: ColumnOrder,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            accept_partial: true,
            duplicate_policy: DuplicatePolicy::default(),
            column_order: ColumnOrder::default(),
        }
    }
}

/// Why a line was not ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineErrorKind {
    /// The line does not follow the grammar, or a literal matches no type.
    MalformedLine,
    /// The timestamp is empty, has an unknown unit or is out of range.
    InvalidTimestamp,
    /// The line disagrees with the stored schema or would exceed a limit.
    SchemaConflict,
    /// The subtable already holds a row at this timestamp and duplicates are rejected.
    DuplicateTimestamp,
}

/// A single write request can have many lines in it. This is the error information for a
/// single line that was not ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteLineError {
    pub original_line: String,
    pub line_number: usize,
    pub kind: LineErrorKind,
    pub error_message: String,
}

impl std::fmt::Display for WriteLineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: {:?}: {}",
            self.line_number, self.kind, self.error_message
        )
    }
}

/// The outcome of one ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Lines considered, not counting skipped blank and comment lines.
    pub line_count: usize,
    pub accepted_lines: usize,
    pub errors: Vec<WriteLineError>,
    pub tables_created: usize,
    pub subtables_created: usize,
    pub columns_added: usize,
    pub columns_widened: usize,
}

impl IngestSummary {
    pub fn failed_lines(&self) -> usize {
        self.errors.len()
    }

    /// `0` when every line was ingested, otherwise the number of failed lines, negated.
    pub fn code(&self) -> i64 {
        i64::try_from(self.failed_lines()).map_or(i64::MIN, |failed| -failed)
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Rows of a supertable read back from the buffer.
///
/// Columns are in `describe` order: the timestamp, the fields, then the tags. Values are
/// `None` where a row has nothing for a column, such as a field added after the row was
/// written or a tag its subtable does not carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<Arc<str>>,
    pub rows: Vec<Vec<Option<Value>>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.as_ref() == name)
    }

    /// The value of column `name` in row `row`.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }
}
