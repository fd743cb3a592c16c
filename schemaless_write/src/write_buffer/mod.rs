//! Implementation of an in-memory buffer for schema-less writes.

pub mod table_buffer;
mod validator;

use crate::write_buffer::table_buffer::TableBuffer;
use crate::write_buffer::validator::{ValidRow, ValidatedLines, WriteValidator};
use crate::{
    Bufferer, IngestSummary, LineErrorKind, RowSet, WriteBuffer, WriteConfig, WriteLineError,
};
use dashmap::DashMap;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use schemaless_catalog::catalog::{self, Catalog, DatabaseSchema, SuperTable};
use schemaless_id::{ColumnId, SubtablePath};
use schemaless_line_protocol::{is_blank_or_comment, split_lines};
use schemaless_types::column::Value;
use schemaless_types::time::TimeProvider;
use schemaless_types::write::DuplicatePolicy;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("database {db_name:?} does not exist")]
    DestinationUnavailable { db_name: String },

    #[error("parsing for line protocol failed: {0}")]
    ParseError(WriteLineError),

    #[error("catalog error: {0}")]
    Catalog(#[from] catalog::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub struct WriteBufferImpl {
    catalog: Arc<Catalog>,
    buffer: DashMap<SubtablePath, Arc<Mutex<TableBuffer>>>,
    config: WriteConfig,
    time_provider: Arc<dyn TimeProvider>,
}

impl WriteBufferImpl {
    pub fn new(
        catalog: Arc<Catalog>,
        config: WriteConfig,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            catalog,
            buffer: DashMap::new(),
            config,
            time_provider,
        }
    }

    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    fn ingest<'a>(
        &self,
        db_name: &str,
        lines: impl IntoIterator<Item = (usize, &'a str)>,
    ) -> Result<IngestSummary> {
        debug!(db_name, "write_lp");
        let ingest_time = self.time_provider.now_nanos();

        let ValidatedLines {
            line_count,
            field_count,
            tag_count,
            mut errors,
            rows,
            stats,
        } = WriteValidator::initialize(db_name, Arc::clone(&self.catalog), ingest_time)?
            .parse_lines_and_update_schema(lines, &self.config)?
            .convert_lines_to_buffer();

        let policy = self.config.duplicate_policy;
        if !self.config.accept_partial && policy == DuplicatePolicy::Reject {
            // nothing may be stored if any line would be rejected
            if let Some(e) = self.first_duplicate(&rows) {
                return Err(Error::ParseError(e));
            }
        }

        let mut accepted_lines = 0;
        let mut stored = Vec::new();
        for ValidRow {
            path,
            row,
            line_number,
            original_line,
        } in rows
        {
            let buffer = Arc::clone(&self.buffer.entry(path).or_default());
            let time = row.time;
            let added = buffer.lock().add_row(row, policy);
            match added {
                Ok(()) => {
                    accepted_lines += 1;
                    if !self.config.accept_partial {
                        stored.push((buffer, time));
                    }
                }
                Err(e) => {
                    let e = WriteLineError {
                        original_line,
                        line_number,
                        kind: LineErrorKind::DuplicateTimestamp,
                        error_message: e.to_string(),
                    };
                    // a concurrent batch stored this timestamp after the pre-check
                    if !self.config.accept_partial {
                        // under reject each stored timestamp holds only this batch's row
                        for (buffer, time) in stored {
                            buffer.lock().remove_time(time);
                        }
                        return Err(Error::ParseError(e));
                    }
                    errors.push(e);
                }
            }
        }
        errors.sort_by_key(|e| e.line_number);

        if errors.is_empty() {
            debug!(
                db_name,
                line_count, field_count, tag_count, "buffered all lines"
            );
        } else {
            warn!(
                db_name,
                line_count,
                accepted_lines,
                failed_lines = errors.len(),
                "some lines in the batch were not ingested"
            );
        }

        Ok(IngestSummary {
            line_count,
            accepted_lines,
            errors,
            tables_created: stats.tables_created,
            subtables_created: stats.subtables_created,
            columns_added: stats.columns_added,
            columns_widened: stats.columns_widened,
        })
    }

    /// The first row that would clash with a stored row or an earlier row of the batch.
    fn first_duplicate(&self, rows: &[ValidRow]) -> Option<WriteLineError> {
        let mut seen = HashSet::with_capacity(rows.len());
        rows.iter()
            .find(|r| {
                let stored = self
                    .buffer
                    .get(&r.path)
                    .map(|b| Arc::clone(b.value()))
                    .is_some_and(|b| b.lock().contains_time(r.row.time));
                !seen.insert((r.path, r.row.time)) || stored
            })
            .map(|r| WriteLineError {
                original_line: r.original_line.clone(),
                line_number: r.line_number,
                kind: LineErrorKind::DuplicateTimestamp,
                error_message: table_buffer::Error::DuplicateTimestamp { time: r.row.time }
                    .to_string(),
            })
    }

    fn table(
        &self,
        db_name: &str,
        table_name: &str,
    ) -> Result<(Arc<DatabaseSchema>, Arc<SuperTable>)> {
        let db = self
            .catalog
            .db_schema(db_name)
            .ok_or_else(|| catalog::Error::DatabaseNotFound {
                db_name: db_name.to_string(),
            })?;
        let table = db
            .table(table_name)
            .ok_or_else(|| catalog::Error::TableNotFound {
                db_name: db_name.to_string(),
                table_name: table_name.to_string(),
            })?;
        Ok((db, table))
    }

    fn table_buffers(
        &self,
        db: &DatabaseSchema,
        table: &SuperTable,
    ) -> Vec<Arc<Mutex<TableBuffer>>> {
        self.buffer
            .iter()
            .filter(|e| e.key().db_id == db.id && e.key().table_id == table.id)
            .map(|e| Arc::clone(e.value()))
            .collect()
    }
}

/// Records of `lp` paired with the input line each one starts on. A record holding a
/// quoted newline spans several input lines.
fn numbered_records(lp: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut next_line = 1;
    split_lines(lp).map(move |record| {
        let line_number = next_line;
        next_line += 1 + record.matches('\n').count();
        (line_number, record)
    })
}

impl Bufferer for WriteBufferImpl {
    fn ingest_lines(&self, db_name: &str, lines: &[&str]) -> Result<IngestSummary> {
        self.ingest(
            db_name,
            lines.iter().enumerate().map(|(i, line)| (i + 1, *line)),
        )
    }

    fn ingest_lp(&self, db_name: &str, lp: &str) -> Result<IngestSummary> {
        self.ingest(
            db_name,
            numbered_records(lp).filter(|(_, record)| !is_blank_or_comment(record)),
        )
    }

    fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }
}

impl WriteBuffer for WriteBufferImpl {
    fn row_count(&self, db_name: &str, table_name: &str) -> Result<usize> {
        let (db, table) = self.table(db_name, table_name)?;
        Ok(self
            .table_buffers(&db, &table)
            .iter()
            .map(|b| b.lock().row_count())
            .sum())
    }

    fn rows(&self, db_name: &str, table_name: &str) -> Result<RowSet> {
        let (db, table) = self.table(db_name, table_name)?;

        // copy out what the projection needs so the definition isn't locked with a buffer
        let (columns, field_index, tag_index, subtables) = {
            let definition = table.definition();
            let columns: Vec<Arc<str>> = definition
                .describe()
                .into_iter()
                .map(|c| c.name)
                .collect();
            let field_index: HashMap<ColumnId, usize> = definition
                .fields()
                .enumerate()
                .map(|(i, c)| (c.id, i + 1))
                .collect();
            let first_tag = field_index.len() + 1;
            let tag_index: HashMap<Arc<str>, usize> = definition
                .tags()
                .enumerate()
                .map(|(i, c)| (Arc::clone(&c.name), first_tag + i))
                .collect();
            let subtables: Vec<_> = definition
                .subtables()
                .map(|s| (s.id, s.tags.clone()))
                .collect();
            (columns, field_index, tag_index, subtables)
        };

        let mut rows = vec![];
        for (subtable_id, tags) in subtables {
            let path = SubtablePath {
                db_id: db.id,
                table_id: table.id,
                subtable_id,
            };
            let Some(buffer) = self.buffer.get(&path).map(|b| Arc::clone(b.value())) else {
                continue;
            };
            let buffer = buffer.lock();
            for row in buffer.rows() {
                let mut values: Vec<Option<Value>> = vec![None; columns.len()];
                values[0] = Some(Value::Timestamp(row.time));
                for field in &row.fields {
                    if let Some(&i) = field_index.get(&field.id) {
                        values[i] = Some(field.value.clone());
                    }
                }
                for (key, value) in &tags {
                    if let Some(&i) = tag_index.get(key) {
                        values[i] = Some(value.clone());
                    }
                }
                rows.push(values);
            }
        }

        Ok(RowSet { columns, rows })
    }
}
