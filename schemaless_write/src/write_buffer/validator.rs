use std::sync::Arc;

use schemaless_catalog::catalog::{Catalog, DatabaseSchema};
use schemaless_catalog::resolve::ResolvedLine;
use schemaless_id::SubtablePath;
use schemaless_line_protocol::timestamp::TimestampToken;
use schemaless_line_protocol::{ParsedLine, parse_line};
use tracing::debug;

use crate::{LineErrorKind, WriteConfig, WriteLineError};

use super::table_buffer::{Field, Row};
use super::{Error, Result};

pub(crate) struct WithCatalog {
    catalog: Arc<Catalog>,
    db_schema: Arc<DatabaseSchema>,
    /// Nanoseconds since the epoch at which the batch arrived
    ingest_time: i64,
}

pub(crate) struct LinesParsed<'raw> {
    catalog: WithCatalog,
    lines: Vec<ResolvedRawLine<'raw>>,
    line_count: usize,
    errors: Vec<WriteLineError>,
    stats: SchemaStats,
}

struct ResolvedRawLine<'raw> {
    line: ParsedLine<'raw>,
    raw_line: &'raw str,
    line_number: usize,
    time: i64,
    resolved: ResolvedLine,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SchemaStats {
    pub(crate) tables_created: usize,
    pub(crate) subtables_created: usize,
    pub(crate) columns_added: usize,
    pub(crate) columns_widened: usize,
}

impl SchemaStats {
    fn record(&mut self, resolved: &ResolvedLine) {
        self.tables_created += usize::from(resolved.table_created);
        self.subtables_created += usize::from(resolved.subtable_created);
        self.columns_added += resolved.columns_added;
        self.columns_widened += resolved.columns_widened;
    }
}

pub(crate) struct WriteValidator<State> {
    state: State,
}

impl WriteValidator<WithCatalog> {
    /// Initialize the [`WriteValidator`] by getting a handle to the [`DatabaseSchema`] for
    /// the given database name `db_name`. The database must already exist.
    pub(crate) fn initialize(
        db_name: &str,
        catalog: Arc<Catalog>,
        ingest_time: i64,
    ) -> Result<WriteValidator<WithCatalog>> {
        let db_schema = catalog
            .db_schema(db_name)
            .ok_or_else(|| Error::DestinationUnavailable {
                db_name: db_name.to_string(),
            })?;
        Ok(WriteValidator {
            state: WithCatalog {
                catalog,
                db_schema,
                ingest_time,
            },
        })
    }

    /// Parse each line, resolve its timestamp, and merge its columns and tag set into the
    /// catalog.
    ///
    /// # Implementation Note
    ///
    /// Schema changes are applied line by line as they are resolved, so a later line in
    /// the batch sees the columns added by an earlier one. Those changes stay even if the
    /// call fails later on, which is safe since they only ever add or widen.
    pub(crate) fn parse_lines_and_update_schema<'raw>(
        self,
        lines: impl IntoIterator<Item = (usize, &'raw str)>,
        config: &WriteConfig,
    ) -> Result<WriteValidator<LinesParsed<'raw>>> {
        let mut errors = vec![];
        let mut resolved_lines = vec![];
        let mut stats = SchemaStats::default();
        let mut line_count = 0;

        for (line_number, raw_line) in lines {
            line_count += 1;
            match self.validate_line(line_number, raw_line, config) {
                Ok(line) => {
                    stats.record(&line.resolved);
                    resolved_lines.push(line);
                }
                Err(e) => {
                    debug!(
                        db = %self.state.db_schema.name,
                        line_number = e.line_number,
                        kind = ?e.kind,
                        error = %e.error_message,
                        "rejected line"
                    );
                    if !config.accept_partial {
                        return Err(Error::ParseError(e));
                    }
                    errors.push(e);
                }
            }
        }

        debug!(
            db = %self.state.db_schema.name,
            line_count,
            valid = resolved_lines.len(),
            invalid = errors.len(),
            "parsed batch"
        );

        Ok(WriteValidator {
            state: LinesParsed {
                catalog: self.state,
                lines: resolved_lines,
                line_count,
                errors,
                stats,
            },
        })
    }

    fn validate_line<'raw>(
        &self,
        line_number: usize,
        raw_line: &'raw str,
        config: &WriteConfig,
    ) -> Result<ResolvedRawLine<'raw>, WriteLineError> {
        let line_error = |kind, message: String| WriteLineError {
            original_line: raw_line.to_string(),
            line_number,
            kind,
            error_message: message,
        };
        let db_schema = &self.state.db_schema;

        let line = parse_line(raw_line)
            .map_err(|e| line_error(LineErrorKind::MalformedLine, e.to_string()))?;

        let time = TimestampToken::parse(line.timestamp)
            .and_then(|token| token.resolve(db_schema.precision, self.state.ingest_time))
            .map_err(|e| line_error(LineErrorKind::InvalidTimestamp, e.to_string()))?;

        let resolved = self
            .state
            .catalog
            .resolve_line(db_schema, &line, config.column_order)
            .map_err(|e| line_error(LineErrorKind::SchemaConflict, e.to_string()))?;

        Ok(ResolvedRawLine {
            line,
            raw_line,
            line_number,
            time,
            resolved,
        })
    }
}

/// A row ready to be buffered, along with the line it came from.
#[derive(Debug)]
pub(crate) struct ValidRow {
    pub(crate) path: SubtablePath,
    pub(crate) row: Row,
    pub(crate) line_number: usize,
    pub(crate) original_line: String,
}

/// Result of conversion from line protocol to valid rows along with some summary data.
#[derive(Debug)]
pub(crate) struct ValidatedLines {
    /// Number of lines passed in
    pub(crate) line_count: usize,
    /// Number of fields passed in
    pub(crate) field_count: usize,
    /// Number of tags passed in
    pub(crate) tag_count: usize,
    /// Any errors that occurred while parsing the lines
    pub(crate) errors: Vec<WriteLineError>,
    /// Only valid lines from what was passed in, in submission order
    pub(crate) rows: Vec<ValidRow>,
    pub(crate) stats: SchemaStats,
}

impl WriteValidator<LinesParsed<'_>> {
    /// Build a typed row for every valid line. Nothing here takes a catalog lock.
    pub(crate) fn convert_lines_to_buffer(self) -> ValidatedLines {
        let mut field_count = 0;
        let mut tag_count = 0;

        let rows = self
            .state
            .lines
            .into_iter()
            .map(|l| {
                field_count += l.line.field_set.len();
                tag_count += l.line.series.tag_set.as_ref().map_or(0, |t| t.len());

                // field ids line up with the line's fields
                let fields = l
                    .resolved
                    .field_ids
                    .iter()
                    .zip(l.line.field_set.iter())
                    .map(|(id, (_, literal))| Field {
                        id: *id,
                        value: literal.to_value(),
                    })
                    .collect();

                ValidRow {
                    path: l.resolved.path,
                    row: Row {
                        time: l.time,
                        fields,
                    },
                    line_number: l.line_number,
                    original_line: l.raw_line.to_string(),
                }
            })
            .collect();

        ValidatedLines {
            line_count: self.state.line_count,
            field_count,
            tag_count,
            errors: self.state.errors,
            rows,
            stats: self.state.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use schemaless_catalog::catalog::Catalog;
    use schemaless_types::column::Value;
    use schemaless_types::write::Precision;

    use crate::{LineErrorKind, WriteConfig, write_buffer::Error};

    use super::WriteValidator;

    fn catalog() -> Arc<Catalog> {
        let catalog = Arc::new(Catalog::default());
        catalog
            .create_database("test", Precision::Microsecond)
            .unwrap();
        catalog
    }

    fn numbered<'a>(lines: &[&'a str]) -> Vec<(usize, &'a str)> {
        lines.iter().copied().enumerate().map(|(i, l)| (i + 1, l)).collect()
    }

    #[test]
    fn write_validator() -> Result<(), Error> {
        let catalog = catalog();
        let result = WriteValidator::initialize("test", Arc::clone(&catalog), 0)?
            .parse_lines_and_update_schema(
                numbered(&[r#"cpu,host="a" usage=0.5,count=3i 1626006933641a"#]),
                &WriteConfig::default(),
            )?
            .convert_lines_to_buffer();

        assert_eq!(result.line_count, 1);
        assert_eq!(result.field_count, 2);
        assert_eq!(result.tag_count, 1);
        assert!(result.errors.is_empty());
        assert_eq!(result.stats.tables_created, 1);
        assert_eq!(result.stats.subtables_created, 1);
        assert_eq!(result.stats.columns_added, 3);

        let row = &result.rows[0];
        assert_eq!(row.row.time, 1_626_006_933_641_000);
        let values: Vec<_> = row.row.fields.iter().map(|f| f.value.clone()).collect();
        assert_eq!(values, vec![Value::Double(0.5), Value::Int(3)]);

        Ok(())
    }

    #[test]
    fn unknown_database() {
        let err = WriteValidator::initialize("nope", catalog(), 0).err().unwrap();
        assert!(matches!(err, Error::DestinationUnavailable { .. }), "{err}");
    }

    #[test_log::test]
    fn errors_are_classified() {
        let result = WriteValidator::initialize("test", catalog(), 0)
            .unwrap()
            .parse_lines_and_update_schema(
                numbered(&[
                    "st c1=true 1",
                    "st c1 2",
                    "st c1=false 3x",
                    "st c1=5 4",
                    "st c1=false 5",
                ]),
                &WriteConfig::default(),
            )
            .unwrap()
            .convert_lines_to_buffer();

        let kinds: Vec<_> = result.errors.iter().map(|e| (e.line_number, e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (2, LineErrorKind::MalformedLine),
                (3, LineErrorKind::InvalidTimestamp),
                (4, LineErrorKind::SchemaConflict),
            ]
        );
        assert_eq!(result.errors[1].original_line, "st c1=false 3x");
        assert_eq!(result.line_count, 5);
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn bad_timestamp_does_not_touch_schema() {
        let catalog = catalog();
        WriteValidator::initialize("test", Arc::clone(&catalog), 0)
            .unwrap()
            .parse_lines_and_update_schema(numbered(&["st c9=1i 1q"]), &WriteConfig::default())
            .unwrap();
        assert!(catalog.db_schema("test").unwrap().table("st").is_none());
    }

    #[test]
    fn without_partial_acceptance_first_error_fails() {
        let config = WriteConfig {
            accept_partial: false,
            ..Default::default()
        };
        let err = WriteValidator::initialize("test", catalog(), 0)
            .unwrap()
            .parse_lines_and_update_schema(numbered(&["st c1=1i 1", "st c1=1i"]), &config)
            .err()
            .unwrap();
        match err {
            Error::ParseError(e) => {
                assert_eq!(e.line_number, 2);
                assert_eq!(e.kind, LineErrorKind::MalformedLine);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
