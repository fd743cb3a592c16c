//! Schema resolution for a single line.
//!
//! Resolution has two steps. [`TableDefinition::plan`] compares a parsed line with the
//! current schema and returns the [`SchemaDelta`] needed to accept it, or the conflict
//! that rejects it. It does not modify anything. [`TableDefinition::apply`] then folds the
//! delta into the schema. Keeping them apart means a rejected line never leaves a partial
//! change behind.

use crate::catalog::{CatalogLimits, Error, Result};
use crate::table::TableDefinition;
use schemaless_id::{ColumnId, SubtableId, SubtablePath, TableId};
use schemaless_line_protocol::{Literal, ParsedLine};
use schemaless_types::column::{ColumnKind, ScalarType};
use schemaless_types::write::ColumnOrder;
use std::sync::Arc;

/// The schema changes a line needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchemaDelta {
    pub new_columns: Vec<NewColumn>,
    pub widened: Vec<WidenedColumn>,
}

impl SchemaDelta {
    pub fn is_empty(&self) -> bool {
        self.new_columns.is_empty() && self.widened.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumn {
    pub name: Arc<str>,
    pub kind: ColumnKind,
    pub scalar_type: ScalarType,
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidenedColumn {
    pub name: Arc<str>,
    pub from: u32,
    pub to: u32,
}

/// What [`TableDefinition::apply`] actually changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    pub columns_added: usize,
    pub columns_widened: usize,
}

/// The outcome of resolving a line against its supertable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLine {
    pub path: SubtablePath,
    /// Column ids of the line's fields, in the order they appear on the line.
    pub field_ids: Vec<ColumnId>,
    pub table_created: bool,
    pub subtable_created: bool,
    pub columns_added: usize,
    pub columns_widened: usize,
}

impl ResolvedLine {
    pub fn table_id(&self) -> TableId {
        self.path.table_id
    }

    pub fn subtable_id(&self) -> SubtableId {
        self.path.subtable_id
    }
}

impl TableDefinition {
    /// Work out the changes needed to accept `line`, or why it can't be accepted.
    pub fn plan(
        &self,
        line: &ParsedLine<'_>,
        order: ColumnOrder,
        limits: &CatalogLimits,
    ) -> Result<SchemaDelta> {
        let tags = line
            .series
            .tag_set
            .iter()
            .flatten()
            .map(|(k, v)| (k, v, ColumnKind::Tag));
        let fields = line
            .field_set
            .iter()
            .map(|(k, v)| (k, v, ColumnKind::Field));

        let mut new_tags: Vec<NewColumn> = vec![];
        let mut new_fields: Vec<NewColumn> = vec![];
        let mut widened = vec![];

        for (key, literal, kind) in tags.chain(fields) {
            let name = key.as_str();
            if name == self.time_column().name.as_ref() {
                return Err(Error::ReservedColumnName {
                    table_name: self.table_name().to_string(),
                    column_name: name.to_string(),
                });
            }

            match self.column(name) {
                Some(existing) => {
                    self.check_compatible(name, existing.kind, existing.scalar_type, kind, literal)?;
                    let width = literal.width();
                    if existing.scalar_type.is_variable_width() && width > existing.width {
                        self.check_width(name, existing.scalar_type, width, limits)?;
                        widened.push(WidenedColumn {
                            name: Arc::clone(&existing.name),
                            from: existing.width,
                            to: width,
                        });
                    }
                }
                None => {
                    // keys are unique within each set, but a tag and a field may share one
                    if let Some(tag) = new_tags.iter().find(|c| c.name.as_ref() == name) {
                        self.check_compatible(name, tag.kind, tag.scalar_type, kind, literal)?;
                    }
                    let scalar_type = literal.scalar_type();
                    let width = literal.width();
                    self.check_width(name, scalar_type, width, limits)?;
                    let column = NewColumn {
                        name: name.into(),
                        kind,
                        scalar_type,
                        width,
                    };
                    match kind {
                        ColumnKind::Tag => new_tags.push(column),
                        _ => new_fields.push(column),
                    }
                }
            }
        }

        if self.tags.len() + new_tags.len() > limits.max_tags_per_table {
            return Err(Error::TooManyTags {
                table_name: self.table_name().to_string(),
                limit: limits.max_tags_per_table,
            });
        }
        if self.num_columns() + new_tags.len() + new_fields.len() > limits.columns_per_table() {
            return Err(Error::TooManyColumns {
                table_name: self.table_name().to_string(),
                limit: limits.columns_per_table(),
            });
        }

        if order == ColumnOrder::Sorted {
            new_tags.sort_by(|a, b| a.name.cmp(&b.name));
            new_fields.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let mut new_columns = new_tags;
        new_columns.append(&mut new_fields);
        Ok(SchemaDelta {
            new_columns,
            widened,
        })
    }

    fn check_compatible(
        &self,
        name: &str,
        existing_kind: ColumnKind,
        existing_type: ScalarType,
        kind: ColumnKind,
        literal: &Literal<'_>,
    ) -> Result<()> {
        if existing_kind != kind {
            return Err(Error::ColumnKindMismatch {
                table_name: self.table_name().to_string(),
                column_name: name.to_string(),
                existing: existing_kind,
                attempted: kind,
            });
        }
        let attempted = literal.scalar_type();
        if existing_type != attempted {
            return Err(Error::ColumnTypeMismatch {
                table_name: self.table_name().to_string(),
                column_name: name.to_string(),
                existing: existing_type,
                attempted,
            });
        }
        Ok(())
    }

    /// Fold a planned delta into this schema.
    ///
    /// Applying is idempotent: a column that already exists is only widened, and widening
    /// never shrinks a column.
    pub fn apply(&mut self, delta: SchemaDelta) -> AppliedDelta {
        let mut applied = AppliedDelta::default();
        for column in delta.new_columns {
            if self.column_exists(&column.name) {
                if self.widen_column(&column.name, column.width) {
                    applied.columns_widened += 1;
                }
                continue;
            }
            self.insert_column(column.name, column.kind, column.scalar_type, column.width);
            applied.columns_added += 1;
        }
        for column in delta.widened {
            if self.widen_column(&column.name, column.to) {
                applied.columns_widened += 1;
            }
        }
        applied
    }
}
