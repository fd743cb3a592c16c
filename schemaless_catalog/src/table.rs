//! Supertable definitions.

use crate::catalog::{CatalogLimits, Error, Result};
use crate::subtable::{SubtableDefinition, SubtableKey};
use indexmap::IndexMap;
use schemaless_id::{ColumnId, SubtableId, TableId};
use schemaless_types::column::{ColumnKind, ScalarType, Value};
use serde::Serialize;
use std::sync::Arc;

/// Name of the timestamp column of tables created from lines.
pub const TIME_COLUMN_NAME: &str = "_ts";

/// Note shown by `describe` against tag columns.
pub const TAG_NOTE: &str = "TAG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    pub id: ColumnId,
    pub name: Arc<str>,
    pub kind: ColumnKind,
    pub scalar_type: ScalarType,
    /// Characters for `NCHAR`, bytes for everything else.
    pub width: u32,
}

/// A column of a supertable created ahead of any line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub scalar_type: ScalarType,
    pub width: u32,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            width: scalar_type.fixed_width().unwrap_or_default(),
        }
    }

    /// Declared width of a `BINARY` or `NCHAR` column.
    pub fn with_width(mut self, width: u32) -> Self {
        if self.scalar_type.is_variable_width() {
            self.width = width;
        }
        self
    }
}

/// A row of `describe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub position: usize,
    pub name: Arc<str>,
    pub scalar_type: ScalarType,
    pub width: u32,
    pub note: &'static str,
}

/// The schema of one supertable along with its known subtables.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    table_id: TableId,
    table_name: Arc<str>,
    time_column: ColumnDefinition,
    pub(crate) fields: IndexMap<Arc<str>, ColumnDefinition>,
    pub(crate) tags: IndexMap<Arc<str>, ColumnDefinition>,
    /// Position in this map is the subtable's id.
    subtables: IndexMap<SubtableKey, SubtableDefinition>,
    next_column_id: ColumnId,
}

impl TableDefinition {
    /// An empty table holding only the timestamp column.
    pub fn new(table_id: TableId, table_name: Arc<str>) -> Self {
        Self::with_time_column(table_id, table_name, TIME_COLUMN_NAME)
    }

    fn with_time_column(table_id: TableId, table_name: Arc<str>, time_column: &str) -> Self {
        let time_id = ColumnId::from(0);
        Self {
            table_id,
            table_name,
            time_column: ColumnDefinition {
                id: time_id,
                name: time_column.into(),
                kind: ColumnKind::Timestamp,
                scalar_type: ScalarType::Timestamp,
                width: ScalarType::Timestamp.fixed_width().unwrap_or_default(),
            },
            fields: IndexMap::new(),
            tags: IndexMap::new(),
            subtables: IndexMap::new(),
            next_column_id: time_id.next(),
        }
    }

    /// Build a table from declared columns.
    ///
    /// If the first field is a `TIMESTAMP` it names the timestamp column, otherwise the
    /// table gets [`TIME_COLUMN_NAME`].
    pub fn from_specs(
        table_id: TableId,
        table_name: Arc<str>,
        fields: &[ColumnSpec],
        tags: &[ColumnSpec],
        limits: &CatalogLimits,
    ) -> Result<Self> {
        let (time_column, fields) = match fields.split_first() {
            Some((first, rest)) if first.scalar_type == ScalarType::Timestamp => {
                (first.name.as_str(), rest)
            }
            _ => (TIME_COLUMN_NAME, fields),
        };
        let mut table = Self::with_time_column(table_id, table_name, time_column);

        if tags.len() > limits.max_tags_per_table {
            return Err(Error::TooManyTags {
                table_name: table.table_name.to_string(),
                limit: limits.max_tags_per_table,
            });
        }
        if 1 + fields.len() + tags.len() > limits.columns_per_table() {
            return Err(Error::TooManyColumns {
                table_name: table.table_name.to_string(),
                limit: limits.columns_per_table(),
            });
        }

        let declared = fields
            .iter()
            .map(|spec| (spec, ColumnKind::Field))
            .chain(tags.iter().map(|spec| (spec, ColumnKind::Tag)));
        for (spec, kind) in declared {
            if spec.name == table.time_column.name.as_ref() || table.column(&spec.name).is_some() {
                return Err(Error::DuplicateColumn {
                    table_name: table.table_name.to_string(),
                    column_name: spec.name.clone(),
                });
            }
            table.check_width(&spec.name, spec.scalar_type, spec.width, limits)?;
            table.insert_column(spec.name.as_str().into(), kind, spec.scalar_type, spec.width);
        }

        Ok(table)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_name(&self) -> &Arc<str> {
        &self.table_name
    }

    pub fn time_column(&self) -> &ColumnDefinition {
        &self.time_column
    }

    /// Field columns in position order.
    pub fn fields(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.fields.values()
    }

    /// Tag columns in position order.
    pub fn tags(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.tags.values()
    }

    /// Look up a tag or field column. The timestamp column is not included.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.fields.get(name).or_else(|| self.tags.get(name))
    }

    pub fn column_exists(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Total number of columns, including the timestamp column.
    pub fn num_columns(&self) -> usize {
        1 + self.fields.len() + self.tags.len()
    }

    pub(crate) fn insert_column(
        &mut self,
        name: Arc<str>,
        kind: ColumnKind,
        scalar_type: ScalarType,
        width: u32,
    ) -> ColumnId {
        let id = self.next_column_id;
        self.next_column_id = id.next();
        let column = ColumnDefinition {
            id,
            name: Arc::clone(&name),
            kind,
            scalar_type,
            width,
        };
        match kind {
            ColumnKind::Tag => self.tags.insert(name, column),
            _ => self.fields.insert(name, column),
        };
        id
    }

    pub(crate) fn widen_column(&mut self, name: &str, width: u32) -> bool {
        let column = self
            .fields
            .get_mut(name)
            .or_else(|| self.tags.get_mut(name));
        match column {
            Some(column) if width > column.width => {
                column.width = width;
                true
            }
            _ => false,
        }
    }

    /// Fails if a value of `width` would exceed the string width limit.
    pub(crate) fn check_width(
        &self,
        column_name: &str,
        scalar_type: ScalarType,
        width: u32,
        limits: &CatalogLimits,
    ) -> Result<()> {
        let bytes = scalar_type.storage_bytes(width);
        if scalar_type.is_variable_width() && bytes > limits.max_string_width {
            return Err(Error::StringTooWide {
                table_name: self.table_name.to_string(),
                column_name: column_name.to_string(),
                width: bytes,
                limit: limits.max_string_width,
            });
        }
        Ok(())
    }

    /// Return the subtable for `tags`, creating it if this tag set has not been seen.
    pub fn subtable_or_create(&mut self, tags: Vec<(Arc<str>, Value)>) -> (SubtableId, bool) {
        let key = SubtableKey::new(tags.iter().map(|(k, v)| (k, v)));
        if let Some(idx) = self.subtables.get_index_of(&key) {
            return (SubtableId::from(idx as u64), false);
        }

        let id = SubtableId::from(self.subtables.len() as u64);
        let name = key.subtable_name(&self.table_name);
        let mut tags = tags;
        tags.sort_by(|a, b| a.0.cmp(&b.0));
        self.subtables
            .insert(key, SubtableDefinition { id, name, tags });
        (id, true)
    }

    pub fn subtable(&self, id: SubtableId) -> Option<&SubtableDefinition> {
        usize::try_from(id.as_u64())
            .ok()
            .and_then(|idx| self.subtables.get_index(idx))
            .map(|(_, subtable)| subtable)
    }

    pub fn subtables(&self) -> impl Iterator<Item = &SubtableDefinition> {
        self.subtables.values()
    }

    pub fn num_subtables(&self) -> usize {
        self.subtables.len()
    }

    /// Columns in position order: timestamp, fields, then tags.
    pub fn describe(&self) -> Vec<ColumnDescription> {
        std::iter::once(&self.time_column)
            .chain(self.fields.values())
            .chain(self.tags.values())
            .enumerate()
            .map(|(position, column)| ColumnDescription {
                position,
                name: Arc::clone(&column.name),
                scalar_type: column.scalar_type,
                width: column.width,
                note: if column.kind == ColumnKind::Tag {
                    TAG_NOTE
                } else {
                    ""
                },
            })
            .collect()
    }
}
