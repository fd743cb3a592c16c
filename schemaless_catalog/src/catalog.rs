//! Implementation of the Catalog that sits entirely in memory.

use crate::resolve::ResolvedLine;
use crate::subtable::SubtableDescription;
use crate::table::{ColumnDescription, ColumnSpec, TableDefinition};
use bimap::BiHashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use schemaless_id::{DbId, SubtablePath, TableId};
use schemaless_line_protocol::ParsedLine;
use schemaless_types::column::{ColumnKind, ScalarType};
use schemaless_types::write::{ColumnOrder, Precision};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone)]
pub enum Error {
    #[error("Database {} not found", db_name)]
    DatabaseNotFound { db_name: String },

    #[error("Database {} already exists", db_name)]
    DatabaseExists { db_name: String },

    #[error("Adding a new database would exceed limit of {} databases", limit)]
    TooManyDatabases { limit: usize },

    #[error("Table {} already exists in {}", table_name, db_name)]
    TableExists { db_name: String, table_name: String },

    #[error("Table {} not in DB schema for {}", table_name, db_name)]
    TableNotFound { db_name: String, table_name: String },

    #[error(
        "Column type mismatch on table {} column {}. Existing column is {} but attempted to add {}",
        table_name,
        column_name,
        existing,
        attempted
    )]
    ColumnTypeMismatch {
        table_name: String,
        column_name: String,
        existing: ScalarType,
        attempted: ScalarType,
    },

    #[error(
        "Column kind mismatch on table {} column {}. Existing column is a {} but attempted to use it as a {}",
        table_name,
        column_name,
        existing,
        attempted
    )]
    ColumnKindMismatch {
        table_name: String,
        column_name: String,
        existing: ColumnKind,
        attempted: ColumnKind,
    },

    #[error(
        "Column {} on table {} uses the name of the timestamp column",
        column_name,
        table_name
    )]
    ReservedColumnName {
        table_name: String,
        column_name: String,
    },

    #[error("Column {} is declared more than once on table {}", column_name, table_name)]
    DuplicateColumn {
        table_name: String,
        column_name: String,
    },

    #[error(
        "Update to schema of {} would exceed number of columns per table limit of {} columns",
        table_name,
        limit
    )]
    TooManyColumns { table_name: String, limit: usize },

    #[error(
        "Update to schema of {} would exceed number of tags per table limit of {} tags",
        table_name,
        limit
    )]
    TooManyTags { table_name: String, limit: usize },

    #[error(
        "Value for column {} on table {} needs {} bytes, over the limit of {}",
        column_name,
        table_name,
        width,
        limit
    )]
    StringTooWide {
        table_name: String,
        column_name: String,
        width: u32,
        limit: u32,
    },
}

impl Error {
    /// True for errors caused by the content of a line rather than the state of the
    /// catalog.
    pub fn is_schema_conflict(&self) -> bool {
        matches!(
            self,
            Self::ColumnTypeMismatch { .. }
                | Self::ColumnKindMismatch { .. }
                | Self::ReservedColumnName { .. }
                | Self::DuplicateColumn { .. }
                | Self::TooManyColumns { .. }
                | Self::TooManyTags { .. }
                | Self::StringTooWide { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Bounds on catalog growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogLimits {
    pub max_databases: usize,
    /// Including the timestamp column.
    pub max_columns_per_table: usize,
    pub max_tags_per_table: usize,
    /// Storage bytes of a single `BINARY` or `NCHAR` value.
    pub max_string_width: u32,
}

impl CatalogLimits {
    pub const DEFAULT_MAX_DATABASES: usize = 64;
    pub const DEFAULT_MAX_COLUMNS_PER_TABLE: usize = 4096;
    pub const DEFAULT_MAX_TAGS_PER_TABLE: usize = 128;
    pub const DEFAULT_MAX_STRING_WIDTH: u32 = 16374;
    /// Column ids are `u16`, so no table holds more columns than this whatever the
    /// configured maximum.
    pub const COLUMN_ID_LIMIT: usize = u16::MAX as usize;

    /// The enforced column maximum of a supertable.
    pub fn columns_per_table(&self) -> usize {
        self.max_columns_per_table.min(Self::COLUMN_ID_LIMIT)
    }
}

impl Default for CatalogLimits {
    fn default() -> Self {
        Self {
            max_databases: Self::DEFAULT_MAX_DATABASES,
            max_columns_per_table: Self::DEFAULT_MAX_COLUMNS_PER_TABLE,
            max_tags_per_table: Self::DEFAULT_MAX_TAGS_PER_TABLE,
            max_string_width: Self::DEFAULT_MAX_STRING_WIDTH,
        }
    }
}

#[derive(Debug)]
pub struct Catalog {
    inner: RwLock<InnerCatalog>,
    limits: CatalogLimits,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CatalogLimits::default())
    }
}

impl Catalog {
    pub fn new(limits: CatalogLimits) -> Self {
        Self {
            inner: RwLock::new(InnerCatalog::new()),
            limits,
        }
    }

    pub fn limits(&self) -> &CatalogLimits {
        &self.limits
    }

    pub fn create_database(
        &self,
        db_name: &str,
        precision: Precision,
    ) -> Result<Arc<DatabaseSchema>> {
        let mut inner = self.inner.write();

        if inner.db_map.contains_right(db_name) {
            return Err(Error::DatabaseExists {
                db_name: db_name.to_string(),
            });
        }
        if inner.databases.len() >= self.limits.max_databases {
            return Err(Error::TooManyDatabases {
                limit: self.limits.max_databases,
            });
        }

        let db_id = inner.next_db_id;
        inner.next_db_id = db_id.next();
        let db_name: Arc<str> = db_name.into();
        let db = Arc::new(DatabaseSchema::new(db_id, Arc::clone(&db_name), precision));
        inner.databases.insert(db_id, Arc::clone(&db));
        inner.db_map.insert(db_id, db_name);
        info!(db = %db.name, %precision, "created database");

        Ok(db)
    }

    pub fn db_name_to_id(&self, db_name: &str) -> Option<DbId> {
        self.inner.read().db_map.get_by_right(db_name).copied()
    }

    pub fn db_id_to_name(&self, db_id: DbId) -> Option<Arc<str>> {
        self.inner.read().db_map.get_by_left(&db_id).map(Arc::clone)
    }

    pub fn db_schema(&self, db_name: &str) -> Option<Arc<DatabaseSchema>> {
        let inner = self.inner.read();
        inner
            .db_map
            .get_by_right(db_name)
            .and_then(|id| inner.databases.get(id))
            .map(Arc::clone)
    }

    pub fn db_schema_by_id(&self, db_id: DbId) -> Option<Arc<DatabaseSchema>> {
        self.inner.read().databases.get(&db_id).map(Arc::clone)
    }

    pub fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .inner
            .read()
            .databases
            .values()
            .map(|db| db.name.to_string())
            .collect();
        names.sort();
        names
    }

    fn db_or_not_found(&self, db_name: &str) -> Result<Arc<DatabaseSchema>> {
        self.db_schema(db_name).ok_or_else(|| Error::DatabaseNotFound {
            db_name: db_name.to_string(),
        })
    }

    /// Register a supertable with declared columns before any line refers to it.
    pub fn create_super_table(
        &self,
        db_name: &str,
        table_name: &str,
        fields: &[ColumnSpec],
        tags: &[ColumnSpec],
    ) -> Result<Arc<SuperTable>> {
        let db = self.db_or_not_found(db_name)?;
        let (table, created) = db.insert_table(table_name, |table_id| {
            TableDefinition::from_specs(table_id, table_name.into(), fields, tags, &self.limits)
        })?;
        if !created {
            return Err(Error::TableExists {
                db_name: db_name.to_string(),
                table_name: table_name.to_string(),
            });
        }
        Ok(table)
    }

    /// Resolve the schema for `line` in `db`, creating its supertable, columns and
    /// subtable as needed.
    ///
    /// All schema work for one supertable happens under that table's lock, so concurrent
    /// lines that add the same column or tag set converge on a single definition.
    pub fn resolve_line(
        &self,
        db: &DatabaseSchema,
        line: &ParsedLine<'_>,
        order: ColumnOrder,
    ) -> Result<ResolvedLine> {
        let table_name = line.series.measurement.as_str();
        let (table, table_created) = match db.table(table_name) {
            Some(table) => (table, false),
            None => {
                // check against an empty table first so a rejected line creates nothing
                TableDefinition::new(TableId::from(0), table_name.into()).plan(
                    line,
                    order,
                    &self.limits,
                )?;
                db.insert_table(table_name, |table_id| {
                    Ok(TableDefinition::new(table_id, table_name.into()))
                })?
            }
        };

        let mut resolved = table.resolve_line(db, line, order, &self.limits)?;
        resolved.table_created = table_created;
        Ok(resolved)
    }

    /// Columns of `table_name` in position order.
    pub fn describe(&self, db_name: &str, table_name: &str) -> Result<Vec<ColumnDescription>> {
        let db = self.db_or_not_found(db_name)?;
        let table = db.table(table_name).ok_or_else(|| Error::TableNotFound {
            db_name: db_name.to_string(),
            table_name: table_name.to_string(),
        })?;
        Ok(table.definition().describe())
    }

    /// Every subtable in `db_name`, grouped by supertable in creation order.
    pub fn show_tables(&self, db_name: &str) -> Result<Vec<SubtableDescription>> {
        let db = self.db_or_not_found(db_name)?;
        let mut subtables = vec![];
        for table in db.tables() {
            let definition = table.definition();
            subtables.extend(definition.subtables().map(|s| SubtableDescription {
                name: Arc::clone(&s.name),
                super_table: Arc::clone(&table.name),
                tags: s.tags.clone(),
            }));
        }
        Ok(subtables)
    }
}

#[derive(Debug)]
struct InnerCatalog {
    databases: HashMap<DbId, Arc<DatabaseSchema>>,
    db_map: BiHashMap<DbId, Arc<str>>,
    next_db_id: DbId,
}

impl InnerCatalog {
    fn new() -> Self {
        Self {
            databases: HashMap::new(),
            db_map: BiHashMap::new(),
            next_db_id: DbId::from(0),
        }
    }
}

/// A destination database and its supertables.
#[derive(Debug)]
pub struct DatabaseSchema {
    pub id: DbId,
    pub name: Arc<str>,
    pub precision: Precision,
    tables: RwLock<TableMap>,
}

#[derive(Debug)]
struct TableMap {
    tables: HashMap<TableId, Arc<SuperTable>>,
    table_map: BiHashMap<TableId, Arc<str>>,
    next_table_id: TableId,
}

impl DatabaseSchema {
    pub fn new(id: DbId, name: Arc<str>, precision: Precision) -> Self {
        Self {
            id,
            name,
            precision,
            tables: RwLock::new(TableMap {
                tables: HashMap::new(),
                table_map: BiHashMap::new(),
                next_table_id: TableId::from(0),
            }),
        }
    }

    pub fn table(&self, table_name: &str) -> Option<Arc<SuperTable>> {
        let map = self.tables.read();
        map.table_map
            .get_by_right(table_name)
            .and_then(|id| map.tables.get(id))
            .map(Arc::clone)
    }

    /// Supertables in creation order.
    pub fn tables(&self) -> Vec<Arc<SuperTable>> {
        let mut tables: Vec<_> = self.tables.read().tables.values().map(Arc::clone).collect();
        tables.sort_by_key(|t| t.id);
        tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.read().tables.len()
    }

    /// Insert the table built by `build` unless `table_name` already exists. Returns the
    /// table under that name and whether it was created by this call.
    fn insert_table(
        &self,
        table_name: &str,
        build: impl FnOnce(TableId) -> Result<TableDefinition>,
    ) -> Result<(Arc<SuperTable>, bool)> {
        let mut map = self.tables.write();
        if let Some(existing) = map
            .table_map
            .get_by_right(table_name)
            .and_then(|id| map.tables.get(id))
        {
            return Ok((Arc::clone(existing), false));
        }

        let table_id = map.next_table_id;
        let definition = build(table_id)?;
        map.next_table_id = table_id.next();

        let name: Arc<str> = table_name.into();
        let table = Arc::new(SuperTable {
            id: table_id,
            name: Arc::clone(&name),
            definition: Mutex::new(definition),
        });
        map.tables.insert(table_id, Arc::clone(&table));
        map.table_map.insert(table_id, name);
        info!(db = %self.name, table = table_name, table_id = %table_id, "created super table");

        Ok((table, true))
    }
}

/// A supertable. Its schema and subtables sit behind a single lock.
#[derive(Debug)]
pub struct SuperTable {
    pub id: TableId,
    pub name: Arc<str>,
    definition: Mutex<TableDefinition>,
}

impl SuperTable {
    /// Lock the definition. Hold the guard only for in-memory work.
    pub fn definition(&self) -> MutexGuard<'_, TableDefinition> {
        self.definition.lock()
    }

    fn resolve_line(
        &self,
        db: &DatabaseSchema,
        line: &ParsedLine<'_>,
        order: ColumnOrder,
        limits: &CatalogLimits,
    ) -> Result<ResolvedLine> {
        let mut definition = self.definition.lock();

        let delta = definition.plan(line, order, limits)?;
        for column in &delta.new_columns {
            info!(
                db = %db.name,
                table = %self.name,
                column = %column.name,
                kind = %column.kind,
                column_type = %column.scalar_type,
                width = column.width,
                "added column"
            );
        }
        for column in &delta.widened {
            info!(
                db = %db.name,
                table = %self.name,
                column = %column.name,
                from = column.from,
                width = column.to,
                "widened column"
            );
        }
        let applied = definition.apply(delta);

        let tags = line
            .series
            .tag_set
            .iter()
            .flatten()
            .map(|(k, v)| (Arc::from(k.as_str()), v.to_value()))
            .collect();
        let (subtable_id, subtable_created) = definition.subtable_or_create(tags);
        if subtable_created {
            if let Some(subtable) = definition.subtable(subtable_id) {
                info!(
                    db = %db.name,
                    table = %self.name,
                    subtable = %subtable.name,
                    "created subtable"
                );
            }
        }

        // every key on the line is a column once the delta is applied
        let field_ids = line
            .field_set
            .iter()
            .filter_map(|(k, _)| definition.fields.get(k.as_str()).map(|c| c.id))
            .collect();

        Ok(ResolvedLine {
            path: SubtablePath {
                db_id: db.id,
                table_id: self.id,
                subtable_id,
            },
            field_ids,
            table_created: false,
            subtable_created,
            columns_added: applied.columns_added,
            columns_widened: applied.columns_widened,
        })
    }
}
