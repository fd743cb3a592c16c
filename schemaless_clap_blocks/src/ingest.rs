//! Config for line ingestion and catalog limits.

use schemaless_catalog::catalog::CatalogLimits;
use schemaless_types::write::{ColumnOrder, DuplicatePolicy};
use schemaless_write::WriteConfig;

/// CLI config for the schema-less ingest path.
#[derive(Debug, Clone, Copy, clap::Parser)]
pub struct IngestConfig {
    /// Record lines that fail and keep ingesting the rest of the batch.
    ///
    /// When false, the first failing line fails the whole call and none of the batch's
    /// rows are stored.
    #[clap(
        long = "accept-partial",
        env = "SCHEMALESS_ACCEPT_PARTIAL",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub accept_partial: bool,

    /// What to do with a row whose subtable already holds a row at the same timestamp:
    /// `overwrite`, `coexist` or `reject`.
    #[clap(
        long = "duplicate-timestamps",
        env = "SCHEMALESS_DUPLICATE_TIMESTAMPS",
        default_value_t = DuplicatePolicy::default(),
        action
    )]
    pub duplicate_policy: DuplicatePolicy,

    /// Order in which the new columns of a line are appended: `first-seen` or `sorted`.
    #[clap(
        long = "column-order",
        env = "SCHEMALESS_COLUMN_ORDER",
        default_value_t = ColumnOrder::default(),
        action
    )]
    pub column_order: ColumnOrder,

    /// Maximum number of columns in a supertable, counting the timestamp and tags.
    ///
    /// Values above 65535 are capped at 65535.
    #[clap(
        long = "max-columns-per-table",
        env = "SCHEMALESS_MAX_COLUMNS_PER_TABLE",
        default_value_t = CatalogLimits::DEFAULT_MAX_COLUMNS_PER_TABLE,
        action
    )]
    pub max_columns_per_table: usize,

    /// Maximum number of tag columns in a supertable.
    #[clap(
        long = "max-tags-per-table",
        env = "SCHEMALESS_MAX_TAGS_PER_TABLE",
        default_value_t = CatalogLimits::DEFAULT_MAX_TAGS_PER_TABLE,
        action
    )]
    pub max_tags_per_table: usize,

    /// Maximum storage width in bytes of a string column.
    #[clap(
        long = "max-string-width",
        env = "SCHEMALESS_MAX_STRING_WIDTH",
        default_value_t = CatalogLimits::DEFAULT_MAX_STRING_WIDTH,
        action
    )]
    pub max_string_width: u32,

    /// Maximum number of databases.
    #[clap(
        long = "max-databases",
        env = "SCHEMALESS_MAX_DATABASES",
        default_value_t = CatalogLimits::DEFAULT_MAX_DATABASES,
        action
    )]
    pub max_databases: usize,
}

impl IngestConfig {
    pub fn catalog_limits(&self) -> CatalogLimits {
        CatalogLimits {
            max_databases: self.max_databases,
            max_columns_per_table: self.max_columns_per_table,
            max_tags_per_table: self.max_tags_per_table,
            max_string_width: self.max_string_width,
        }
    }

    pub fn write_config(&self) -> WriteConfig {
        WriteConfig {
            accept_partial: self.accept_partial,
            duplicate_policy: self.duplicate_policy,
            column_order: self.column_order,
        }
    }
}

impl From<&IngestConfig> for CatalogLimits {
    fn from(config: &IngestConfig) -> Self {
        config.catalog_limits()
    }
}

impl From<&IngestConfig> for WriteConfig {
    fn from(config: &IngestConfig) -> Self {
        config.write_config()
    }
}
