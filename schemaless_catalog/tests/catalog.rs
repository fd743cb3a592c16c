use pretty_assertions::assert_eq;
use schemaless_catalog::catalog::{Catalog, CatalogLimits, Error};
use schemaless_catalog::table::{ColumnSpec, TAG_NOTE};
use schemaless_line_protocol::parse_line;
use schemaless_types::column::{ScalarType, Value};
use schemaless_types::write::{ColumnOrder, Precision};

fn resolve(catalog: &Catalog, line: &str) -> Result<(), Error> {
    let db = catalog.db_schema("db").unwrap();
    let line = parse_line(line).unwrap();
    catalog.resolve_line(&db, &line, ColumnOrder::FirstSeen)?;
    Ok(())
}

fn catalog_with(limits: CatalogLimits) -> Catalog {
    let catalog = Catalog::new(limits);
    catalog.create_database("db", Precision::Nanosecond).unwrap();
    catalog
}

#[test_log::test]
fn describe_lists_timestamp_fields_then_tags() {
    let catalog = catalog_with(CatalogLimits::default());
    resolve(&catalog, r#"m,site=L"lab" temp=21.5,ok=true,note="warm" 1"#).unwrap();
    resolve(&catalog, r#"m,site=L"laboratory",rack=2u temp=22.0,fan=3s 2"#).unwrap();

    let described = catalog.describe("db", "m").unwrap();
    let summary: Vec<_> = described
        .iter()
        .map(|c| (c.position, c.name.as_ref(), c.scalar_type, c.width, c.note))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, "_ts", ScalarType::Timestamp, 8, ""),
            (1, "temp", ScalarType::Double, 8, ""),
            (2, "ok", ScalarType::Bool, 1, ""),
            (3, "note", ScalarType::Binary, 4, ""),
            (4, "fan", ScalarType::SmallInt, 2, ""),
            (5, "site", ScalarType::NChar, 10, TAG_NOTE),
            (6, "rack", ScalarType::UInt, 4, TAG_NOTE),
        ]
    );
}

#[test]
fn subtable_names_are_stable_across_catalogs() {
    let names = |lines: &[&str]| {
        let catalog = catalog_with(CatalogLimits::default());
        for line in lines {
            resolve(&catalog, line).unwrap();
        }
        let mut names: Vec<String> = catalog
            .show_tables("db")
            .unwrap()
            .into_iter()
            .map(|s| s.name.to_string())
            .collect();
        names.sort();
        names
    };

    let first = names(&["m,a=1i,b=2i v=1i 1", "m,b=3i v=1i 2"]);
    let second = names(&["m,b=3i v=1i 5", "m,b=2i,a=1i v=1i 6"]);
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|n| n.len() == 34 && n.starts_with("t_")));
}

#[test]
fn show_tables_reports_tag_values() {
    let catalog = catalog_with(CatalogLimits::default());
    resolve(&catalog, r#"m,host="a",core=1i v=1i 1"#).unwrap();
    resolve(&catalog, "n v=1i 1").unwrap();

    let tables = catalog.show_tables("db").unwrap();
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].super_table.as_ref(), "m");
    assert_eq!(
        tables[0]
            .tags
            .iter()
            .map(|(k, v)| (k.as_ref(), v.clone()))
            .collect::<Vec<_>>(),
        vec![("core", Value::Int(1)), ("host", Value::Binary("a".into()))]
    );
    // a measurement without tags still gets one subtable
    assert_eq!(tables[1].super_table.as_ref(), "n");
    assert!(tables[1].tags.is_empty());
}

#[test]
fn column_limit_counts_timestamp() {
    let catalog = catalog_with(CatalogLimits {
        max_columns_per_table: 3,
        ..Default::default()
    });
    resolve(&catalog, "m a=1i,b=1i 1").unwrap();
    let err = resolve(&catalog, "m c=1i 2").unwrap_err();
    assert!(matches!(err, Error::TooManyColumns { limit: 3, .. }), "{err}");
    assert!(err.is_schema_conflict());
    assert_eq!(catalog.describe("db", "m").unwrap().len(), 3);

    // known columns still resolve
    resolve(&catalog, "m a=2i 3").unwrap();
}

#[test]
fn column_limit_is_capped_by_column_ids() {
    let limits = CatalogLimits {
        max_columns_per_table: 100_000,
        ..Default::default()
    };
    assert_eq!(limits.columns_per_table(), CatalogLimits::COLUMN_ID_LIMIT);
    assert_eq!(CatalogLimits::default().columns_per_table(), 4096);

    let catalog = catalog_with(limits);
    let fields = |n: usize| -> Vec<ColumnSpec> {
        (0..n)
            .map(|i| ColumnSpec::new(format!("f{i}"), ScalarType::Int))
            .collect()
    };

    // the timestamp plus 65535 fields is one column too many
    let err = catalog
        .create_super_table("db", "over", &fields(65535), &[])
        .unwrap_err();
    assert!(
        matches!(err, Error::TooManyColumns { limit: 65535, .. }),
        "{err}"
    );

    catalog
        .create_super_table("db", "m", &fields(65534), &[])
        .unwrap();
    assert_eq!(catalog.describe("db", "m").unwrap().len(), 65535);
    let err = resolve(&catalog, "m extra=1i 1").unwrap_err();
    assert!(
        matches!(err, Error::TooManyColumns { limit: 65535, .. }),
        "{err}"
    );
    resolve(&catalog, "m f65533=1i 1").unwrap();
}

#[test]
fn tag_limit() {
    let catalog = catalog_with(CatalogLimits {
        max_tags_per_table: 1,
        ..Default::default()
    });
    resolve(&catalog, "m,a=1i v=1i 1").unwrap();
    let err = resolve(&catalog, "m,b=1i v=1i 2").unwrap_err();
    assert!(matches!(err, Error::TooManyTags { limit: 1, .. }), "{err}");
}

#[test]
fn string_width_limit_uses_storage_bytes() {
    let catalog = catalog_with(CatalogLimits {
        max_string_width: 8,
        ..Default::default()
    });
    resolve(&catalog, r#"m s="12345678" 1"#).unwrap();
    resolve(&catalog, r#"m n=L"12" 2"#).unwrap();

    // three NCHAR characters need twelve bytes
    let err = resolve(&catalog, r#"m n=L"123" 3"#).unwrap_err();
    assert!(
        matches!(err, Error::StringTooWide { width: 12, limit: 8, .. }),
        "{err}"
    );
    let err = resolve(&catalog, r#"m s="123456789" 4"#).unwrap_err();
    assert!(matches!(err, Error::StringTooWide { .. }), "{err}");

    let n = catalog
        .describe("db", "m")
        .unwrap()
        .into_iter()
        .find(|c| c.name.as_ref() == "n")
        .unwrap();
    assert_eq!(n.width, 2);
}

#[test]
fn database_limit_and_lookup() {
    let catalog = Catalog::new(CatalogLimits {
        max_databases: 2,
        ..Default::default()
    });
    let a = catalog.create_database("a", Precision::Millisecond).unwrap();
    catalog.create_database("b", Precision::Microsecond).unwrap();

    assert!(matches!(
        catalog.create_database("a", Precision::Millisecond),
        Err(Error::DatabaseExists { .. })
    ));
    assert!(matches!(
        catalog.create_database("c", Precision::Millisecond),
        Err(Error::TooManyDatabases { limit: 2 })
    ));

    assert_eq!(catalog.list_databases(), vec!["a", "b"]);
    assert_eq!(catalog.db_name_to_id("a"), Some(a.id));
    assert_eq!(catalog.db_id_to_name(a.id).as_deref(), Some("a"));
    assert_eq!(
        catalog.db_schema("b").unwrap().precision,
        Precision::Microsecond
    );
    assert!(matches!(
        catalog.describe("c", "m"),
        Err(Error::DatabaseNotFound { .. })
    ));
}

#[test]
fn pre_created_table_is_extended_by_lines() {
    let catalog = catalog_with(CatalogLimits::default());
    catalog
        .create_super_table(
            "db",
            "ste",
            &[
                ColumnSpec::new("ts", ScalarType::Timestamp),
                ColumnSpec::new("f", ScalarType::Int),
            ],
            &[ColumnSpec::new("t1", ScalarType::BigInt)],
        )
        .unwrap();
    assert!(matches!(
        catalog.create_super_table("db", "ste", &[], &[]),
        Err(Error::TableExists { .. })
    ));

    resolve(&catalog, "ste,t1=7,t2=1i f=3i,g=true 1").unwrap();
    let err = resolve(&catalog, "ste f=3 2").unwrap_err();
    assert!(matches!(err, Error::ColumnTypeMismatch { .. }), "{err}");
    let err = resolve(&catalog, "ste ts=3i 2").unwrap_err();
    assert!(matches!(err, Error::ReservedColumnName { .. }), "{err}");
    let err = resolve(&catalog, "ste t1=3 2").unwrap_err();
    assert!(matches!(err, Error::ColumnKindMismatch { .. }), "{err}");

    let names: Vec<_> = catalog
        .describe("db", "ste")
        .unwrap()
        .into_iter()
        .map(|c| c.name.to_string())
        .collect();
    assert_eq!(names, vec!["ts", "f", "g", "t1", "t2"]);
}

#[test]
fn describe_rows_serialize() {
    let catalog = catalog_with(CatalogLimits::default());
    resolve(&catalog, r#"m,site=L"lab" v=1i 1"#).unwrap();
    let described = catalog.describe("db", "m").unwrap();
    let json = serde_json::to_value(&described[2]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "position": 2,
            "name": "site",
            "scalar_type": "nchar",
            "width": 3,
            "note": "TAG",
        })
    );
}
