//! The schema registry for schema-less ingestion.
//!
//! A [`Catalog`](catalog::Catalog) holds databases, each with a fixed timestamp precision,
//! and their supertables. A supertable's schema grows as lines arrive: new tag and field
//! columns are appended and string columns widen, but nothing is ever removed. Every
//! distinct set of tag values seen for a supertable names one of its subtables.

pub mod catalog;
pub mod resolve;
pub mod subtable;
pub mod table;
