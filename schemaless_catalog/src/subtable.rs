//! Subtable identity.

use schemaless_id::SubtableId;
use schemaless_types::column::Value;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Bytes of the digest kept in a subtable name.
const NAME_DIGEST_BYTES: usize = 16;

/// The canonical identity of a subtable: its present tag pairs, sorted by key.
///
/// Tag order on the line does not matter, and a tag that is absent is not the same as any
/// value, so `a=1,b=2` and `b=2,a=1` share a key while `a=1` has its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubtableKey(Vec<(Arc<str>, String)>);

impl SubtableKey {
    pub fn new<'a>(tags: impl IntoIterator<Item = (&'a Arc<str>, &'a Value)>) -> Self {
        let mut pairs: Vec<_> = tags
            .into_iter()
            .map(|(k, v)| (Arc::clone(k), v.to_string()))
            .collect();
        pairs.sort();
        Self(pairs)
    }

    /// Deterministic table name for this identity within `table_name`.
    pub fn subtable_name(&self, table_name: &str) -> Arc<str> {
        let mut hasher = Sha256::new();
        hasher.update(table_name.as_bytes());
        for (key, value) in &self.0 {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        let digest = hasher.finalize();
        format!("t_{}", hex::encode(&digest[..NAME_DIGEST_BYTES])).into()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtableDefinition {
    pub id: SubtableId,
    pub name: Arc<str>,
    /// Tag values in key order.
    pub tags: Vec<(Arc<str>, Value)>,
}

impl SubtableDefinition {
    pub fn tag_value(&self, tag: &str) -> Option<&Value> {
        self.tags
            .iter()
            .find(|(k, _)| k.as_ref() == tag)
            .map(|(_, v)| v)
    }
}

/// A row of `show tables`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtableDescription {
    pub name: Arc<str>,
    pub super_table: Arc<str>,
    pub tags: Vec<(Arc<str>, Value)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tags(pairs: &[(&str, Value)]) -> Vec<(Arc<str>, Value)> {
        pairs
            .iter()
            .map(|(k, v)| (Arc::from(*k), v.clone()))
            .collect()
    }

    fn key(pairs: &[(&str, Value)]) -> SubtableKey {
        let tags = tags(pairs);
        SubtableKey::new(tags.iter().map(|(k, v)| (k, v)))
    }

    #[test]
    fn tag_order_does_not_matter() {
        let a = key(&[("t1", Value::Int(4)), ("t3", Value::Binary("t4".into()))]);
        let b = key(&[("t3", Value::Binary("t4".into())), ("t1", Value::Int(4))]);
        assert_eq!(a, b);
        assert_eq!(a.subtable_name("st"), b.subtable_name("st"));
    }

    #[test]
    fn missing_tag_is_a_different_identity() {
        let full = key(&[("t1", Value::Int(4)), ("t4", Value::BigInt(5))]);
        let partial = key(&[("t1", Value::Int(4))]);
        assert_ne!(full, partial);
        assert_ne!(full.subtable_name("st"), partial.subtable_name("st"));
    }

    #[test]
    fn value_type_is_part_of_identity() {
        let int = key(&[("t", Value::Int(4))]);
        let bigint = key(&[("t", Value::BigInt(4))]);
        assert_ne!(int, bigint);
    }

    #[test]
    fn names_are_stable() {
        let k = key(&[("t2", Value::BigInt(5)), ("t3", Value::NChar("ste".into()))]);
        let name = k.subtable_name("ste");
        assert_eq!(name.len(), 2 + 2 * NAME_DIGEST_BYTES);
        assert!(name.starts_with("t_"));
        assert_eq!(name, k.subtable_name("ste"));
        // the supertable name feeds the digest
        assert_ne!(name, k.subtable_name("stf"));
    }

    #[test]
    fn empty_key() {
        let k = key(&[]);
        assert!(k.is_empty());
        assert_eq!(k.subtable_name("m").len(), 34);
    }
}
