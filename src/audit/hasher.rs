//! DV-031: BLAKE3 fingerprints for program text and relations.

use crate::core::types::{Relation, TableData};

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a relation via its canonical JSON interchange form. Column order and
/// row order both affect the hash.
pub fn hash_relation(rel: &Relation) -> Result<String, String> {
    let table = TableData::from(rel.clone());
    let mut hasher = blake3::Hasher::new();
    for col in &table.columns {
        hasher.update(col.as_bytes());
        hasher.update(b"\0");
    }
    hasher.update(b"\n");
    for row in &table.data {
        let line = serde_json::to_string(row).map_err(|e| format!("JSON serialize error: {}", e))?;
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Value;

    fn rel(rows: Vec<Vec<Value>>) -> Relation {
        Relation::new(vec!["a".into(), "b".into()], rows).unwrap()
    }

    #[test]
    fn test_dv031_hash_string() {
        let h = hash_string("result = t");
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("result = t"));
        assert_ne!(h, hash_string("result = u"));
    }

    #[test]
    fn test_dv031_hash_relation_deterministic() {
        let r = rel(vec![vec![Value::Integer(1), Value::Text("x".into())]]);
        assert_eq!(hash_relation(&r).unwrap(), hash_relation(&r.clone()).unwrap());
    }

    #[test]
    fn test_dv031_hash_relation_order_sensitive() {
        let a = rel(vec![
            vec![Value::Integer(1), Value::Null],
            vec![Value::Integer(2), Value::Null],
        ]);
        let b = rel(vec![
            vec![Value::Integer(2), Value::Null],
            vec![Value::Integer(1), Value::Null],
        ]);
        assert_ne!(hash_relation(&a).unwrap(), hash_relation(&b).unwrap());

        let renamed = Relation::new(
            vec!["b".into(), "a".into()],
            vec![vec![Value::Integer(1), Value::Null], vec![Value::Integer(2), Value::Null]],
        )
        .unwrap();
        assert_ne!(hash_relation(&a).unwrap(), hash_relation(&renamed).unwrap());
    }
}
