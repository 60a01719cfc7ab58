//! DV-021: Row selection — filter, limit, distinct.

use super::{row_key, KeyPart, Limits};
use crate::core::types::{Diagnostic, Relation, Value};
use rustc_hash::FxHashSet;

/// Keep rows whose mask value is `true`. Null drops the row; any other
/// kind is a `TypeError`.
pub fn filter(rel: Relation, mask: &[Value], limits: Limits<'_>) -> Result<Relation, Diagnostic> {
    let (columns, rows) = rel.into_parts();
    let mut kept = Vec::new();
    for (row, m) in rows.into_iter().zip(mask) {
        limits.tick()?;
        match m {
            Value::Boolean(true) => kept.push(row),
            Value::Boolean(false) | Value::Null => {}
            other => {
                return Err(Diagnostic::type_error(format!(
                    "filter predicate must be boolean, got {}",
                    other.kind()
                )))
            }
        }
    }
    Relation::new(columns, kept).map_err(Diagnostic::runtime)
}

/// First `n` rows.
pub fn limit(rel: Relation, n: i64) -> Result<Relation, Diagnostic> {
    if n < 0 {
        return Err(Diagnostic::runtime(format!(
            "limit must be non-negative, got {}",
            n
        )));
    }
    let (columns, mut rows) = rel.into_parts();
    rows.truncate(n as usize);
    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}

/// Drop duplicate rows, keeping the first occurrence.
pub fn distinct(rel: Relation, limits: Limits<'_>) -> Result<Relation, Diagnostic> {
    let (columns, rows) = rel.into_parts();
    let mut seen: FxHashSet<Vec<KeyPart>> = FxHashSet::default();
    let mut kept = Vec::new();
    for row in rows {
        limits.tick()?;
        if seen.insert(row_key(&row)) {
            kept.push(row);
        }
    }
    Relation::new(columns, kept).map_err(Diagnostic::runtime)
}
