//! DV-022: Column operations — select, drop, rename, derive, concat.

use super::{resolve_columns, Limits};
use crate::core::types::{Diagnostic, Relation, Value};

/// Keep the named columns, in the given order.
pub fn select(rel: &Relation, names: &[String]) -> Result<Relation, Diagnostic> {
    let idx = resolve_columns(rel, names)?;
    let rows = rel
        .rows()
        .iter()
        .map(|r| idx.iter().map(|&i| r[i].clone()).collect())
        .collect();
    Relation::new(names.to_vec(), rows).map_err(Diagnostic::runtime)
}

/// Remove the named columns.
pub fn drop_columns(rel: &Relation, names: &[String]) -> Result<Relation, Diagnostic> {
    resolve_columns(rel, names)?;
    let keep: Vec<String> = rel
        .columns()
        .iter()
        .filter(|c| !names.contains(c))
        .cloned()
        .collect();
    select(rel, &keep)
}

/// Rename columns by `(old, new)` pairs.
pub fn rename(rel: Relation, pairs: &[(String, String)]) -> Result<Relation, Diagnostic> {
    let old: Vec<String> = pairs.iter().map(|(o, _)| o.clone()).collect();
    resolve_columns(&rel, &old)?;
    let (mut columns, rows) = rel.into_parts();
    for col in columns.iter_mut() {
        if let Some((_, new)) = pairs.iter().find(|(o, _)| o == col) {
            *col = new.clone();
        }
    }
    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}

/// Replace a column in place, or append it when the name is new.
pub fn set_column(rel: Relation, name: &str, values: Vec<Value>) -> Result<Relation, Diagnostic> {
    if values.len() != rel.row_count() {
        return Err(Diagnostic::runtime(format!(
            "derived column '{}' has {} values for {} rows",
            name,
            values.len(),
            rel.row_count()
        )));
    }
    let existing = rel.column_index(name);
    let (mut columns, mut rows) = rel.into_parts();
    match existing {
        Some(i) => {
            for (row, v) in rows.iter_mut().zip(values) {
                row[i] = v;
            }
        }
        None => {
            columns.push(name.to_string());
            for (row, v) in rows.iter_mut().zip(values) {
                row.push(v);
            }
        }
    }
    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}

/// Stack `bottom` under `top`. Both must carry the same column set; `bottom`
/// is realigned to `top`'s column order.
pub fn concat(top: Relation, bottom: &Relation, limits: Limits<'_>) -> Result<Relation, Diagnostic> {
    let same_set = top.column_count() == bottom.column_count()
        && top.columns().iter().all(|c| bottom.column_index(c).is_some());
    if !same_set {
        return Err(Diagnostic::runtime(format!(
            "cannot concat relations with columns [{}] and [{}]",
            top.columns().join(", "),
            bottom.columns().join(", ")
        )));
    }
    let aligned = select(bottom, top.columns())?;
    limits.check_rows(top.row_count() + aligned.row_count())?;
    let (columns, mut rows) = top.into_parts();
    let (_, more) = aligned.into_parts();
    rows.extend(more);
    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DiagnosticKind;
    use crate::engine::governor::CancelToken;

    fn rel() -> Relation {
        Relation::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec![
                vec![Value::Integer(1), Value::Text("x".into()), Value::Boolean(true)],
                vec![Value::Integer(2), Value::Text("y".into()), Value::Boolean(false)],
            ],
        )
        .unwrap()
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dv022_select_reorders() {
        let out = select(&rel(), &names(&["c", "a"])).unwrap();
        assert_eq!(out.columns(), &names(&["c", "a"])[..]);
        assert_eq!(out.rows()[0], vec![Value::Boolean(true), Value::Integer(1)]);
    }

    #[test]
    fn test_dv022_select_unknown_column() {
        let err = select(&rel(), &names(&["zz"])).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NameError);
    }

    #[test]
    fn test_dv022_drop() {
        let out = drop_columns(&rel(), &names(&["b"])).unwrap();
        assert_eq!(out.columns(), &names(&["a", "c"])[..]);
    }

    #[test]
    fn test_dv022_rename_collision() {
        let out = rename(rel(), &[("a".into(), "id".into())]).unwrap();
        assert_eq!(out.columns()[0], "id");
        let err = rename(rel(), &[("a".into(), "b".into())]).unwrap_err();
        assert!(err.message.contains("duplicate column"));
    }

    #[test]
    fn test_dv022_set_column() {
        let out = set_column(rel(), "d", vec![Value::Integer(10), Value::Integer(20)]).unwrap();
        assert_eq!(out.column_count(), 4);
        let out = set_column(out, "a", vec![Value::Null, Value::Null]).unwrap();
        assert_eq!(out.rows()[1][0], Value::Null);
        assert_eq!(out.column_count(), 4);
    }

    #[test]
    fn test_dv022_concat_aligns_columns() {
        let token = CancelToken::new();
        let other = select(&rel(), &names(&["c", "b", "a"])).unwrap();
        let out = concat(rel(), &other, Limits::new(100, &token)).unwrap();
        assert_eq!(out.row_count(), 4);
        assert_eq!(out.rows()[2], rel().rows()[0]);
        let narrow = select(&rel(), &names(&["a"])).unwrap();
        assert!(concat(rel(), &narrow, Limits::new(100, &token)).is_err());
    }
}
