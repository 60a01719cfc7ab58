//! DV-025: Hash equi-join and cross join.
//!
//! Output keeps left row order; each left row's matches follow right row
//! order. Key columns appear once (at their left position). Overlapping
//! non-key names are suffixed `_x` (left) and `_y` (right). Null keys never
//! match.

use super::{resolve_columns, row_key, KeyPart, Limits};
use crate::core::types::{Diagnostic, Relation, Value};
use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

impl JoinKind {
    pub fn from_name(name: &str) -> Result<Self, Diagnostic> {
        match name {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "cross" => Ok(Self::Cross),
            other => Err(Diagnostic::runtime(format!(
                "unsupported join kind '{}' (expected inner, left or cross)",
                other
            ))),
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inner => write!(f, "inner"),
            Self::Left => write!(f, "left"),
            Self::Cross => write!(f, "cross"),
        }
    }
}

/// Join two relations on the named key columns. For inner/left joins an
/// empty key list means "all shared column names".
pub fn join(
    left: &Relation,
    right: &Relation,
    on: &[String],
    how: JoinKind,
    limits: Limits<'_>,
) -> Result<Relation, Diagnostic> {
    let on: Vec<String> = match how {
        JoinKind::Cross => {
            if !on.is_empty() {
                return Err(Diagnostic::runtime("cross join does not take join keys"));
            }
            Vec::new()
        }
        _ if on.is_empty() => {
            let shared: Vec<String> = left
                .columns()
                .iter()
                .filter(|c| right.column_index(c).is_some())
                .cloned()
                .collect();
            if shared.is_empty() {
                return Err(Diagnostic::runtime(
                    "join has no key columns and the relations share no column names",
                ));
            }
            shared
        }
        _ => on.to_vec(),
    };

    let lkeys = resolve_columns(left, &on)?;
    let rkeys = resolve_columns(right, &on)?;
    let rkeep: Vec<usize> = (0..right.column_count())
        .filter(|i| !rkeys.contains(i))
        .collect();

    let columns = output_columns(left, right, &on, &rkeep);

    let mut rows: Vec<Vec<Value>> = Vec::new();
    let mut emit = |lrow: &[Value], rrow: Option<&Vec<Value>>| -> Result<(), Diagnostic> {
        let mut row = lrow.to_vec();
        match rrow {
            Some(r) => row.extend(rkeep.iter().map(|&i| r[i].clone())),
            None => row.extend(std::iter::repeat(Value::Null).take(rkeep.len())),
        }
        rows.push(row);
        limits.check_rows(rows.len())
    };

    if how == JoinKind::Cross {
        for lrow in left.rows() {
            limits.tick()?;
            for rrow in right.rows() {
                emit(lrow, Some(rrow))?;
            }
        }
    } else {
        let mut index: FxHashMap<Vec<KeyPart>, Vec<usize>> = FxHashMap::default();
        for (i, rrow) in right.rows().iter().enumerate() {
            limits.tick()?;
            if rkeys.iter().any(|&k| rrow[k].is_null()) {
                continue;
            }
            index
                .entry(row_key(rkeys.iter().map(|&k| &rrow[k])))
                .or_default()
                .push(i);
        }

        for lrow in left.rows() {
            limits.tick()?;
            let matches = if lkeys.iter().any(|&k| lrow[k].is_null()) {
                None
            } else {
                index.get(&row_key(lkeys.iter().map(|&k| &lrow[k])))
            };
            match matches {
                Some(found) => {
                    for &i in found {
                        emit(lrow, Some(&right.rows()[i]))?;
                    }
                }
                None if how == JoinKind::Left => emit(lrow, None)?,
                None => {}
            }
        }
    }

    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}

fn output_columns(left: &Relation, right: &Relation, on: &[String], rkeep: &[usize]) -> Vec<String> {
    let right_names: Vec<&String> = rkeep.iter().map(|&i| &right.columns()[i]).collect();
    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .map(|c| {
            if !on.contains(c) && right_names.contains(&c) {
                format!("{}_x", c)
            } else {
                c.clone()
            }
        })
        .collect();
    for name in right_names {
        if left.column_index(name).is_some() {
            columns.push(format!("{}_y", name));
        } else {
            columns.push(name.clone());
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::governor::CancelToken;

    fn emp() -> Relation {
        Relation::new(
            vec!["id".into(), "dept_id".into(), "name".into()],
            vec![
                vec![Value::Integer(1), Value::Integer(10), Value::Text("Ann".into())],
                vec![Value::Integer(2), Value::Integer(20), Value::Text("Bo".into())],
                vec![Value::Integer(3), Value::Null, Value::Text("Cy".into())],
                vec![Value::Integer(4), Value::Integer(10), Value::Text("Di".into())],
            ],
        )
        .unwrap()
    }

    fn dept() -> Relation {
        Relation::new(
            vec!["dept_id".into(), "name".into()],
            vec![
                vec![Value::Integer(10), Value::Text("Eng".into())],
                vec![Value::Null, Value::Text("Ghost".into())],
                vec![Value::Real(10.0), Value::Text("Eng2".into())],
            ],
        )
        .unwrap()
    }

    fn names(rel: &Relation, col: &str) -> Vec<Value> {
        let i = rel.column_index(col).unwrap();
        rel.rows().iter().map(|r| r[i].clone()).collect()
    }

    #[test]
    fn test_dv025_inner_join_order_and_suffixes() {
        let token = CancelToken::new();
        let out = join(&emp(), &dept(), &["dept_id".into()], JoinKind::Inner, Limits::new(100, &token)).unwrap();
        assert_eq!(out.columns(), &["id", "dept_id", "name_x", "name_y"]);
        assert_eq!(
            names(&out, "id"),
            vec![Value::Integer(1), Value::Integer(1), Value::Integer(4), Value::Integer(4)]
        );
        assert_eq!(names(&out, "name_y")[1], Value::Text("Eng2".into()));
    }

    #[test]
    fn test_dv025_left_join_null_keys_never_match() {
        let token = CancelToken::new();
        let out = join(&emp(), &dept(), &["dept_id".into()], JoinKind::Left, Limits::new(100, &token)).unwrap();
        assert_eq!(out.row_count(), 6);
        let cy = out
            .rows()
            .iter()
            .find(|r| r[0] == Value::Integer(3))
            .unwrap();
        assert_eq!(cy[3], Value::Null);
    }

    #[test]
    fn test_dv025_default_keys_are_shared_columns() {
        let token = CancelToken::new();
        let a = Relation::new(vec!["k".into(), "a".into()], vec![vec![Value::Integer(1), Value::Integer(2)]]).unwrap();
        let b = Relation::new(vec!["k".into(), "b".into()], vec![vec![Value::Integer(1), Value::Integer(3)]]).unwrap();
        let out = join(&a, &b, &[], JoinKind::Inner, Limits::new(100, &token)).unwrap();
        assert_eq!(out.columns(), &["k", "a", "b"]);
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_dv025_cross_join_respects_ceiling() {
        let token = CancelToken::new();
        let out = join(&emp(), &dept(), &[], JoinKind::Cross, Limits::new(100, &token)).unwrap();
        assert_eq!(out.row_count(), 12);
        assert_eq!(out.columns(), &["id", "dept_id_x", "name_x", "dept_id_y", "name_y"]);
        let err = join(&emp(), &dept(), &[], JoinKind::Cross, Limits::new(5, &token)).unwrap_err();
        assert!(err.message.contains("more than 5 rows"));
    }

    #[test]
    fn test_dv025_unknown_kind() {
        assert!(JoinKind::from_name("outer").is_err());
        assert_eq!(JoinKind::from_name("left").unwrap(), JoinKind::Left);
    }
}
