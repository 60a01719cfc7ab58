//! DV-020: Relational operators used by the expression interpreter.
//!
//! Each operator consumes already-evaluated inputs (masks, key columns,
//! aggregate arguments) and produces a new relation. Row loops poll the
//! cancellation token and enforce the row ceiling through [`Limits`].

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod order;
pub mod project;

use crate::core::types::{Diagnostic, Value};
use crate::engine::governor::CancelToken;

/// Per-execution bounds threaded through every operator.
#[derive(Debug, Clone, Copy)]
pub struct Limits<'a> {
    pub max_rows: usize,
    pub token: &'a CancelToken,
}

impl<'a> Limits<'a> {
    pub fn new(max_rows: usize, token: &'a CancelToken) -> Self {
        Self { max_rows, token }
    }

    /// Poll the cancellation token.
    pub fn tick(&self) -> Result<(), Diagnostic> {
        self.token.check()
    }

    /// Fail once a relation under construction grows past the ceiling.
    pub fn check_rows(&self, rows: usize) -> Result<(), Diagnostic> {
        if rows > self.max_rows {
            return Err(Diagnostic::runtime(format!(
                "intermediate relation has more than {} rows",
                self.max_rows
            )));
        }
        Ok(())
    }
}

/// Hashable form of a cell used for grouping, joining and distinct.
/// Whole reals collapse onto integers so that `1` and `1.0` land together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Null,
    Int(i64),
    Real(u64),
    Text(String),
    Bool(bool),
}

impl From<&Value> for KeyPart {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => KeyPart::Null,
            Value::Integer(i) => KeyPart::Int(*i),
            Value::Real(r) => {
                if r.is_nan() {
                    KeyPart::Null
                } else if r.fract() == 0.0 && r.abs() < 9.0e15 {
                    KeyPart::Int(*r as i64)
                } else {
                    KeyPart::Real(r.to_bits())
                }
            }
            Value::Text(s) | Value::Temporal(s) => KeyPart::Text(s.clone()),
            Value::Boolean(b) => KeyPart::Bool(*b),
        }
    }
}

/// Composite key over several cells.
pub fn row_key<'v>(values: impl IntoIterator<Item = &'v Value>) -> Vec<KeyPart> {
    values.into_iter().map(KeyPart::from).collect()
}

/// Resolve column names to indices, failing with `NameError` on the first
/// unknown name.
pub fn resolve_columns(
    rel: &crate::core::types::Relation,
    names: &[String],
) -> Result<Vec<usize>, Diagnostic> {
    names
        .iter()
        .map(|n| {
            rel.column_index(n).ok_or_else(|| {
                Diagnostic::name(format!(
                    "column '{}' not found; available columns: {}",
                    n,
                    rel.columns().join(", ")
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Relation;

    #[test]
    fn test_dv020_key_collapses_whole_reals() {
        assert_eq!(KeyPart::from(&Value::Real(2.0)), KeyPart::from(&Value::Integer(2)));
        assert_ne!(KeyPart::from(&Value::Real(2.5)), KeyPart::from(&Value::Integer(2)));
        assert_eq!(
            KeyPart::from(&Value::Temporal("2024-01-01".into())),
            KeyPart::from(&Value::Text("2024-01-01".into()))
        );
    }

    #[test]
    fn test_dv020_row_ceiling() {
        let token = CancelToken::new();
        let limits = Limits::new(10, &token);
        assert!(limits.check_rows(10).is_ok());
        let err = limits.check_rows(11).unwrap_err();
        assert!(err.message.contains("more than 10 rows"));
    }

    #[test]
    fn test_dv020_resolve_columns() {
        let rel = Relation::empty(vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(resolve_columns(&rel, &["b".into(), "a".into()]).unwrap(), vec![1, 0]);
        let err = resolve_columns(&rel, &["c".into()]).unwrap_err();
        assert_eq!(err.kind, crate::core::types::DiagnosticKind::NameError);
        assert!(err.message.contains("column 'c' not found"));
    }
}
