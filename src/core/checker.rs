//! DV-004: Relational equivalence checker — pure, total comparison of two
//! relations.
//!
//! Stages run in a fixed order and stop at the first failure: operand kinds,
//! shape, column names (order included), then cell values in row-major order.
//! Rows are never sorted. Numeric cells use a symmetric mixed tolerance.

use crate::core::types::{Datum, Detail, Diagnostic, DiagnosticKind, Relation, Value};

/// Relative tolerance for numeric cells.
pub const RTOL: f64 = 1e-5;
/// Absolute tolerance for numeric cells.
pub const ATOL: f64 = 1e-8;

/// Outcome of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Match,
    Mismatch(Diagnostic),
}

impl Comparison {
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Comparison::Match => None,
            Comparison::Mismatch(d) => Some(d),
        }
    }
}

/// Compare two arbitrary program outputs. Anything other than a plain
/// relation on either side is a `TypeMismatch`.
pub fn compare_data(left: &Datum, right: &Datum) -> Comparison {
    match (left, right) {
        (Datum::Relation(a), Datum::Relation(b)) => compare(a, b),
        _ => Comparison::Mismatch(
            Diagnostic::new(
                DiagnosticKind::TypeMismatch,
                format!(
                    "Type mismatch: expected a relation on both sides, got {} and {}",
                    left.kind_name(),
                    right.kind_name()
                ),
            )
            .with_detail(Detail::Kinds {
                left: left.kind_name(),
                right: right.kind_name(),
            }),
        ),
    }
}

/// Compare two relations: shape, then schema, then values.
pub fn compare(left: &Relation, right: &Relation) -> Comparison {
    if let Some(d) = check_shape(left, right) {
        return Comparison::Mismatch(d);
    }
    if let Some(d) = check_columns(left, right) {
        return Comparison::Mismatch(d);
    }
    match check_values(left, right) {
        Some(d) => Comparison::Mismatch(d),
        None => Comparison::Match,
    }
}

fn check_shape(left: &Relation, right: &Relation) -> Option<Diagnostic> {
    let (ls, rs) = (left.shape(), right.shape());
    if ls == rs {
        return None;
    }
    Some(
        Diagnostic::new(
            DiagnosticKind::ShapeMismatch,
            format!(
                "Shape mismatch: output has shape ({}, {}) but expected ({}, {})",
                ls.0, ls.1, rs.0, rs.1
            ),
        )
        .with_detail(Detail::Shape {
            left: ls,
            right: rs,
        }),
    )
}

fn check_columns(left: &Relation, right: &Relation) -> Option<Diagnostic> {
    if left.columns() == right.columns() {
        return None;
    }

    let mut missing: Vec<String> = right
        .columns()
        .iter()
        .filter(|c| !left.columns().contains(c))
        .cloned()
        .collect();
    let mut extra: Vec<String> = left
        .columns()
        .iter()
        .filter(|c| !right.columns().contains(c))
        .cloned()
        .collect();
    missing.sort();
    extra.sort();

    let reordered = missing.is_empty() && extra.is_empty();
    let message = if reordered {
        format!(
            "Column order mismatch: output has [{}] but expected [{}]",
            left.columns().join(", "),
            right.columns().join(", ")
        )
    } else {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing [{}]", missing.join(", ")));
        }
        if !extra.is_empty() {
            parts.push(format!("unexpected [{}]", extra.join(", ")));
        }
        format!("Column mismatch: {}", parts.join("; "))
    };

    Some(
        Diagnostic::new(DiagnosticKind::ColumnMismatch, message).with_detail(Detail::Columns {
            missing,
            extra,
            reordered,
        }),
    )
}

fn check_values(left: &Relation, right: &Relation) -> Option<Diagnostic> {
    for (i, (lrow, rrow)) in left.rows().iter().zip(right.rows()).enumerate() {
        for (j, (a, b)) in lrow.iter().zip(rrow).enumerate() {
            if !cells_equal(a, b) {
                let column = left.columns()[j].clone();
                return Some(
                    Diagnostic::new(
                        DiagnosticKind::ValueMismatch,
                        format!(
                            "Value mismatch at row {}, column '{}': output has {} but expected {}",
                            i, column, a, b
                        ),
                    )
                    .with_detail(Detail::Cell {
                        row: i,
                        column,
                        left: a.to_string(),
                        right: b.to_string(),
                    }),
                );
            }
        }
    }
    None
}

/// Numeric view used by the checker. Booleans count as 0/1 so that a
/// comparison result surfaced as an integer flag still matches.
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

fn is_missing(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Real(r) => r.is_nan(),
        _ => false,
    }
}

/// Cell equality: missing equals missing, booleans exactly, numerics within
/// tolerance, text and temporal by their string form.
pub fn cells_equal(a: &Value, b: &Value) -> bool {
    if is_missing(a) || is_missing(b) {
        return is_missing(a) && is_missing(b);
    }
    match (a, b) {
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        _ => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => close(x, y),
            (None, None) => match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            _ => false,
        },
    }
}

fn close(x: f64, y: f64) -> bool {
    if x == y {
        return true;
    }
    if !x.is_finite() || !y.is_finite() {
        return false;
    }
    (x - y).abs() <= ATOL + RTOL * x.abs().max(y.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rel(cols: &[&str], rows: Vec<Vec<Value>>) -> Relation {
        Relation::new(cols.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    fn ints(cols: &[&str], rows: &[&[i64]]) -> Relation {
        rel(
            cols,
            rows.iter()
                .map(|r| r.iter().map(|v| Value::Integer(*v)).collect())
                .collect(),
        )
    }

    fn kind(c: &Comparison) -> Option<DiagnosticKind> {
        c.diagnostic().map(|d| d.kind)
    }

    #[test]
    fn test_dv004_identical_match() {
        let a = ints(&["a", "b"], &[&[1, 2], &[3, 4]]);
        assert!(compare(&a, &a.clone()).is_match());
    }

    #[test]
    fn test_dv004_type_mismatch_names_kinds() {
        let a = Datum::Relation(ints(&["a"], &[&[1]]));
        let b = Datum::Scalar(Value::Integer(1));
        let c = compare_data(&a, &b);
        let d = c.diagnostic().unwrap();
        assert_eq!(d.kind, DiagnosticKind::TypeMismatch);
        assert!(d.message.contains("relation and integer"));
    }

    #[test]
    fn test_dv004_shape_mismatch() {
        let a = ints(&["a"], &[&[1], &[2]]);
        let b = ints(&["a"], &[&[1]]);
        let c = compare(&a, &b);
        assert_eq!(kind(&c), Some(DiagnosticKind::ShapeMismatch));
        assert_eq!(
            c.diagnostic().unwrap().detail,
            Some(Detail::Shape {
                left: (2, 1),
                right: (1, 1)
            })
        );
    }

    #[test]
    fn test_dv004_column_reordered() {
        let a = ints(&["b", "a"], &[&[2, 1]]);
        let b = ints(&["a", "b"], &[&[1, 2]]);
        let c = compare(&a, &b);
        assert_eq!(kind(&c), Some(DiagnosticKind::ColumnMismatch));
        assert!(matches!(
            c.diagnostic().unwrap().detail,
            Some(Detail::Columns {
                reordered: true,
                ..
            })
        ));
    }

    #[test]
    fn test_dv004_column_missing_and_extra() {
        let a = ints(&["a", "z"], &[&[1, 2]]);
        let b = ints(&["a", "b"], &[&[1, 2]]);
        let c = compare(&a, &b);
        match &c.diagnostic().unwrap().detail {
            Some(Detail::Columns {
                missing,
                extra,
                reordered,
            }) => {
                assert_eq!(missing, &vec!["b".to_string()]);
                assert_eq!(extra, &vec!["z".to_string()]);
                assert!(!reordered);
            }
            other => panic!("unexpected detail {:?}", other),
        }
    }

    #[test]
    fn test_dv004_row_order_significant() {
        let a = ints(&["x"], &[&[1], &[2]]);
        let b = ints(&["x"], &[&[2], &[1]]);
        let c = compare(&a, &b);
        assert_eq!(kind(&c), Some(DiagnosticKind::ValueMismatch));
        assert_eq!(
            c.diagnostic().unwrap().detail,
            Some(Detail::Cell {
                row: 0,
                column: "x".into(),
                left: "1".into(),
                right: "2".into()
            })
        );
    }

    #[test]
    fn test_dv004_tolerance() {
        let a = rel(&["v"], vec![vec![Value::Real(1.0)]]);
        let b = rel(&["v"], vec![vec![Value::Real(1.0 + 1e-9)]]);
        assert!(compare(&a, &b).is_match());
        let c = rel(&["v"], vec![vec![Value::Real(1.001)]]);
        assert!(!compare(&a, &c).is_match());
    }

    #[test]
    fn test_dv004_integer_equals_real() {
        let a = rel(&["v"], vec![vec![Value::Integer(3)]]);
        let b = rel(&["v"], vec![vec![Value::Real(3.0)]]);
        assert!(compare(&a, &b).is_match());
        assert!(compare(&b, &a).is_match());
    }

    #[test]
    fn test_dv004_large_integers_within_tolerance() {
        let a = ints(&["v"], &[&[100_000_000]]);
        let b = ints(&["v"], &[&[100_000_001]]);
        let r = rel(&["v"], vec![vec![Value::Real(100_000_001.0)]]);
        assert!(compare(&a, &b).is_match());
        assert!(compare(&a, &r).is_match());
        let far = ints(&["v"], &[&[100_010_000]]);
        assert_eq!(kind(&compare(&a, &far)), Some(DiagnosticKind::ValueMismatch));
        assert!(!compare(&ints(&["v"], &[&[3]]), &ints(&["v"], &[&[4]])).is_match());
    }

    #[test]
    fn test_dv004_boolean_equals_flag() {
        assert!(cells_equal(&Value::Boolean(true), &Value::Integer(1)));
        assert!(!cells_equal(&Value::Boolean(false), &Value::Integer(1)));
    }

    #[test]
    fn test_dv004_nulls() {
        assert!(cells_equal(&Value::Null, &Value::Null));
        assert!(cells_equal(&Value::Null, &Value::Real(f64::NAN)));
        assert!(!cells_equal(&Value::Null, &Value::Integer(0)));
        assert!(!cells_equal(&Value::Text(String::new()), &Value::Null));
    }

    #[test]
    fn test_dv004_temporal_vs_text() {
        assert!(cells_equal(
            &Value::Temporal("2024-01-01".into()),
            &Value::Text("2024-01-01".into())
        ));
        assert!(!cells_equal(
            &Value::Text("1".into()),
            &Value::Integer(1)
        ));
    }

    #[test]
    fn test_dv004_infinities() {
        assert!(cells_equal(&Value::Real(f64::INFINITY), &Value::Real(f64::INFINITY)));
        assert!(!cells_equal(
            &Value::Real(f64::INFINITY),
            &Value::Real(f64::NEG_INFINITY)
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Integer),
            (-1e6f64..1e6).prop_map(Value::Real),
            "[a-z]{0,6}".prop_map(Value::Text),
            any::<bool>().prop_map(Value::Boolean),
        ]
    }

    fn arb_relation() -> impl Strategy<Value = Relation> {
        (1usize..4).prop_flat_map(|ncols| {
            prop::collection::vec(prop::collection::vec(arb_value(), ncols), 0..8).prop_map(
                move |rows| {
                    let cols = (0..ncols).map(|i| format!("c{}", i)).collect();
                    Relation::new(cols, rows).unwrap()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn test_dv004_prop_reflexive(r in arb_relation()) {
            prop_assert!(compare(&r, &r).is_match());
        }

        #[test]
        fn test_dv004_prop_symmetric(a in arb_relation(), b in arb_relation()) {
            let ab = compare(&a, &b);
            let ba = compare(&b, &a);
            prop_assert_eq!(ab.is_match(), ba.is_match());
            prop_assert_eq!(kind(&ab), kind(&ba));
        }

        #[test]
        fn test_dv004_prop_swapped_rows_detected(x in 0i64..100, y in 100i64..200) {
            let a = ints(&["k"], &[&[x], &[y]]);
            let b = ints(&["k"], &[&[y], &[x]]);
            prop_assert_eq!(kind(&compare(&a, &b)), Some(DiagnosticKind::ValueMismatch));
        }
    }
}
