//! DV-023: Ordering — scalar comparison and stable multi-key sort.

use super::Limits;
use crate::core::types::{Diagnostic, Relation, Value};
use std::cmp::Ordering;

/// One evaluated sort key: a value per row plus direction.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub values: Vec<Value>,
    pub descending: bool,
}

/// Ordering between two non-null scalars of comparable kinds. Numbers
/// compare numerically, text and temporal values lexically, booleans with
/// `false < true`. Anything else is incomparable.
pub fn compare_scalars(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Real(y)) => cmp_int_real(*x, *y),
        (Value::Real(x), Value::Integer(y)) => cmp_int_real(*y, *x).map(Ordering::reverse),
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y);
            }
            match (a.as_str(), b.as_str()) {
                (Some(x), Some(y)) => Some(x.cmp(y)),
                _ => None,
            }
        }
    }
}

/// Exact ordering of an integer against a real, without rounding the
/// integer through `f64`.
fn cmp_int_real(i: i64, r: f64) -> Option<Ordering> {
    // 2^63, the first real above every i64
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if r.is_nan() {
        return None;
    }
    if r >= BOUND {
        return Some(Ordering::Less);
    }
    if r < -BOUND {
        return Some(Ordering::Greater);
    }
    let whole = r.trunc();
    // in range and integral, so the cast is exact
    let ord = i.cmp(&(whole as i64));
    if ord != Ordering::Equal {
        return Some(ord);
    }
    0.0f64.partial_cmp(&(r - whole))
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Boolean(_) => 0,
        Value::Integer(_) | Value::Real(_) => 1,
        Value::Text(_) | Value::Temporal(_) => 2,
        Value::Null => 3,
    }
}

fn is_null(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Real(r) => r.is_nan(),
        _ => false,
    }
}

/// Total order used by sort: nulls last in either direction, mixed kinds
/// by kind rank.
pub fn sort_cmp(a: &Value, b: &Value, descending: bool) -> Ordering {
    match (is_null(a), is_null(b)) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let ord = compare_scalars(a, b).unwrap_or_else(|| kind_rank(a).cmp(&kind_rank(b)));
    if descending {
        ord.reverse()
    } else {
        ord
    }
}

/// Stable sort by the given keys, first key most significant.
pub fn sort(rel: Relation, keys: &[SortKey], limits: Limits<'_>) -> Result<Relation, Diagnostic> {
    limits.tick()?;
    let n = rel.row_count();
    if let Some(bad) = keys.iter().find(|k| k.values.len() != n) {
        return Err(Diagnostic::runtime(format!(
            "sort key has {} values for {} rows",
            bad.values.len(),
            n
        )));
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        keys.iter()
            .map(|k| sort_cmp(&k.values[i], &k.values[j], k.descending))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    limits.tick()?;

    let (columns, rows) = rel.into_parts();
    let mut slots: Vec<Option<Vec<Value>>> = rows.into_iter().map(Some).collect();
    let sorted = order.into_iter().filter_map(|i| slots[i].take()).collect();
    Relation::new(columns, sorted).map_err(Diagnostic::runtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::governor::CancelToken;

    fn rel(vals: Vec<Value>) -> Relation {
        let rows = vals
            .into_iter()
            .enumerate()
            .map(|(i, v)| vec![Value::Integer(i as i64), v])
            .collect();
        Relation::new(vec!["id".into(), "v".into()], rows).unwrap()
    }

    fn ids(rel: &Relation) -> Vec<i64> {
        rel.rows()
            .iter()
            .map(|r| match r[0] {
                Value::Integer(i) => i,
                _ => -1,
            })
            .collect()
    }

    #[test]
    fn test_dv023_compare_scalars() {
        assert_eq!(
            compare_scalars(&Value::Integer(2), &Value::Real(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_scalars(&Value::Temporal("2024-01-02".into()), &Value::Text("2024-01-10".into())),
            Some(Ordering::Less)
        );
        assert_eq!(compare_scalars(&Value::Integer(1), &Value::Text("1".into())), None);
    }

    #[test]
    fn test_dv023_mixed_numeric_order_is_exact() {
        let big = 1i64 << 53;
        let i = |v: i64| Value::Integer(v);
        let r = Value::Real(big as f64);
        assert_eq!(compare_scalars(&i(big + 1), &r), Some(Ordering::Greater));
        assert_eq!(compare_scalars(&r, &i(big + 1)), Some(Ordering::Less));
        assert_eq!(compare_scalars(&i(big), &r), Some(Ordering::Equal));
        assert_eq!(compare_scalars(&i(-2), &Value::Real(-1.5)), Some(Ordering::Less));
        assert_eq!(compare_scalars(&i(-1), &Value::Real(-1.5)), Some(Ordering::Greater));
        assert_eq!(compare_scalars(&i(i64::MAX), &Value::Real(f64::INFINITY)), Some(Ordering::Less));
        assert_eq!(compare_scalars(&i(i64::MIN), &Value::Real(-1e300)), Some(Ordering::Greater));
        assert_eq!(compare_scalars(&i(0), &Value::Real(f64::NAN)), None);
    }

    #[test]
    fn test_dv023_sort_mixed_numerics_above_2_pow_53() {
        let token = CancelToken::new();
        let limits = Limits::new(100, &token);
        let big = 1i64 << 53;
        let vals = vec![
            Value::Integer(big + 1),
            Value::Real(big as f64),
            Value::Integer(big),
            Value::Integer(big - 1),
        ];
        let rel = Relation::new(vec!["v".into()], vals.iter().map(|v| vec![v.clone()]).collect()).unwrap();
        let out = sort(rel, &[SortKey { values: vals, descending: false }], limits).unwrap();
        let got: Vec<Value> = out.rows().iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            got,
            vec![
                Value::Integer(big - 1),
                Value::Real(big as f64),
                Value::Integer(big),
                Value::Integer(big + 1),
            ]
        );
    }

    #[test]
    fn test_dv023_sort_nulls_last_both_directions() {
        let token = CancelToken::new();
        let limits = Limits::new(100, &token);
        let vals = vec![Value::Integer(3), Value::Null, Value::Integer(1), Value::Integer(2)];
        let r = rel(vals.clone());
        let asc = sort(r.clone(), &[SortKey { values: vals.clone(), descending: false }], limits).unwrap();
        assert_eq!(ids(&asc), vec![2, 3, 0, 1]);
        let desc = sort(r, &[SortKey { values: vals, descending: true }], limits).unwrap();
        assert_eq!(ids(&desc), vec![0, 3, 2, 1]);
    }

    #[test]
    fn test_dv023_sort_is_stable() {
        let token = CancelToken::new();
        let vals = vec![Value::Integer(1), Value::Integer(0), Value::Integer(1), Value::Integer(0)];
        let out = sort(
            rel(vals.clone()),
            &[SortKey { values: vals, descending: false }],
            Limits::new(100, &token),
        )
        .unwrap();
        assert_eq!(ids(&out), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_dv023_secondary_key() {
        let token = CancelToken::new();
        let primary = vec![Value::Integer(1), Value::Integer(1), Value::Integer(0)];
        let secondary = vec![Value::Text("b".into()), Value::Text("a".into()), Value::Text("z".into())];
        let out = sort(
            rel(primary.clone()),
            &[
                SortKey { values: primary, descending: true },
                SortKey { values: secondary, descending: false },
            ],
            Limits::new(100, &token),
        )
        .unwrap();
        assert_eq!(ids(&out), vec![1, 0, 2]);
    }
}
