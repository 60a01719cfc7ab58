//! DV-024: Grouping and aggregation.
//!
//! Groups are formed by hashing key cells, then emitted in ascending key
//! order (null keys last). Aggregates skip nulls; `count()` counts rows.

use super::order::{compare_scalars, sort_cmp};
use super::{row_key, KeyPart, Limits};
use crate::core::types::{Diagnostic, Relation, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::fmt;

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    /// `count()`: number of rows
    CountRows,
    /// `count(e)`: number of non-null values
    Count,
    CountDistinct,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggFunc {
    /// Look up an aggregate by call name. `count` resolves by arity later.
    pub fn from_name(name: &str, nargs: usize) -> Option<Self> {
        match (name, nargs) {
            ("count", 0) => Some(Self::CountRows),
            ("count", _) => Some(Self::Count),
            ("count_distinct", _) => Some(Self::CountDistinct),
            ("sum", _) => Some(Self::Sum),
            ("avg" | "mean", _) => Some(Self::Avg),
            ("min", _) => Some(Self::Min),
            ("max", _) => Some(Self::Max),
            _ => None,
        }
    }

    pub fn is_aggregate_name(name: &str) -> bool {
        Self::from_name(name, 1).is_some()
    }

    fn accumulator(self) -> Box<dyn Accumulator> {
        match self {
            Self::CountRows | Self::Count => Box::new(CountAccumulator { count: 0 }),
            Self::CountDistinct => Box::new(DistinctAccumulator {
                seen: FxHashSet::default(),
            }),
            Self::Sum => Box::new(SumAccumulator { sum: None }),
            Self::Avg => Box::new(AvgAccumulator { sum: 0.0, count: 0 }),
            Self::Min => Box::new(ExtremeAccumulator {
                best: None,
                keep: Ordering::Less,
                name: "min",
            }),
            Self::Max => Box::new(ExtremeAccumulator {
                best: None,
                keep: Ordering::Greater,
                name: "max",
            }),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountRows | Self::Count => write!(f, "count"),
            Self::CountDistinct => write!(f, "count_distinct"),
            Self::Sum => write!(f, "sum"),
            Self::Avg => write!(f, "avg"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
        }
    }
}

/// One output column of an aggregation: name, function, and the argument
/// evaluated for every row of the input (absent for `count()`).
#[derive(Debug, Clone)]
pub struct AggSpec {
    pub name: String,
    pub func: AggFunc,
    pub values: Option<Vec<Value>>,
}

trait Accumulator {
    /// Add one non-null value (or, for row counts, one row marker).
    fn add(&mut self, value: &Value) -> Result<(), Diagnostic>;

    fn finalize(self: Box<Self>) -> Value;
}

struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, _value: &Value) -> Result<(), Diagnostic> {
        self.count += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Value {
        Value::Integer(self.count)
    }
}

struct DistinctAccumulator {
    seen: FxHashSet<KeyPart>,
}

impl Accumulator for DistinctAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), Diagnostic> {
        self.seen.insert(KeyPart::from(value));
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Value {
        Value::Integer(self.seen.len() as i64)
    }
}

struct SumAccumulator {
    sum: Option<Value>,
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), Diagnostic> {
        if !value.is_numeric() {
            return Err(Diagnostic::type_error(format!(
                "sum requires numeric values, got {}",
                value.kind()
            )));
        }
        self.sum = Some(match (self.sum.take(), value) {
            (None, v) => v.clone(),
            (Some(Value::Integer(a)), Value::Integer(b)) => Value::Integer(
                a.checked_add(*b)
                    .ok_or_else(|| Diagnostic::runtime("integer overflow in sum"))?,
            ),
            (Some(acc), v) => Value::Real(acc.as_f64().unwrap_or(0.0) + v.as_f64().unwrap_or(0.0)),
        });
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Value {
        self.sum.unwrap_or(Value::Null)
    }
}

struct AvgAccumulator {
    sum: f64,
    count: usize,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), Diagnostic> {
        let x = value.as_f64().ok_or_else(|| {
            Diagnostic::type_error(format!(
                "avg requires numeric values, got {}",
                value.kind()
            ))
        })?;
        self.sum += x;
        self.count += 1;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Real(self.sum / self.count as f64)
        }
    }
}

struct ExtremeAccumulator {
    best: Option<Value>,
    keep: Ordering,
    name: &'static str,
}

impl Accumulator for ExtremeAccumulator {
    fn add(&mut self, value: &Value) -> Result<(), Diagnostic> {
        match &self.best {
            None => self.best = Some(value.clone()),
            Some(best) => {
                let ord = compare_scalars(value, best).ok_or_else(|| {
                    Diagnostic::type_error(format!(
                        "{} cannot compare {} with {}",
                        self.name,
                        value.kind(),
                        best.kind()
                    ))
                })?;
                if ord == self.keep {
                    self.best = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Value {
        self.best.unwrap_or(Value::Null)
    }
}

/// Apply one aggregate to a set of values.
pub fn apply(func: AggFunc, values: &[Value]) -> Result<Value, Diagnostic> {
    let mut acc = func.accumulator();
    for v in values {
        if func == AggFunc::CountRows || !is_missing(v) {
            acc.add(v)?;
        }
    }
    Ok(acc.finalize())
}

fn is_missing(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Real(r) => r.is_nan(),
        _ => false,
    }
}

/// A group: its key cells and the input row indices it owns, in input order.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: Vec<Value>,
    pub rows: Vec<usize>,
}

/// Partition rows by the key columns and order groups by ascending key.
pub fn group_rows(
    rel: &Relation,
    keys: &[usize],
    limits: Limits<'_>,
) -> Result<Vec<Group>, Diagnostic> {
    let mut index: FxHashMap<Vec<KeyPart>, usize> = FxHashMap::default();
    let mut groups: Vec<Group> = Vec::new();
    for (i, row) in rel.rows().iter().enumerate() {
        limits.tick()?;
        let key_vals: Vec<Value> = keys.iter().map(|&k| row[k].clone()).collect();
        let slot = *index.entry(row_key(&key_vals)).or_insert_with(|| {
            groups.push(Group {
                key: key_vals,
                rows: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].rows.push(i);
    }
    groups.sort_by(|a, b| {
        a.key
            .iter()
            .zip(&b.key)
            .map(|(x, y)| sort_cmp(x, y, false))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
    Ok(groups)
}

/// Aggregate `rel` grouped by `keys`. With no keys the whole relation is a
/// single group and the output has exactly one row.
pub fn aggregate(
    rel: &Relation,
    keys: &[usize],
    specs: &[AggSpec],
    limits: Limits<'_>,
) -> Result<Relation, Diagnostic> {
    let groups = if keys.is_empty() {
        vec![Group {
            key: Vec::new(),
            rows: (0..rel.row_count()).collect(),
        }]
    } else {
        group_rows(rel, keys, limits)?
    };
    limits.check_rows(groups.len())?;

    let mut columns: Vec<String> = keys.iter().map(|&k| rel.columns()[k].clone()).collect();
    columns.extend(specs.iter().map(|s| s.name.clone()));

    let mut rows = Vec::with_capacity(groups.len());
    for group in groups {
        limits.tick()?;
        let mut row = group.key;
        for spec in specs {
            let values: Vec<Value> = match &spec.values {
                Some(all) => group.rows.iter().map(|&i| all[i].clone()).collect(),
                None => vec![Value::Null; group.rows.len()],
            };
            row.push(apply(spec.func, &values)?);
        }
        rows.push(row);
    }
    Relation::new(columns, rows).map_err(Diagnostic::runtime)
}
