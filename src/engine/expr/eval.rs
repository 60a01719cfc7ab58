//! DV-014: Expression-program interpreter.
//!
//! A closed evaluator: input relations and program variables are the only
//! names in scope, and the only callable things are the relation methods and
//! built-in functions below. Inside row-level arguments an identifier
//! resolves to a column of the receiver first, then to a variable.

use super::functions;
use super::parser::{Arg, Expr, Stmt, UnaryOp};
use crate::core::types::{Datum, Diagnostic, DiagnosticKind, Grouped, Relation, Relations, Value};
use crate::ops::aggregate::{self, AggFunc, AggSpec};
use crate::ops::join::{self, JoinKind};
use crate::ops::order::{self, SortKey};
use crate::ops::{filter, project, resolve_columns, Limits};
use rustc_hash::FxHashMap;

/// The variable that must hold the program's output.
pub const RESULT_NAME: &str = "result";

/// One row of a relation, used as evaluation context.
#[derive(Clone, Copy)]
struct RowCtx<'r> {
    rel: &'r Relation,
    row: usize,
}

pub struct Interpreter<'a> {
    vars: FxHashMap<String, Datum>,
    limits: Limits<'a>,
}

impl<'a> Interpreter<'a> {
    /// Fresh scope with each input bound under its name.
    pub fn new(inputs: &Relations, limits: Limits<'a>) -> Self {
        let vars = inputs
            .iter()
            .map(|(name, rel)| (name.clone(), Datum::Relation(rel.clone())))
            .collect();
        Self { vars, limits }
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.vars.get(name)
    }

    /// Run statements in order.
    pub fn exec(&mut self, stmts: &[Stmt]) -> Result<(), Diagnostic> {
        for stmt in stmts {
            self.limits.tick()?;
            match stmt {
                Stmt::Assign { name, value } => {
                    let v = self.eval(value, None)?;
                    self.vars.insert(name.clone(), v);
                }
                Stmt::While { cond, body } => {
                    while self.condition(cond)? {
                        self.limits.tick()?;
                        self.exec(body)?;
                    }
                }
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                } => {
                    if self.condition(cond)? {
                        self.exec(then)?;
                    } else {
                        self.exec(otherwise)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Extract the relation bound to `result`.
    pub fn into_result(mut self) -> Result<Relation, Diagnostic> {
        match self.vars.remove(RESULT_NAME) {
            None => Err(Diagnostic::new(
                DiagnosticKind::ResultMissing,
                format!("program did not assign a value to '{}'", RESULT_NAME),
            )),
            Some(Datum::Relation(rel)) => Ok(rel),
            Some(other) => Err(Diagnostic::new(
                DiagnosticKind::ResultTypeMismatch,
                format!(
                    "'{}' must be a relation, got {}",
                    RESULT_NAME,
                    other.kind_name()
                ),
            )),
        }
    }

    fn condition(&self, cond: &Expr) -> Result<bool, Diagnostic> {
        match self.eval(cond, None)? {
            Datum::Scalar(Value::Boolean(b)) => Ok(b),
            Datum::Scalar(Value::Null) => Ok(false),
            other => Err(Diagnostic::type_error(format!(
                "condition must be boolean, got {}",
                other.kind_name()
            ))),
        }
    }

    fn scalar(&self, expr: &Expr, row: Option<RowCtx<'_>>) -> Result<Value, Diagnostic> {
        match self.eval(expr, row)? {
            Datum::Scalar(v) => Ok(v),
            other => Err(Diagnostic::type_error(format!(
                "expected a scalar value, got {}",
                other.kind_name()
            ))),
        }
    }

    fn eval(&self, expr: &Expr, row: Option<RowCtx<'_>>) -> Result<Datum, Diagnostic> {
        match expr {
            Expr::Literal(v) => Ok(Datum::Scalar(v.clone())),
            Expr::List(items) => items
                .iter()
                .map(|e| self.scalar(e, row))
                .collect::<Result<Vec<_>, _>>()
                .map(Datum::List),
            Expr::Ident(name, pos) => {
                if let Some(ctx) = row {
                    if let Some(i) = ctx.rel.column_index(name) {
                        return Ok(Datum::Scalar(ctx.rel.rows()[ctx.row][i].clone()));
                    }
                }
                self.vars.get(name).cloned().ok_or_else(|| {
                    let message = match row {
                        Some(ctx) => format!(
                            "name '{}' is not defined (columns: {})",
                            name,
                            ctx.rel.columns().join(", ")
                        ),
                        None => format!("name '{}' is not defined", name),
                    };
                    Diagnostic::name(message).with_detail(pos.detail())
                })
            }
            Expr::Unary(op, inner) => {
                let v = self.scalar(inner, row)?;
                let out = match op {
                    UnaryOp::Negate => functions::negate(&v)?,
                    UnaryOp::Not => functions::not(&v)?,
                };
                Ok(Datum::Scalar(out))
            }
            Expr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, row)?;
                let b = self.eval(rhs, row)?;
                match (a, b) {
                    (Datum::Scalar(a), Datum::Scalar(b)) => {
                        Ok(Datum::Scalar(functions::binary(*op, &a, &b)?))
                    }
                    (a, b) => Err(Diagnostic::type_error(format!(
                        "unsupported operand kinds {} and {} for '{}'",
                        a.kind_name(),
                        b.kind_name(),
                        op.symbol()
                    ))),
                }
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                let v = self.scalar(expr, row)?;
                let items = match self.eval(list, row)? {
                    Datum::List(items) => items,
                    other => {
                        return Err(Diagnostic::type_error(format!(
                            "'in' requires a list on the right, got {}",
                            other.kind_name()
                        )))
                    }
                };
                let found = functions::contains(&items, &v);
                Ok(Datum::Scalar(if *negated {
                    functions::not(&found)?
                } else {
                    found
                }))
            }
            Expr::Call { name, args, pos } => {
                if AggFunc::is_aggregate_name(name) {
                    return Err(Diagnostic::type_error(format!(
                        "aggregate '{}' is only valid inside agg()",
                        name
                    ))
                    .with_detail(pos.detail()));
                }
                if name == "asc" || name == "desc" {
                    return Err(Diagnostic::type_error(format!(
                        "'{}' is only valid inside sort()",
                        name
                    ))
                    .with_detail(pos.detail()));
                }
                let values = positional(name, args)?
                    .iter()
                    .map(|e| self.scalar(e, row))
                    .collect::<Result<Vec<_>, _>>()?;
                functions::call(name, &values)
                    .map(Datum::Scalar)
                    .map_err(|d| d.with_detail(pos.detail()))
            }
            Expr::Method {
                receiver,
                name,
                args,
                pos,
            } => {
                let target = self.eval(receiver, row)?;
                let out = match target {
                    Datum::Relation(rel) => self.relation_method(rel, name, args),
                    Datum::Grouped(g) => self.grouped_method(g, name, args),
                    other => Err(Diagnostic::type_error(format!(
                        "{} has no method '{}'",
                        other.kind_name(),
                        name
                    ))),
                };
                out.map_err(|d| {
                    if d.detail.is_none() {
                        d.with_detail(pos.detail())
                    } else {
                        d
                    }
                })
            }
        }
    }

    /// Evaluate `expr` once per row of `rel`.
    fn per_row(&self, rel: &Relation, expr: &Expr) -> Result<Vec<Value>, Diagnostic> {
        let mut out = Vec::with_capacity(rel.row_count());
        for row in 0..rel.row_count() {
            self.limits.tick()?;
            out.push(self.scalar(expr, Some(RowCtx { rel, row }))?);
        }
        Ok(out)
    }

    /// Column names from arguments: bare identifiers naming columns, text
    /// literals, lists of those, or variables holding text or lists of text.
    fn column_names(&self, rel: &Relation, args: &[&Expr]) -> Result<Vec<String>, Diagnostic> {
        let mut names = Vec::new();
        for expr in args {
            self.collect_names(rel, expr, &mut names)?;
        }
        Ok(names)
    }

    fn collect_names(
        &self,
        rel: &Relation,
        expr: &Expr,
        names: &mut Vec<String>,
    ) -> Result<(), Diagnostic> {
        match expr {
            Expr::Ident(name, pos) if rel.column_index(name).is_none() => {
                match self.vars.get(name) {
                    Some(Datum::Scalar(Value::Text(s))) => names.push(s.clone()),
                    Some(Datum::List(items)) => {
                        for item in items {
                            names.push(text_name(item)?);
                        }
                    }
                    _ => {
                        return Err(Diagnostic::name(format!(
                            "column '{}' not found; available columns: {}",
                            name,
                            rel.columns().join(", ")
                        ))
                        .with_detail(pos.detail()))
                    }
                }
            }
            Expr::Ident(name, _) => names.push(name.clone()),
            Expr::Literal(v) => names.push(text_name(v)?),
            Expr::List(items) => {
                for item in items {
                    self.collect_names(rel, item, names)?;
                }
            }
            _ => {
                return Err(Diagnostic::type_error(
                    "expected a column name, a text literal or a list of them",
                ))
            }
        }
        Ok(())
    }

    fn relation_arg(&self, expr: &Expr) -> Result<Relation, Diagnostic> {
        match self.eval(expr, None)? {
            Datum::Relation(r) => Ok(r),
            other => Err(Diagnostic::type_error(format!(
                "expected a relation argument, got {}",
                other.kind_name()
            ))),
        }
    }

    fn checked(&self, rel: Relation) -> Result<Datum, Diagnostic> {
        self.limits.check_rows(rel.row_count())?;
        Ok(Datum::Relation(rel))
    }

    fn relation_method(&self, rel: Relation, name: &str, args: &[Arg]) -> Result<Datum, Diagnostic> {
        match name {
            "filter" => {
                let pred = single(name, args)?;
                let mask = self.per_row(&rel, pred)?;
                self.checked(filter::filter(rel, &mask, self.limits)?)
            }
            "select" | "drop" => {
                let cols = self.column_names(&rel, &positional(name, args)?)?;
                if cols.is_empty() {
                    return Err(Diagnostic::type_error(format!(
                        "{}() requires at least one column",
                        name
                    )));
                }
                let out = if name == "select" {
                    project::select(&rel, &cols)?
                } else {
                    project::drop_columns(&rel, &cols)?
                };
                self.checked(out)
            }
            "derive" => {
                let mut cur = rel;
                for (col, expr) in named(name, args)? {
                    let values = self.per_row(&cur, expr)?;
                    cur = project::set_column(cur, col, values)?;
                }
                self.checked(cur)
            }
            "rename" => {
                let mut pairs = Vec::new();
                for (old, expr) in named(name, args)? {
                    match self.scalar(expr, None)? {
                        Value::Text(new) => pairs.push((old.to_string(), new)),
                        other => {
                            return Err(Diagnostic::type_error(format!(
                                "rename() expects text for '{}', got {}",
                                old,
                                other.kind()
                            )))
                        }
                    }
                }
                self.checked(project::rename(rel, &pairs)?)
            }
            "sort" => {
                let keys = positional(name, args)?
                    .into_iter()
                    .map(|e| self.sort_key(&rel, e))
                    .collect::<Result<Vec<_>, _>>()?;
                if keys.is_empty() {
                    return Err(Diagnostic::type_error("sort() requires at least one key"));
                }
                self.checked(order::sort(rel, &keys, self.limits)?)
            }
            "limit" | "head" => {
                let n = match self.scalar(single(name, args)?, None)? {
                    Value::Integer(n) => n,
                    other => {
                        return Err(Diagnostic::type_error(format!(
                            "{}() expects an integer, got {}",
                            name,
                            other.kind()
                        )))
                    }
                };
                self.checked(filter::limit(rel, n)?)
            }
            "distinct" => {
                no_args(name, args)?;
                self.checked(filter::distinct(rel, self.limits)?)
            }
            "count" => {
                no_args(name, args)?;
                Ok(Datum::Scalar(Value::Integer(rel.row_count() as i64)))
            }
            "group_by" => {
                let cols = self.column_names(&rel, &positional(name, args)?)?;
                if cols.is_empty() {
                    return Err(Diagnostic::type_error("group_by() requires at least one column"));
                }
                let keys = resolve_columns(&rel, &cols)?;
                Ok(Datum::Grouped(Grouped {
                    relation: rel,
                    keys,
                }))
            }
            "agg" => {
                let specs = self.agg_specs(&rel, args)?;
                self.checked(aggregate::aggregate(&rel, &[], &specs, self.limits)?)
            }
            "join" => self.join(rel, args),
            "concat" => {
                let other = self.relation_arg(single(name, args)?)?;
                self.checked(project::concat(rel, &other, self.limits)?)
            }
            other => Err(Diagnostic::name(format!("relation has no method '{}'", other))),
        }
    }

    fn grouped_method(&self, g: Grouped, name: &str, args: &[Arg]) -> Result<Datum, Diagnostic> {
        match name {
            "agg" => {
                let specs = self.agg_specs(&g.relation, args)?;
                self.checked(aggregate::aggregate(&g.relation, &g.keys, &specs, self.limits)?)
            }
            other => Err(Diagnostic::name(format!(
                "grouped relation has no method '{}'; use agg()",
                other
            ))),
        }
    }

    fn sort_key(&self, rel: &Relation, expr: &Expr) -> Result<SortKey, Diagnostic> {
        let (inner, descending) = match expr {
            Expr::Call { name, args, .. } if name == "asc" || name == "desc" => {
                (single(name, args)?, name == "desc")
            }
            other => (other, false),
        };
        let values = match inner {
            Expr::Literal(Value::Text(col)) => {
                let i = resolve_columns(rel, std::slice::from_ref(col))?[0];
                rel.rows().iter().map(|r| r[i].clone()).collect()
            }
            other => self.per_row(rel, other)?,
        };
        Ok(SortKey { values, descending })
    }

    fn agg_specs(&self, rel: &Relation, args: &[Arg]) -> Result<Vec<AggSpec>, Diagnostic> {
        let mut specs = Vec::new();
        for (out, expr) in named("agg", args)? {
            let (fname, fargs) = match expr {
                Expr::Call { name, args, .. } => (name, args),
                _ => {
                    return Err(Diagnostic::type_error(format!(
                        "agg() value for '{}' must be an aggregate call such as sum(x)",
                        out
                    )))
                }
            };
            let fargs = positional(fname, fargs)?;
            let func = AggFunc::from_name(fname, fargs.len()).ok_or_else(|| {
                Diagnostic::name(format!("unknown aggregate '{}'", fname))
            })?;
            let values = match (func, fargs.as_slice()) {
                (AggFunc::CountRows, []) => None,
                (_, [arg]) => Some(self.per_row(rel, arg)?),
                _ => {
                    return Err(Diagnostic::type_error(format!(
                        "{}() takes exactly one argument ({} given)",
                        fname,
                        fargs.len()
                    )))
                }
            };
            specs.push(AggSpec {
                name: out.to_string(),
                func,
                values,
            });
        }
        if specs.is_empty() {
            return Err(Diagnostic::type_error("agg() requires at least one aggregate"));
        }
        Ok(specs)
    }

    fn join(&self, rel: Relation, args: &[Arg]) -> Result<Datum, Diagnostic> {
        let mut right = None;
        let mut on = Vec::new();
        let mut how = JoinKind::Inner;
        for arg in args {
            match arg.name.as_deref() {
                None if right.is_none() => right = Some(self.relation_arg(&arg.value)?),
                None => return Err(Diagnostic::type_error("join() takes one positional argument")),
                Some("on") => {
                    on = match self.eval(&arg.value, None)? {
                        Datum::Scalar(v) => vec![text_name(&v)?],
                        Datum::List(items) => items.iter().map(text_name).collect::<Result<_, _>>()?,
                        other => {
                            return Err(Diagnostic::type_error(format!(
                                "join() 'on' must be text or a list of text, got {}",
                                other.kind_name()
                            )))
                        }
                    }
                }
                Some("how") => match self.scalar(&arg.value, None)? {
                    Value::Text(s) => how = JoinKind::from_name(&s)?,
                    v => {
                        return Err(Diagnostic::type_error(format!(
                            "join() 'how' must be text, got {}",
                            v.kind()
                        )))
                    }
                },
                Some(other) => {
                    return Err(Diagnostic::type_error(format!(
                        "join() got an unexpected keyword argument '{}'",
                        other
                    )))
                }
            }
        }
        let right = right
            .ok_or_else(|| Diagnostic::type_error("join() requires a relation to join with"))?;
        self.checked(join::join(&rel, &right, &on, how, self.limits)?)
    }
}

fn text_name(v: &Value) -> Result<String, Diagnostic> {
    match v {
        Value::Text(s) => Ok(s.clone()),
        other => Err(Diagnostic::type_error(format!(
            "expected a column name, got {}",
            other.kind()
        ))),
    }
}

fn positional<'e>(fname: &str, args: &'e [Arg]) -> Result<Vec<&'e Expr>, Diagnostic> {
    args.iter()
        .map(|a| match &a.name {
            None => Ok(&a.value),
            Some(n) => Err(Diagnostic::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                fname, n
            ))),
        })
        .collect()
}

fn named<'e>(fname: &str, args: &'e [Arg]) -> Result<Vec<(&'e str, &'e Expr)>, Diagnostic> {
    args.iter()
        .map(|a| match &a.name {
            Some(n) => Ok((n.as_str(), &a.value)),
            None => Err(Diagnostic::type_error(format!(
                "{}() only takes keyword arguments (name = expression)",
                fname
            ))),
        })
        .collect()
}

fn single<'e>(fname: &str, args: &'e [Arg]) -> Result<&'e Expr, Diagnostic> {
    match positional(fname, args)?.as_slice() {
        [one] => Ok(*one),
        other => Err(Diagnostic::type_error(format!(
            "{}() takes exactly one argument ({} given)",
            fname,
            other.len()
        ))),
    }
}

fn no_args(fname: &str, args: &[Arg]) -> Result<(), Diagnostic> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Diagnostic::type_error(format!(
            "{}() takes no arguments ({} given)",
            fname,
            args.len()
        )))
    }
}
