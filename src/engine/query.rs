//! DV-015: Query executor — one read-only statement against an ephemeral
//! in-memory SQLite store seeded with the input relations.
//!
//! Each call opens a fresh connection, creates one table per input, switches
//! the connection to `query_only`, and runs the statement with a progress
//! handler that aborts once the cancellation token is set. Result column
//! order and row order are taken as-is from the engine.

use crate::core::types::{Diagnostic, DiagnosticKind, Relation, Relations, ScalarKind, Value};
use crate::engine::governor::CancelToken;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::sync::OnceLock;

/// SQLite VM steps between cancellation polls.
const PROGRESS_STEPS: i32 = 1000;

/// Run `text` against a fresh store holding `inputs`.
pub fn execute(
    text: &str,
    inputs: &Relations,
    max_rows: usize,
    token: &CancelToken,
) -> Result<Relation, Diagnostic> {
    check_statement(text)?;
    token.check()?;

    let mut conn = Connection::open_in_memory()
        .map_err(|e| Diagnostic::runtime(format!("cannot open query store: {}", e)))?;
    seed(&mut conn, inputs)?;
    conn.execute_batch("PRAGMA query_only = 1;")
        .map_err(|e| Diagnostic::runtime(format!("cannot lock query store: {}", e)))?;

    let poll = token.clone();
    conn.progress_handler(PROGRESS_STEPS, Some(move || poll.is_cancelled()));

    let mut stmt = conn.prepare(text).map_err(|e| classify(&e))?;
    if !stmt.readonly() {
        return Err(Diagnostic::syntax("only read-only queries are allowed"));
    }

    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let decls: Vec<Option<String>> = stmt
        .columns()
        .iter()
        .map(|c| c.decl_type().map(|t| t.to_ascii_uppercase()))
        .collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([]).map_err(|e| classify(&e))?;
    while let Some(row) = cursor.next().map_err(|e| classify(&e))? {
        token.check()?;
        let mut out = Vec::with_capacity(columns.len());
        for (i, decl) in decls.iter().enumerate() {
            let cell = row.get_ref(i).map_err(|e| classify(&e))?;
            out.push(from_sql(cell, decl.as_deref(), &columns[i])?);
        }
        rows.push(out);
        if rows.len() > max_rows {
            return Err(Diagnostic::runtime(format!(
                "query result has more than {} rows",
                max_rows
            )));
        }
    }

    Relation::new(columns, rows).map_err(|e| {
        Diagnostic::new(
            DiagnosticKind::ResultTypeMismatch,
            format!("query result is not a valid relation: {}", e),
        )
    })
}

fn leading_keyword() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^\s*(select|with|values)\b").ok())
        .as_ref()
}

/// Reject anything but a single SELECT-style statement before touching the
/// store.
fn check_statement(text: &str) -> Result<(), Diagnostic> {
    let (code, terminators) = scan_sql(text);
    if code.trim().is_empty() {
        return Err(Diagnostic::syntax("empty query"));
    }
    if let Some(&first) = terminators.first() {
        if !code[first + 1..].trim().is_empty() {
            return Err(Diagnostic::syntax(
                "only a single statement is allowed per query",
            ));
        }
    }
    if !leading_keyword().is_some_and(|re| re.is_match(&code)) {
        let word: String = code
            .trim_start()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        return Err(Diagnostic::syntax(format!(
            "only SELECT queries are allowed, found '{}'",
            word
        )));
    }
    Ok(())
}

/// Blank out comments and find top-level `;` positions in the result.
/// Quoted strings and identifiers are kept intact.
fn scan_sql(text: &str) -> (String, Vec<usize>) {
    let mut code = String::with_capacity(text.len());
    let mut terminators = Vec::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '-' if chars.peek() == Some(&'-') => {
                for n in chars.by_ref() {
                    if n == '\n' {
                        break;
                    }
                }
                code.push('\n');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                code.push(' ');
            }
            '\'' | '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                code.push(c);
                for n in chars.by_ref() {
                    code.push(n);
                    if n == close {
                        break;
                    }
                }
            }
            ';' => {
                terminators.push(code.len());
                code.push(c);
            }
            other => code.push(other),
        }
    }
    (code, terminators)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn declared_type(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Integer => " INTEGER",
        ScalarKind::Real => " REAL",
        ScalarKind::Text => " TEXT",
        ScalarKind::Boolean => " BOOLEAN",
        ScalarKind::Temporal => " TIMESTAMP",
        ScalarKind::Null => "",
    }
}

/// CREATE TABLE statement for one input relation.
fn create_table_sql(name: &str, rel: &Relation) -> String {
    let cols: Vec<String> = rel
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}{}", quote_ident(c), declared_type(rel.column_kind(i))))
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(name), cols.join(", "))
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) if r.is_nan() => SqlValue::Null,
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) | Value::Temporal(s) => SqlValue::Text(s.clone()),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
    }
}

fn seed(conn: &mut Connection, inputs: &Relations) -> Result<(), Diagnostic> {
    let seed_err = |name: &str, e: rusqlite::Error| {
        Diagnostic::runtime(format!("cannot load table '{}': {}", name, e))
    };
    let tx = conn
        .transaction()
        .map_err(|e| Diagnostic::runtime(format!("cannot open seed transaction: {}", e)))?;
    for (name, rel) in inputs {
        tx.execute(&create_table_sql(name, rel), [])
            .map_err(|e| seed_err(name, e))?;
        if rel.column_count() == 0 {
            continue;
        }
        let placeholders = vec!["?"; rel.column_count()].join(", ");
        let insert = format!("INSERT INTO {} VALUES ({})", quote_ident(name), placeholders);
        let mut stmt = tx.prepare(&insert).map_err(|e| seed_err(name, e))?;
        for row in rel.rows() {
            stmt.execute(params_from_iter(row.iter().map(to_sql)))
                .map_err(|e| seed_err(name, e))?;
        }
    }
    tx.commit()
        .map_err(|e| Diagnostic::runtime(format!("cannot commit seed data: {}", e)))
}

fn from_sql(cell: ValueRef<'_>, decl: Option<&str>, column: &str) -> Result<Value, Diagnostic> {
    Ok(match (cell, decl) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), Some("BOOLEAN")) => Value::Boolean(i != 0),
        (ValueRef::Integer(i), _) => Value::Integer(i),
        (ValueRef::Real(r), _) => Value::Real(r),
        (ValueRef::Text(bytes), decl) => {
            let s = String::from_utf8_lossy(bytes);
            match decl {
                Some("TIMESTAMP") | Some("DATE") | Some("DATETIME") => Value::Temporal(s.into_owned()),
                _ => Value::from_text(&s),
            }
        }
        (ValueRef::Blob(_), _) => {
            return Err(Diagnostic::runtime(format!(
                "column '{}' produced a BLOB value, which is not supported",
                column
            )))
        }
    })
}

/// Map an engine error onto the diagnostic taxonomy.
fn classify(e: &rusqlite::Error) -> Diagnostic {
    if let rusqlite::Error::MultipleStatement = e {
        return Diagnostic::syntax("only a single statement is allowed per query");
    }
    let message = match e {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        other => other.to_string(),
    };
    let lower = message.to_lowercase();
    let kind = if lower.contains("interrupt") {
        DiagnosticKind::TimeoutError
    } else if lower.contains("syntax error")
        || lower.contains("incomplete input")
        || lower.contains("unrecognized token")
    {
        DiagnosticKind::SyntaxError
    } else if lower.contains("no such table")
        || lower.contains("no such column")
        || lower.contains("no such function")
        || lower.contains("ambiguous column")
    {
        DiagnosticKind::NameError
    } else if lower.contains("wrong number of arguments") || lower.contains("datatype mismatch") {
        DiagnosticKind::TypeError
    } else {
        DiagnosticKind::RuntimeError
    };
    Diagnostic::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Relations {
        let json = r#"{"columns": ["name", "dept", "salary", "active", "hired"],
            "data": [["Alice", "eng", 95000, true, "2019-03-01"],
                     ["Bob", "ops", 65000.5, false, "2021-07-15"],
                     ["Cara", "eng", 72000, true, "2020-01-10"]]}"#;
        let mut m = Relations::new();
        m.insert("employees".into(), serde_json::from_str(json).unwrap());
        m
    }

    fn run(sql: &str) -> Result<Relation, Diagnostic> {
        execute(sql, &inputs(), 1000, &CancelToken::new())
    }

    #[test]
    fn test_dv015_select_preserves_order_and_kinds() {
        let out = run("SELECT name, salary, active, hired FROM employees ORDER BY salary DESC").unwrap();
        assert_eq!(out.columns(), &["name", "salary", "active", "hired"]);
        assert_eq!(out.rows()[0][0], Value::Text("Alice".into()));
        assert_eq!(out.rows()[0][1], Value::Real(95000.0));
        assert_eq!(out.rows()[0][2], Value::Boolean(true));
        assert_eq!(out.rows()[0][3], Value::Temporal("2019-03-01".into()));
    }

    #[test]
    fn test_dv015_with_clause_and_aggregate() {
        let sql = "WITH e AS (SELECT * FROM employees WHERE active)
                   SELECT dept, COUNT(*) AS n FROM e GROUP BY dept";
        let out = run(sql).unwrap();
        assert_eq!(out.rows(), &[vec![Value::Text("eng".into()), Value::Integer(2)]]);
    }

    #[test]
    fn test_dv015_syntax_error() {
        let err = run("SELEC name FROM employees").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::SyntaxError);
        let err = run("SELECT name FROM").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::SyntaxError);
    }

    #[test]
    fn test_dv015_name_errors() {
        let err = run("SELECT * FROM staff").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NameError);
        assert!(err.message.contains("no such table"));
        let err = run("SELECT wage FROM employees").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::NameError);
    }

    #[test]
    fn test_dv015_writes_rejected() {
        for sql in [
            "DELETE FROM employees",
            "DROP TABLE employees",
            "ATTACH DATABASE '/tmp/x.db' AS x",
            "SELECT 1; DELETE FROM employees",
        ] {
            let err = run(sql).unwrap_err();
            assert_eq!(err.kind, DiagnosticKind::SyntaxError, "{}", sql);
        }
    }

    #[test]
    fn test_dv015_trailing_semicolon_and_comments() {
        let out = run("-- leading comment\nSELECT name FROM employees; /* done */").unwrap();
        assert_eq!(out.row_count(), 3);
        let out = run("SELECT ';' AS s FROM employees LIMIT 1").unwrap();
        assert_eq!(out.rows()[0][0], Value::Text(";".into()));
    }

    #[test]
    fn test_dv015_fresh_store_per_call() {
        let a = run("SELECT COUNT(*) AS n FROM employees").unwrap();
        let b = run("SELECT COUNT(*) AS n FROM employees").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.rows()[0][0], Value::Integer(3));
    }

    #[test]
    fn test_dv015_runaway_query_interrupted() {
        let token = CancelToken::new();
        token.cancel();
        let err = execute(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT x FROM c",
            &inputs(),
            1000,
            &token,
        )
        .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TimeoutError);
    }

    #[test]
    fn test_dv015_row_ceiling() {
        let err = execute(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) SELECT x FROM c",
            &inputs(),
            50,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::RuntimeError);
    }

    #[test]
    fn test_dv015_duplicate_output_columns() {
        let err = run("SELECT name, name FROM employees").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::ResultTypeMismatch);
    }

    #[test]
    fn test_dv015_quoted_identifiers() {
        let mut m = Relations::new();
        m.insert(
            "odd \"table\"".into(),
            Relation::new(vec!["select".into()], vec![vec![Value::Integer(1)]]).unwrap(),
        );
        let out = execute(
            r#"SELECT "select" FROM "odd ""table""""#,
            &m,
            10,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(out.rows()[0][0], Value::Integer(1));
    }

    #[test]
    fn test_dv015_scan_sql() {
        let (code, semis) = scan_sql("SELECT 'a;b' -- x;\n; ");
        assert_eq!(semis.len(), 1);
        assert!(code.contains("'a;b'"));
    }
}
