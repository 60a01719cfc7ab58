//! DV-001: Core types — values, relations, programs, diagnostics, verdicts.
//!
//! Defines the relation data model shared by both executors and the checker,
//! the diagnostic taxonomy, the problem bundle schema, engine configuration,
//! and audit events. Serializable types derive Serialize/Deserialize for
//! YAML/JSON roundtripping.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Scalar values
// ============================================================================

/// Inferred kind of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Null,
    Integer,
    Real,
    Text,
    Boolean,
    Temporal,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer => write!(f, "integer"),
            Self::Real => write!(f, "real"),
            Self::Text => write!(f, "text"),
            Self::Boolean => write!(f, "boolean"),
            Self::Temporal => write!(f, "temporal"),
        }
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    /// ISO-8601 date or timestamp, kept in its textual form.
    Temporal(String),
}

fn temporal_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[ T]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)?$").ok()
        })
        .as_ref()
}

impl Value {
    /// Classify a string: ISO dates/timestamps become temporal, anything else text.
    pub fn from_text(s: &str) -> Value {
        if temporal_pattern().is_some_and(|re| re.is_match(s)) {
            Value::Temporal(s.to_string())
        } else {
            Value::Text(s.to_string())
        }
    }

    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Null => ScalarKind::Null,
            Value::Integer(_) => ScalarKind::Integer,
            Value::Real(_) => ScalarKind::Real,
            Value::Text(_) => ScalarKind::Text,
            Value::Boolean(_) => ScalarKind::Boolean,
            Value::Temporal(_) => ScalarKind::Temporal,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    /// Numeric view of integers and reals.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Textual view of text and temporal values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Temporal(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON scalar. Arrays and objects are not cell values.
    pub fn from_json(v: &serde_json::Value) -> Result<Value, String> {
        match v {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else {
                    n.as_f64()
                        .map(Value::Real)
                        .ok_or_else(|| format!("unrepresentable number {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::from_text(s)),
            other => Err(format!("cell must be a scalar, got {}", other)),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Real(r) => serde_json::Number::from_f64(*r)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) | Value::Temporal(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{:?}", r),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Temporal(s) => write!(f, "{}", s),
        }
    }
}

// ============================================================================
// Relations
// ============================================================================

/// Table interchange format: `{ columns: [..], data: [[..], ..] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

/// Ordered columns plus ordered rows. Row order and column order are part of
/// the relation's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableData", into = "TableData")]
pub struct Relation {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Relation {
    /// Build a relation, enforcing unique column names and uniform arity.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Relation, String> {
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(format!("duplicate column name '{}'", name));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(format!(
                    "row {} has {} values but the schema has {} columns",
                    i,
                    row.len(),
                    columns.len()
                ));
            }
        }
        Ok(Relation { columns, rows })
    }

    /// A relation with the given schema and no rows.
    pub fn empty(columns: Vec<String>) -> Result<Relation, String> {
        Relation::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Value>>) {
        (self.columns, self.rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Infer a column's kind from its non-null cells. Integer and real mix to
    /// real; any other mix falls back to text.
    pub fn column_kind(&self, index: usize) -> ScalarKind {
        let mut kind = ScalarKind::Null;
        for row in &self.rows {
            let k = row[index].kind();
            kind = match (kind, k) {
                (_, ScalarKind::Null) => kind,
                (ScalarKind::Null, k) => k,
                (a, b) if a == b => a,
                (ScalarKind::Integer, ScalarKind::Real) | (ScalarKind::Real, ScalarKind::Integer) => {
                    ScalarKind::Real
                }
                _ => ScalarKind::Text,
            };
        }
        kind
    }
}

impl TryFrom<TableData> for Relation {
    type Error = String;

    fn try_from(table: TableData) -> Result<Self, Self::Error> {
        let mut rows = Vec::with_capacity(table.data.len());
        for (i, raw) in table.data.iter().enumerate() {
            let row = raw
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("row {}: {}", i, e))?;
            rows.push(row);
        }
        Relation::new(table.columns, rows)
    }
}

impl From<Relation> for TableData {
    fn from(rel: Relation) -> Self {
        TableData {
            data: rel
                .rows
                .iter()
                .map(|r| r.iter().map(Value::to_json).collect())
                .collect(),
            columns: rel.columns,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].len())
                    .max()
                    .unwrap_or(0)
                    .max(c.len())
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!(" {:<w$} ", c, w = *w))
            .collect();
        writeln!(f, "{}", header.join("|"))?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        writeln!(f, "{}", rule.join("+"))?;
        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!(" {:<w$} ", v, w = *w))
                .collect();
            writeln!(f, "{}", line.join("|"))?;
        }
        write!(f, "({} rows)", self.rows.len())
    }
}

/// Input bindings: case-sensitive name → relation, in declaration order.
pub type Relations = IndexMap<String, Relation>;

/// A relation partitioned by key columns, produced by `group_by`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouped {
    pub relation: Relation,
    pub keys: Vec<usize>,
}

/// Any value an expression program can bind to a name.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Relation(Relation),
    Grouped(Grouped),
    Scalar(Value),
    List(Vec<Value>),
}

impl Datum {
    /// Human-readable kind, used in type diagnostics.
    pub fn kind_name(&self) -> String {
        match self {
            Datum::Relation(_) => "relation".to_string(),
            Datum::Grouped(_) => "grouped relation".to_string(),
            Datum::Scalar(v) => v.kind().to_string(),
            Datum::List(_) => "list".to_string(),
        }
    }
}

// ============================================================================
// Programs
// ============================================================================

/// The two program sublanguages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sublanguage {
    /// Tabular expression programs that bind `result`.
    Expression,
    /// A single SELECT-style query.
    Query,
}

impl fmt::Display for Sublanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression => write!(f, "expression"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Program text tagged with its sublanguage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub sublanguage: Sublanguage,
    pub text: String,
}

impl Program {
    pub fn expression(text: impl Into<String>) -> Self {
        Self {
            sublanguage: Sublanguage::Expression,
            text: text.into(),
        }
    }

    pub fn query(text: impl Into<String>) -> Self {
        Self {
            sublanguage: Sublanguage::Query,
            text: text.into(),
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Failure taxonomy shared by executors and the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    SyntaxError,
    NameError,
    TypeError,
    ResultMissing,
    ResultTypeMismatch,
    RuntimeError,
    TimeoutError,
    TypeMismatch,
    ShapeMismatch,
    ColumnMismatch,
    ValueMismatch,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SyntaxError => "SyntaxError",
            Self::NameError => "NameError",
            Self::TypeError => "TypeError",
            Self::ResultMissing => "ResultMissing",
            Self::ResultTypeMismatch => "ResultTypeMismatch",
            Self::RuntimeError => "RuntimeError",
            Self::TimeoutError => "TimeoutError",
            Self::TypeMismatch => "TypeMismatch",
            Self::ShapeMismatch => "ShapeMismatch",
            Self::ColumnMismatch => "ColumnMismatch",
            Self::ValueMismatch => "ValueMismatch",
        };
        write!(f, "{}", s)
    }
}

/// Structured detail attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detail", rename_all = "snake_case")]
pub enum Detail {
    /// Position in program text (1-based).
    Location { line: usize, column: usize },
    /// Actual kinds of two compared operands.
    Kinds { left: String, right: String },
    /// (rows, columns) of both sides.
    Shape {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Column-name classification.
    Columns {
        missing: Vec<String>,
        extra: Vec<String>,
        reordered: bool,
    },
    /// First differing cell.
    Cell {
        row: usize,
        column: String,
        left: String,
        right: String,
    },
}

/// A failure description returned as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, flatten, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Detail>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::SyntaxError, message)
    }

    pub fn name(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::NameError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::TypeError, message)
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::RuntimeError, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(Detail::Location { line, column }) = &self.detail {
            write!(f, " (line {}, column {})", line, column)?;
        }
        Ok(())
    }
}

// ============================================================================
// Verification outcome
// ============================================================================

/// Terminal outcome of one verification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationResult {
    /// Both programs agree; the relation is the canonical expected output.
    Verified { canonical: Relation },
    /// Both programs ran but their outputs differ.
    Disagreement { diagnostic: Diagnostic },
    /// One side failed to execute; the comparator was not run.
    ExecutionFailure {
        side: Sublanguage,
        diagnostic: Diagnostic,
    },
    /// The candidate is refused without a comparison verdict.
    Rejected { reason: String },
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Short outcome label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "verified",
            Self::Disagreement { .. } => "disagreement",
            Self::ExecutionFailure { .. } => "execution_failure",
            Self::Rejected { .. } => "rejected",
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verified { canonical } => {
                let (r, c) = canonical.shape();
                write!(f, "VERIFIED ({} rows, {} columns)", r, c)
            }
            Self::Disagreement { diagnostic } => write!(f, "DISAGREEMENT: {}", diagnostic),
            Self::ExecutionFailure { side, diagnostic } => {
                write!(f, "EXECUTION FAILURE ({} side): {}", side, diagnostic)
            }
            Self::Rejected { reason } => write!(f, "REJECTED: {}", reason),
        }
    }
}

// ============================================================================
// Problem bundle
// ============================================================================

/// Problem difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// A practice problem: inputs, question, reference programs, ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Skill focus (e.g. "filter_rows", "group_by")
    pub topic: String,

    #[serde(default)]
    pub difficulty: Difficulty,

    /// What the learner must produce
    pub question: String,

    /// Input tables (order-preserving)
    pub input_tables: IndexMap<String, TableData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_solution: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_solution: Option<String>,

    /// Canonical output, present once the problem has been verified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<TableData>,
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Root engine configuration (`verifier.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionPolicy,

    #[serde(default)]
    pub verification: VerificationPolicy,

    #[serde(default)]
    pub log: LogPolicy,
}

/// Per-execution bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    /// Wall-clock deadline per execution; 0 disables enforcement
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,

    /// How long to wait for a cancelled worker to wind down
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Ceiling on rows in any intermediate relation
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_ms: default_grace_ms(),
            max_rows: default_max_rows(),
        }
    }
}

impl ExecutionPolicy {
    /// Deadline, or None when enforcement is disabled.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs > 0.0 && self.timeout_secs.is_finite() {
            Some(Duration::from_secs_f64(self.timeout_secs))
        } else {
            None
        }
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

fn default_timeout_secs() -> f64 {
    5.0
}

fn default_grace_ms() -> u64 {
    500
}

fn default_max_rows() -> usize {
    1_000_000
}

/// Verification policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    /// Treat empty-vs-empty agreement as proof of correctness
    #[serde(default)]
    pub accept_empty_output: bool,
}

/// Audit logging policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPolicy {
    /// Append JSONL events to `<state_dir>/events.jsonl`
    #[serde(default = "default_true")]
    pub events: bool,
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self { events: true }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Audit events
// ============================================================================

/// Event for the JSONL audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VerificationEvent {
    VerificationStarted {
        run_id: String,
        expression_hash: String,
        query_hash: String,
        tables: Vec<String>,
    },
    ExecutionCompleted {
        run_id: String,
        side: Sublanguage,
        duration_seconds: f64,
        #[serde(default)]
        rows: Option<usize>,
        #[serde(default)]
        diagnostic: Option<DiagnosticKind>,
    },
    VerificationCompleted {
        run_id: String,
        outcome: String,
        #[serde(default)]
        output_hash: Option<String>,
        total_seconds: f64,
    },
    GradingCompleted {
        run_id: String,
        side: Sublanguage,
        outcome: String,
        #[serde(default)]
        diagnostic: Option<DiagnosticKind>,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: VerificationEvent,
}

// ============================================================================
// Tests
// ============================================================================
