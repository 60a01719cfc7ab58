//! DV-020: Problem bundle, table, and configuration parsing and validation.
//!
//! Parses `problem.yaml` bundles and `verifier.yaml` configuration and
//! validates structural constraints:
//! - Version must be "1.0"
//! - Topic and question must be non-empty
//! - At least one input table, each a well-formed relation with a name
//!   usable as an identifier
//! - Execution bounds must be finite and non-zero where required

use super::types::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn error(message: impl Into<String>) -> ValidationError {
    ValidationError {
        message: message.into(),
    }
}

fn read(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

// ============================================================================
// Problem bundles
// ============================================================================

/// Parse a problem bundle from disk.
pub fn parse_problem_file(path: &Path) -> Result<Problem, String> {
    parse_problem(&read(path)?).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Parse a problem bundle from YAML (or JSON) text.
pub fn parse_problem(yaml: &str) -> Result<Problem, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

fn identifier() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
}

/// Validate a parsed problem. Returns a list of errors (empty = valid).
pub fn validate_problem(problem: &Problem) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if problem.version != "1.0" {
        errors.push(error(format!(
            "version must be \"1.0\", got \"{}\"",
            problem.version
        )));
    }
    if problem.topic.trim().is_empty() {
        errors.push(error("topic must not be empty"));
    }
    if problem.question.trim().is_empty() {
        errors.push(error("question must not be empty"));
    }
    if problem.input_tables.is_empty() {
        errors.push(error("at least one input table is required"));
    }

    for (name, table) in &problem.input_tables {
        if !identifier().is_some_and(|re| re.is_match(name)) {
            errors.push(error(format!(
                "table name '{}' is not a valid identifier",
                name
            )));
        }
        if let Err(e) = Relation::try_from(table.clone()) {
            errors.push(error(format!("table '{}': {}", name, e)));
        }
    }

    if let Some(expected) = &problem.expected_output {
        if let Err(e) = Relation::try_from(expected.clone()) {
            errors.push(error(format!("expected_output: {}", e)));
        }
    }

    for (field, text) in [
        ("expression_solution", &problem.expression_solution),
        ("query_solution", &problem.query_solution),
    ] {
        if text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            errors.push(error(format!("{} must not be empty when present", field)));
        }
    }

    errors
}

/// Build the named input relations of a problem.
pub fn relations(problem: &Problem) -> Result<Relations, String> {
    problem
        .input_tables
        .iter()
        .map(|(name, table)| {
            Relation::try_from(table.clone())
                .map(|rel| (name.clone(), rel))
                .map_err(|e| format!("table '{}': {}", name, e))
        })
        .collect()
}

/// The bundle's canonical output, if it has one.
pub fn expected_relation(problem: &Problem) -> Result<Option<Relation>, String> {
    problem
        .expected_output
        .clone()
        .map(|t| Relation::try_from(t).map_err(|e| format!("expected_output: {}", e)))
        .transpose()
}

/// Parse, validate, and fold validation errors into one message.
pub fn load_problem(path: &Path) -> Result<Problem, String> {
    let problem = parse_problem_file(path)?;
    let errors = validate_problem(&problem);
    if errors.is_empty() {
        Ok(problem)
    } else {
        Err(join_errors(path, &errors))
    }
}

fn join_errors(path: &Path, errors: &[ValidationError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
    format!(
        "{} has {} validation error(s):\n{}",
        path.display(),
        errors.len(),
        lines.join("\n")
    )
}

// ============================================================================
// Standalone tables
// ============================================================================

/// Load a relation from a `.json` or `.yaml` table file.
pub fn load_table(path: &Path) -> Result<Relation, String> {
    let content = read(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str::<Relation>(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml_ng::from_str::<Relation>(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| format!("invalid table {}: {}", path.display(), e))
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Parse an engine configuration from YAML text.
pub fn parse_config(yaml: &str) -> Result<EngineConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate execution bounds.
pub fn validate_config(config: &EngineConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let timeout = config.execution.timeout_secs;
    if !timeout.is_finite() {
        errors.push(error("execution.timeout_secs must be finite"));
    } else if timeout < 0.0 {
        errors.push(error(format!(
            "execution.timeout_secs must not be negative, got {}",
            timeout
        )));
    }
    if config.execution.max_rows == 0 {
        errors.push(error("execution.max_rows must be at least 1"));
    }
    errors
}

/// Load and validate `verifier.yaml`. A missing path yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let config = parse_config(&read(path)?).map_err(|e| format!("{}: {}", path.display(), e))?;
    let errors = validate_config(&config);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(join_errors(path, &errors))
    }
}

// ============================================================================
// Template
// ============================================================================

/// Starter bundle written by `init`.
pub const PROBLEM_TEMPLATE: &str = r#"version: "1.0"
topic: filter_rows
difficulty: easy
question: >
  List the name and salary of every employee earning more than 70000,
  highest paid first.
input_tables:
  employees:
    columns: [name, dept, salary]
    data:
      - [Alice, eng, 95000]
      - [Bob, ops, 65000]
      - [Cara, eng, 72000]
      - [Dan, hr, 58000]
expression_solution: |
  result = employees.filter(salary > 70000).sort(desc(salary)).select(name, salary)
query_solution: |
  SELECT name, salary FROM employees WHERE salary > 70000 ORDER BY salary DESC
"#;
