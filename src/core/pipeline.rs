//! DV-005: Solution verification pipeline and submission grading.
//!
//! `verify` runs the expression program and the query program against the
//! same inputs and promotes the expression output to canonical only when the
//! checker finds both outputs equivalent. `grade` reuses the same executor
//! and comparator for a single learner submission.

use super::checker::{self, Comparison};
use super::types::*;
use crate::audit::{eventlog, hasher};
use crate::engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Reason given when both programs agree on an empty relation.
pub const VACUOUS_OUTPUT: &str = "vacuous output: both programs produced zero rows";

/// Outcome of grading one submission against a canonical output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Grade {
    Correct,
    /// Ran, but the output differs from the canonical output.
    Incorrect { diagnostic: Diagnostic },
    /// Did not produce a relation.
    Failed { diagnostic: Diagnostic },
}

impl Grade {
    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Correct)
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::Correct => None,
            Self::Incorrect { diagnostic } | Self::Failed { diagnostic } => Some(diagnostic),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect { .. } => "incorrect",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Correct => write!(f, "CORRECT"),
            Self::Incorrect { diagnostic } => write!(f, "INCORRECT: {}", diagnostic),
            Self::Failed { diagnostic } => write!(f, "FAILED: {}", diagnostic),
        }
    }
}

/// Runs verification and grading under one engine configuration.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    config: EngineConfig,
    state_dir: Option<PathBuf>,
}

impl Verifier {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state_dir: None,
        }
    }

    /// Record events under `dir` (when `log.events` is enabled).
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn log_dir(&self) -> Option<&Path> {
        if self.config.log.events {
            self.state_dir.as_deref()
        } else {
            None
        }
    }

    fn record(&self, event: VerificationEvent) {
        if let Some(dir) = self.log_dir() {
            if let Err(e) = eventlog::append_event(dir, event) {
                eprintln!("WARN: {}", e);
            }
        }
    }

    /// Execute one program and record its completion.
    fn run_side(
        &self,
        run_id: &str,
        program: &Program,
        inputs: &Relations,
    ) -> Result<Relation, Diagnostic> {
        let start = Instant::now();
        let result = engine::execute(program, inputs, &self.config.execution);
        self.record(VerificationEvent::ExecutionCompleted {
            run_id: run_id.to_string(),
            side: program.sublanguage,
            duration_seconds: start.elapsed().as_secs_f64(),
            rows: result.as_ref().ok().map(Relation::row_count),
            diagnostic: result.as_ref().err().map(|d| d.kind),
        });
        result
    }

    /// Run both reference programs and decide whether the candidate holds.
    pub fn verify(&self, expression: &str, query: &str, inputs: &Relations) -> VerificationResult {
        let run_id = eventlog::generate_run_id();
        let start = Instant::now();
        self.record(VerificationEvent::VerificationStarted {
            run_id: run_id.clone(),
            expression_hash: hasher::hash_string(expression),
            query_hash: hasher::hash_string(query),
            tables: inputs.keys().cloned().collect(),
        });

        let expr_out = self.run_side(&run_id, &Program::expression(expression), inputs);
        let query_out = self.run_side(&run_id, &Program::query(query), inputs);
        let result = self.decide(expr_out, query_out);

        let output_hash = match &result {
            VerificationResult::Verified { canonical } => match hasher::hash_relation(canonical) {
                Ok(h) => Some(h),
                Err(e) => {
                    eprintln!("WARN: cannot hash canonical output: {}", e);
                    None
                }
            },
            _ => None,
        };
        self.record(VerificationEvent::VerificationCompleted {
            run_id,
            outcome: result.label().to_string(),
            output_hash,
            total_seconds: start.elapsed().as_secs_f64(),
        });
        result
    }

    fn decide(
        &self,
        expr_out: Result<Relation, Diagnostic>,
        query_out: Result<Relation, Diagnostic>,
    ) -> VerificationResult {
        let expr_rel = match expr_out {
            Ok(rel) => rel,
            Err(diagnostic) => {
                return VerificationResult::ExecutionFailure {
                    side: Sublanguage::Expression,
                    diagnostic,
                }
            }
        };
        let query_rel = match query_out {
            Ok(rel) => rel,
            Err(diagnostic) => {
                return VerificationResult::ExecutionFailure {
                    side: Sublanguage::Query,
                    diagnostic,
                }
            }
        };

        if expr_rel.is_empty()
            && query_rel.is_empty()
            && !self.config.verification.accept_empty_output
        {
            return VerificationResult::Rejected {
                reason: VACUOUS_OUTPUT.to_string(),
            };
        }

        match checker::compare(&expr_rel, &query_rel) {
            Comparison::Match => VerificationResult::Verified {
                canonical: expr_rel,
            },
            Comparison::Mismatch(diagnostic) => VerificationResult::Disagreement { diagnostic },
        }
    }

    /// Execute a learner's program and compare it with the canonical output.
    pub fn grade(&self, program: &Program, inputs: &Relations, canonical: &Relation) -> Grade {
        let run_id = eventlog::generate_run_id();
        let start = Instant::now();
        let grade = match self.run_side(&run_id, program, inputs) {
            Err(diagnostic) => Grade::Failed { diagnostic },
            Ok(output) => match checker::compare(&output, canonical) {
                Comparison::Match => Grade::Correct,
                Comparison::Mismatch(diagnostic) => Grade::Incorrect { diagnostic },
            },
        };
        self.record(VerificationEvent::GradingCompleted {
            run_id,
            side: program.sublanguage,
            outcome: grade.label().to_string(),
            diagnostic: grade.diagnostic().map(|d| d.kind),
            total_seconds: start.elapsed().as_secs_f64(),
        });
        grade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> Relations {
        let json = r#"{"columns": ["name", "dept", "salary"],
            "data": [["Alice", "eng", 95000], ["Bob", "ops", 65000],
                     ["Cara", "eng", 72000], ["Dan", "hr", 58000]]}"#;
        let mut m = Relations::new();
        m.insert("employees".into(), serde_json::from_str(json).unwrap());
        m
    }

    const EXPR: &str = "result = employees.filter(salary > 70000).sort(desc(salary)).select(name, salary)";
    const QUERY: &str = "SELECT name, salary FROM employees WHERE salary > 70000 ORDER BY salary DESC";

    #[test]
    fn test_dv005_agreeing_programs_verify() {
        let result = Verifier::default().verify(EXPR, QUERY, &inputs());
        let VerificationResult::Verified { canonical } = result else {
            panic!("expected Verified, got {}", result);
        };
        assert_eq!(canonical.columns(), &["name", "salary"]);
        assert_eq!(canonical.rows()[0][0], Value::Text("Alice".into()));
        assert_eq!(canonical.row_count(), 2);
    }

    #[test]
    fn test_dv005_order_disagreement() {
        let query = "SELECT name, salary FROM employees WHERE salary > 70000 ORDER BY salary ASC";
        let result = Verifier::default().verify(EXPR, query, &inputs());
        let VerificationResult::Disagreement { diagnostic } = result else {
            panic!("expected Disagreement, got {}", result);
        };
        assert_eq!(diagnostic.kind, DiagnosticKind::ValueMismatch);
        assert!(matches!(diagnostic.detail, Some(Detail::Cell { row: 0, .. })));
    }

    #[test]
    fn test_dv005_query_syntax_error() {
        let result = Verifier::default().verify(EXPR, "SELEC name FROM employees", &inputs());
        let VerificationResult::ExecutionFailure { side, diagnostic } = result else {
            panic!("expected ExecutionFailure, got {}", result);
        };
        assert_eq!(side, Sublanguage::Query);
        assert_eq!(diagnostic.kind, DiagnosticKind::SyntaxError);
    }

    #[test]
    fn test_dv005_expression_result_missing() {
        let result = Verifier::default().verify("out = employees", QUERY, &inputs());
        let VerificationResult::ExecutionFailure { side, diagnostic } = result else {
            panic!("expected ExecutionFailure, got {}", result);
        };
        assert_eq!(side, Sublanguage::Expression);
        assert_eq!(diagnostic.kind, DiagnosticKind::ResultMissing);
    }

    #[test]
    fn test_dv005_vacuous_output() {
        let expr = "result = employees.filter(salary > 1000000).select(name)";
        let query = "SELECT name FROM employees WHERE salary > 1000000";
        let result = Verifier::default().verify(expr, query, &inputs());
        assert_eq!(
            result,
            VerificationResult::Rejected {
                reason: VACUOUS_OUTPUT.to_string()
            }
        );

        let mut config = EngineConfig::default();
        config.verification.accept_empty_output = true;
        assert!(Verifier::new(config).verify(expr, query, &inputs()).is_verified());
    }

    #[test]
    fn test_dv005_shape_disagreement() {
        let query = "SELECT name FROM employees WHERE salary > 70000 ORDER BY salary DESC";
        let result = Verifier::default().verify(EXPR, query, &inputs());
        assert!(matches!(
            result,
            VerificationResult::Disagreement { diagnostic } if diagnostic.kind == DiagnosticKind::ShapeMismatch
        ));
    }

    #[test]
    fn test_dv005_grading() {
        let verifier = Verifier::default();
        let canonical = match verifier.verify(EXPR, QUERY, &inputs()) {
            VerificationResult::Verified { canonical } => canonical,
            other => panic!("expected Verified, got {}", other),
        };

        let correct = verifier.grade(
            &Program::query("SELECT name, salary * 1.0 AS salary FROM employees WHERE salary >= 72000 ORDER BY 2 DESC"),
            &inputs(),
            &canonical,
        );
        assert_eq!(correct, Grade::Correct);

        let incorrect = verifier.grade(
            &Program::expression("result = employees.filter(salary > 70000).select(name, salary)"),
            &inputs(),
            &canonical,
        );
        assert_eq!(incorrect.label(), "incorrect");
        assert_eq!(incorrect.diagnostic().unwrap().kind, DiagnosticKind::ValueMismatch);

        let failed = verifier.grade(&Program::expression("result = staff"), &inputs(), &canonical);
        assert_eq!(failed.label(), "failed");
        assert_eq!(failed.diagnostic().unwrap().kind, DiagnosticKind::NameError);
    }

    #[test]
    fn test_dv005_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let verifier = Verifier::default().with_state_dir(dir.path());
        verifier.verify(EXPR, QUERY, &inputs());

        let events = eventlog::read_events(dir.path()).unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0].event, VerificationEvent::VerificationStarted { .. }));
        match &events[3].event {
            VerificationEvent::VerificationCompleted { outcome, output_hash, .. } => {
                assert_eq!(outcome, "verified");
                assert!(output_hash.as_deref().unwrap().starts_with("blake3:"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_dv005_events_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.log.events = false;
        Verifier::new(config)
            .with_state_dir(dir.path())
            .verify(EXPR, QUERY, &inputs());
        assert!(!eventlog::event_log_path(dir.path()).exists());
    }
}
