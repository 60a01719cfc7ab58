//! DV-010: Expression sublanguage — lexer, parser, interpreter.
//!
//! Programs are sequences of assignments and simple control flow over
//! relations. The final value of `result` is the program's output.

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;

use crate::core::types::{Diagnostic, Relation, Relations};
use crate::engine::governor::CancelToken;
use crate::ops::Limits;

/// Parse and run an expression program against the given inputs.
pub fn execute(
    text: &str,
    inputs: &Relations,
    max_rows: usize,
    token: &CancelToken,
) -> Result<Relation, Diagnostic> {
    let stmts = parser::parse_program(text)?;
    let mut interp = eval::Interpreter::new(inputs, Limits::new(max_rows, token));
    interp.exec(&stmts)?;
    interp.into_result()
}
