//! Sandbox executors — one per sublanguage, each run under the governor.

pub mod expr;
pub mod governor;
pub mod query;

use crate::core::types::{Diagnostic, ExecutionPolicy, Program, Relation, Relations, Sublanguage};
use governor::Governor;

/// Execute a program against `inputs` under the policy's deadline and row
/// ceiling. Inputs are copied into the attempt; the caller's relations are
/// never touched.
pub fn execute(
    program: &Program,
    inputs: &Relations,
    policy: &ExecutionPolicy,
) -> Result<Relation, Diagnostic> {
    let text = program.text.clone();
    let inputs = inputs.clone();
    let max_rows = policy.max_rows;
    let governor = Governor::from_policy(policy);
    match program.sublanguage {
        Sublanguage::Expression => {
            governor.run(move |token| expr::execute(&text, &inputs, max_rows, token))
        }
        Sublanguage::Query => {
            governor.run(move |token| query::execute(&text, &inputs, max_rows, token))
        }
    }
}
