//! dualverify — dual-representation verification engine.
//!
//! Runs a tabular expression program and a SQL query against the same input
//! relations, each under a deadline, and certifies a problem only when both
//! outputs agree. The same executor and comparator grade learner submissions.

pub mod audit;
pub mod cli;
pub mod core;
pub mod engine;
pub mod ops;
