//! Core verification logic — types, bundle parsing, checking, the pipeline.

pub mod checker;
pub mod parser;
pub mod pipeline;
pub mod state;
pub mod types;
