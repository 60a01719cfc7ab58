//! Audit trail — JSONL event log and BLAKE3 fingerprints.

pub mod eventlog;
pub mod hasher;
