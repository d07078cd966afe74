//! JSONL commit trail.

pub mod writer;
