//! # aims-core
//!
//! Core types, the entity resolver, and error types for AIMS import
//! reconciliation.
//!
//! This crate provides the foundational types shared across all AIMS crates:
//! - Organization, audit, and import-session entities
//! - The intermediate activity graph produced by the document parser
//! - Status enums with state machine transitions
//! - ID prefix constants
//! - Text similarity strategies and the multi-strategy resolver
//! - The currency-rate seam consumed during commit
//! - Trail operation envelope for JSONL persistence
//! - Import summary and decision report types

pub mod entities;
pub mod enums;
pub mod errors;
pub mod graph;
pub mod ids;
pub mod rates;
pub mod reference;
pub mod resolution;
pub mod responses;
pub mod similarity;
pub mod trail;
