//! # aims-ingest
//!
//! Turns IATI activity XML into a validated [`ParsedGraph`](aims_core::graph::ParsedGraph).
//!
//! - [`document`]: quick-xml reader producing an order-preserving element tree
//! - [`parser`]: element tree to activity graph, coercing dates and amounts
//! - [`validate`]: percentage, exclusivity, required-field, and period rules
//!
//! Both stages are pure functions of their input.

pub mod document;
pub mod error;
pub mod parser;
pub mod validate;

pub use document::{Element, RawDocument};
pub use error::ParseError;
pub use parser::{parse, parse_xml};
pub use validate::{ValidationReport, ValidationRules, validate};
