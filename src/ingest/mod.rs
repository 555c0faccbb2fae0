//! Inbound email ingestion pipeline.
//!
//! Stages: field normalization, discard rules, owner routing, lead
//! extraction, dedup-gated persistence. Everything before the store is a
//! pure transformation, testable without I/O.

pub mod dedup;
pub mod extract;
pub mod normalize;
pub mod processor;
pub mod rules;
pub mod types;

pub use processor::IngestProcessor;
pub use types::{BodySource, IngestOutcome, NormalizedMessage};
