//! Enquiry Intake — inbound email webhook to enquiry pipeline.

pub mod config;
pub mod error;
pub mod ingest;
pub mod store;
pub mod webhook;
