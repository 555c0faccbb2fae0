//! Persistence layer — libSQL-backed storage for enquiries.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Enquiry, EnquirySource, EnquiryStatus, EnquiryStore, InsertOutcome, NewEnquiry,
};
