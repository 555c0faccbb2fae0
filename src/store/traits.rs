//! `EnquiryStore` trait and the persisted enquiry model.
//!
//! The ingestion pipeline needs exactly one write operation from its
//! storage collaborator: an atomic insert-if-new keyed on the dedup key.
//! Reads exist for the operator API and for tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Where an enquiry came from. Only inbound email today; the variant set
/// grows when other intake channels land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnquirySource {
    Email,
}

impl EnquirySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
        }
    }

    /// Parse a source string from the DB. Unknown values fall back to email.
    pub fn from_db_str(_s: &str) -> Self {
        Self::Email
    }
}

/// Lifecycle state of an enquiry. Ingestion always writes `New`;
/// the later states belong to triage, which happens elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnquiryStatus {
    New,
    Contacted,
    Booked,
    Closed,
}

impl EnquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Booked => "booked",
            Self::Closed => "closed",
        }
    }

    /// Parse a status string from the DB. Unknown values map to `New`.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "contacted" => Self::Contacted,
            "booked" => Self::Booked,
            "closed" => Self::Closed,
            _ => Self::New,
        }
    }
}

/// Fields for an enquiry about to be inserted. The store assigns the id,
/// the initial `new` status, and `created_at`.
#[derive(Debug, Clone)]
pub struct NewEnquiry {
    pub owner_user_id: String,
    pub client_name: String,
    pub client_email: String,
    pub title: String,
    pub raw_body: String,
    pub event_date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub phone: Option<String>,
    pub source: EnquirySource,
    /// Sender address could not be resolved from the payload.
    pub low_confidence: bool,
    /// JSON audit copy of the raw webhook payload, if configured.
    pub raw_payload: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// A persisted enquiry row.
#[derive(Debug, Clone, Serialize)]
pub struct Enquiry {
    pub id: Uuid,
    pub owner_user_id: String,
    pub client_name: String,
    pub client_email: String,
    pub title: String,
    pub raw_body: String,
    pub event_date: Option<NaiveDate>,
    pub venue: Option<String>,
    pub phone: Option<String>,
    pub source: EnquirySource,
    pub status: EnquiryStatus,
    pub dedup_key: String,
    pub low_confidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of an insert-if-new attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertOutcome {
    /// True when this call created the row; false when the dedup key
    /// already existed.
    pub created: bool,
    /// Id of the row owning the dedup key (new or pre-existing).
    pub id: Uuid,
}

/// Backend-agnostic persistence interface for enquiries.
#[async_trait]
pub trait EnquiryStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert an enquiry unless its dedup key is already present.
    ///
    /// The check and the insert are a single atomic step backed by a
    /// UNIQUE constraint, so concurrent duplicate deliveries cannot both
    /// create a row. A uniqueness violation is not an error: it returns
    /// `created: false` with the existing row's id.
    async fn insert_enquiry_if_new(
        &self,
        dedup_key: &str,
        enquiry: &NewEnquiry,
    ) -> Result<InsertOutcome, DatabaseError>;

    /// Get an enquiry by id.
    async fn get_enquiry(&self, id: Uuid) -> Result<Option<Enquiry>, DatabaseError>;

    /// Get an enquiry by its dedup key.
    async fn get_enquiry_by_dedup_key(
        &self,
        dedup_key: &str,
    ) -> Result<Option<Enquiry>, DatabaseError>;

    /// List enquiries, newest first, optionally filtered by owner.
    async fn list_enquiries(
        &self,
        owner_user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Enquiry>, DatabaseError>;

    /// Total number of enquiry rows.
    async fn count_enquiries(&self) -> Result<u64, DatabaseError>;
}
