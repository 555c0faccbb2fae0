//! Shared types for the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used when the vendor omitted the subject.
pub const NO_SUBJECT: &str = "(no subject)";

/// Sentinel used when neither body field carries usable text.
pub const NO_CONTENT: &str = "(no content)";

/// Sentinel for a missing sender address or unresolvable client name.
pub const UNKNOWN: &str = "unknown";

/// Which payload field the normalized body text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySource {
    /// A plain-text field was present.
    PlainText,
    /// No plain text; the HTML field was stripped down to text.
    StrippedHtml,
    /// Neither field present; `body` holds the sentinel.
    Missing,
}

/// Vendor-agnostic projection of an inbound email webhook payload.
///
/// Built once per request by the normalizer. Every field is total: missing
/// vendor data becomes `None` or a sentinel, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMessage {
    /// Bare sender address with any display form stripped.
    pub sender: Option<String>,
    /// Display name when the sender arrived as `"Name <addr>"`.
    pub sender_display: Option<String>,
    /// Bare recipient address, used for owner routing.
    pub recipient: Option<String>,
    /// Subject line, `"(no subject)"` when the vendor omitted it.
    pub subject: String,
    /// Plain-text body, `"(no content)"` when nothing usable arrived.
    pub body: String,
    /// Where the body text came from.
    pub body_source: BodySource,
    /// Vendor message id with `<>` wrappers removed.
    pub vendor_message_id: Option<String>,
    /// Vendor timestamp, else ingestion time.
    pub received_at: DateTime<Utc>,
    /// True when the sender address could not be resolved.
    pub low_confidence: bool,
}

/// What the pipeline did with one webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new enquiry row was created.
    Created { id: Uuid },
    /// The dedup gate matched an existing enquiry; nothing was written.
    Duplicate { id: Uuid },
    /// A discard rule dropped the message before persistence.
    Discarded { reason: String },
}
