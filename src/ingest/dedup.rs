//! Dedup key construction.
//!
//! Inbound relays deliver at-least-once: timeouts, duplicate route matches
//! and provider-side retries all hand us the same email again. Every
//! delivery maps to a key; the store's UNIQUE constraint on that key is
//! what actually enforces once-only creation (see the store layer).
//!
//! Keys are scoped per owning user, so one email delivered to two tenants
//! creates one enquiry each.

use sha2::{Digest, Sha256};

use crate::ingest::types::NormalizedMessage;

/// How much body text feeds the content fingerprint.
const FINGERPRINT_BODY_CHARS: usize = 256;

/// Build the dedup key for a message routed to `owner_user_id`.
///
/// The vendor message id is preferred; messages without one fall back to a
/// content fingerprint, so retries that omit the id still dedup.
pub fn dedup_key(owner_user_id: &str, message: &NormalizedMessage) -> String {
    match &message.vendor_message_id {
        Some(id) => format!("{owner_user_id}|msg:{id}"),
        None => format!("{owner_user_id}|fp:{}", fingerprint(message)),
    }
}

/// SHA-256 over sender, recipient, subject, a body prefix and the minute
/// bucket of the receive time. The minute truncation absorbs retry timing
/// jitter while keeping distinct emails sent further apart distinct.
fn fingerprint(message: &NormalizedMessage) -> String {
    let body_prefix: String = message.body.chars().take(FINGERPRINT_BODY_CHARS).collect();
    let minute_bucket = message.received_at.format("%Y-%m-%dT%H:%M").to_string();

    let mut hasher = Sha256::new();
    hasher.update(message.sender.as_deref().unwrap_or(""));
    hasher.update(b"\n");
    hasher.update(message.recipient.as_deref().unwrap_or(""));
    hasher.update(b"\n");
    hasher.update(&message.subject);
    hasher.update(b"\n");
    hasher.update(&body_prefix);
    hasher.update(b"\n");
    hasher.update(&minute_bucket);
    format!("{:x}", hasher.finalize())
}
