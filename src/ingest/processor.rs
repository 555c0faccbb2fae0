//! Ingest processor — runs one webhook delivery through the full pipeline.
//!
//! **Core invariant: one enquiry per logical inbound email.**
//! Vendor retries are absorbed by the dedup gate; unroutable recipients go
//! to the fallback owner instead of the floor.
//!
//! Flow:
//! 1. Normalize vendor fields → `NormalizedMessage`
//! 2. Discard rules (bounces, auto-replies, vendor probes)
//! 3. Owner routing via the tenant directory
//! 4. Lead extraction (name, phone, date, venue)
//! 5. Dedup-gated insert

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::config::TenantDirectory;
use crate::error::Error;
use crate::ingest::dedup;
use crate::ingest::extract::LeadExtractor;
use crate::ingest::normalize;
use crate::ingest::rules::DiscardRules;
use crate::ingest::types::{IngestOutcome, UNKNOWN};
use crate::store::traits::{EnquirySource, EnquiryStore, NewEnquiry};

/// Ingest processor — turns decoded webhook fields into enquiries.
pub struct IngestProcessor {
    store: Arc<dyn EnquiryStore>,
    tenants: TenantDirectory,
    rules: DiscardRules,
    extractor: LeadExtractor,
    store_raw_payload: bool,
}

impl IngestProcessor {
    /// Create a new ingest processor with the default discard rules.
    pub fn new(
        store: Arc<dyn EnquiryStore>,
        tenants: TenantDirectory,
        store_raw_payload: bool,
    ) -> Self {
        Self {
            store,
            tenants,
            rules: DiscardRules::default_rules(),
            extractor: LeadExtractor::new(),
            store_raw_payload,
        }
    }

    /// Replace the discard rules (for testing).
    pub fn with_rules(mut self, rules: DiscardRules) -> Self {
        self.rules = rules;
        self
    }

    /// Process one decoded webhook delivery.
    ///
    /// Never errors on message content; the only `Err` here is a store
    /// failure, which the HTTP layer reports in-body with status 200.
    pub async fn process(&self, fields: &BTreeMap<String, String>) -> Result<IngestOutcome, Error> {
        // Step 1: Normalize
        let message = normalize::normalize(fields, Utc::now());
        info!(
            sender = message.sender.as_deref().unwrap_or("-"),
            subject = %message.subject,
            body_source = ?message.body_source,
            "Processing inbound email"
        );

        // Step 2: Discard rules
        if let Some(reason) = self.rules.evaluate(&message) {
            info!(reason = %reason, "Inbound email discarded");
            return Ok(IngestOutcome::Discarded { reason });
        }

        // Step 3: Owner routing
        let owner = self
            .tenants
            .resolve_owner(message.recipient.as_deref())
            .to_string();
        debug!(
            owner = %owner,
            recipient = message.recipient.as_deref().unwrap_or("-"),
            "Resolved owning user"
        );

        // Step 4: Lead extraction
        let today = Utc::now().date_naive();
        let lead = self.extractor.extract(&message, today);

        // Step 5: Dedup-gated insert
        let dedup_key = dedup::dedup_key(&owner, &message);
        let raw_payload = if self.store_raw_payload {
            serde_json::to_string(fields).ok()
        } else {
            None
        };

        let enquiry = NewEnquiry {
            owner_user_id: owner.clone(),
            client_name: lead.client_name,
            client_email: message
                .sender
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            title: message.subject.clone(),
            raw_body: message.body.clone(),
            event_date: lead.event_date,
            venue: lead.venue,
            phone: lead.phone,
            source: EnquirySource::Email,
            low_confidence: message.low_confidence,
            raw_payload,
            received_at: message.received_at,
        };

        let outcome = self.store.insert_enquiry_if_new(&dedup_key, &enquiry).await?;

        if outcome.created {
            info!(
                enquiry_id = %outcome.id,
                owner = %owner,
                low_confidence = message.low_confidence,
                "Enquiry created"
            );
            Ok(IngestOutcome::Created { id: outcome.id })
        } else {
            info!(enquiry_id = %outcome.id, "Duplicate delivery suppressed");
            Ok(IngestOutcome::Duplicate { id: outcome.id })
        }
    }
}
