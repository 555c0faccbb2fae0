//! Pre-persistence discard rules.
//!
//! Runs after normalization and before the dedup gate to drop messages
//! that must never become enquiries:
//! - mailer-daemon/postmaster senders (bounce loops)
//! - auto-submitted replies (out-of-office and friends)
//! - the sample payloads vendor dashboards send when a route is saved
//!
//! Dropped messages are still acknowledged with HTTP 200 so the vendor
//! does not retry. Rules never fire on mere field absence; an empty
//! payload still becomes a (low-confidence) enquiry.

use regex::Regex;
use tracing::debug;

use crate::ingest::types::NormalizedMessage;

/// Which message field a rule matches against.
#[derive(Debug, Clone)]
pub enum RuleField {
    Sender,
    Subject,
    Body,
}

/// A single discard rule with a compiled regex.
#[derive(Debug, Clone)]
pub struct DiscardRule {
    /// Human-readable pattern description.
    pub pattern: String,
    /// Compiled regex for matching.
    pub regex: Regex,
    /// Which message field to match.
    pub field: RuleField,
    /// Why this rule triggers.
    pub reason: String,
}

/// Ordered discard rules; first match wins.
pub struct DiscardRules {
    rules: Vec<DiscardRule>,
}

impl DiscardRules {
    /// Create the rule set with default discard patterns.
    pub fn default_rules() -> Self {
        let rules = vec![
            // Bounce storms: our own acknowledgements can bounce and loop
            DiscardRule {
                pattern: "mailer-daemon".into(),
                regex: Regex::new(r"(?i)^(mailer[\-_]?daemon|postmaster)@").unwrap(),
                field: RuleField::Sender,
                reason: "automated mail system".into(),
            },
            // Auto-submitted replies
            DiscardRule {
                pattern: "auto-reply subject".into(),
                regex: Regex::new(
                    r"(?i)^(automatic reply|auto[\-_ ]?reply|autoreply|out of office)",
                )
                .unwrap(),
                field: RuleField::Subject,
                reason: "auto-reply".into(),
            },
            // Sample payloads sent by vendor dashboards when saving a route
            DiscardRule {
                pattern: "vendor test probe (subject)".into(),
                regex: Regex::new(r"(?i)^test webhook\b").unwrap(),
                field: RuleField::Subject,
                reason: "vendor test message".into(),
            },
            DiscardRule {
                pattern: "vendor test probe (body)".into(),
                regex: Regex::new(r"(?i)\b(sample webhook payload|this is a test webhook)\b")
                    .unwrap(),
                field: RuleField::Body,
                reason: "vendor test message".into(),
            },
        ];

        Self { rules }
    }

    /// Create an empty rule set (for testing).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a custom discard rule.
    pub fn add_rule(
        &mut self,
        pattern: &str,
        field: RuleField,
        reason: &str,
    ) -> Result<(), regex::Error> {
        self.rules.push(DiscardRule {
            pattern: pattern.into(),
            regex: Regex::new(pattern)?,
            field,
            reason: reason.into(),
        });
        Ok(())
    }

    /// Evaluate a message against all rules.
    ///
    /// Returns `Some(reason)` when a rule matches and the message should be
    /// dropped, `None` when it should continue through the pipeline.
    pub fn evaluate(&self, message: &NormalizedMessage) -> Option<String> {
        for rule in &self.rules {
            let field_value = match rule.field {
                RuleField::Sender => {
                    if let Some(ref sender) = message.sender {
                        sender
                    } else {
                        continue;
                    }
                }
                RuleField::Subject => &message.subject,
                RuleField::Body => &message.body,
            };

            if rule.regex.is_match(field_value) {
                debug!(
                    sender = message.sender.as_deref().unwrap_or("-"),
                    rule = %rule.pattern,
                    reason = %rule.reason,
                    "Message matched discard rule"
                );
                return Some(rule.reason.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ingest::types::{BodySource, NO_CONTENT, NO_SUBJECT};

    fn make_message(sender: Option<&str>, subject: &str, body: &str) -> NormalizedMessage {
        NormalizedMessage {
            sender: sender.map(String::from),
            sender_display: None,
            recipient: Some("olivia@sax.example.com".into()),
            subject: subject.into(),
            body: body.into(),
            body_source: BodySource::PlainText,
            vendor_message_id: None,
            received_at: Utc::now(),
            low_confidence: sender.is_none(),
        }
    }

    #[test]
    fn discards_mailer_daemon() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(
            Some("MAILER-DAEMON@mx.example.com"),
            "Undelivered Mail Returned to Sender",
            "The following message could not be delivered.",
        );
        assert_eq!(rules.evaluate(&msg).as_deref(), Some("automated mail system"));
    }

    #[test]
    fn discards_postmaster() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(Some("postmaster@mx.example.com"), "Delivery status", "...");
        assert!(rules.evaluate(&msg).is_some());
    }

    #[test]
    fn discards_out_of_office() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(
            Some("client@example.com"),
            "Automatic reply: Wedding enquiry",
            "I am away until Monday.",
        );
        assert_eq!(rules.evaluate(&msg).as_deref(), Some("auto-reply"));
    }

    #[test]
    fn discards_vendor_probe_subject() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(Some("bob@example.com"), "Test webhook", "...");
        assert_eq!(rules.evaluate(&msg).as_deref(), Some("vendor test message"));
    }

    #[test]
    fn discards_vendor_probe_body() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(
            Some("bob@example.com"),
            "Hello",
            "This is a sample webhook payload for route validation.",
        );
        assert_eq!(rules.evaluate(&msg).as_deref(), Some("vendor test message"));
    }

    #[test]
    fn passes_legitimate_enquiry() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(
            Some("sarah.johnson@example.com"),
            "Wedding enquiry - 15/08/2026",
            "Looking for a saxophonist at The Grand Hotel, call 07123 456789",
        );
        assert!(rules.evaluate(&msg).is_none());
    }

    #[test]
    fn passes_empty_payload_sentinels() {
        // A payload with nothing in it must still become an enquiry, so the
        // sentinel values must not trip any rule.
        let rules = DiscardRules::default_rules();
        let msg = make_message(None, NO_SUBJECT, NO_CONTENT);
        assert!(rules.evaluate(&msg).is_none());
    }

    #[test]
    fn subject_mentioning_test_mid_sentence_passes() {
        let rules = DiscardRules::default_rules();
        let msg = make_message(
            Some("client@example.com"),
            "Sound test webhook question",
            "Do you do sound checks?",
        );
        assert!(rules.evaluate(&msg).is_none());
    }

    #[test]
    fn custom_rule() {
        let mut rules = DiscardRules::empty();
        rules
            .add_rule(r"(?i)@spam\.example\.org$", RuleField::Sender, "blocked domain")
            .unwrap();

        let msg = make_message(Some("anyone@spam.example.org"), "Hi", "Hello");
        assert_eq!(rules.evaluate(&msg).as_deref(), Some("blocked domain"));
    }

    #[test]
    fn empty_rules_pass_everything() {
        let rules = DiscardRules::empty();
        let msg = make_message(Some("MAILER-DAEMON@mx.example.com"), "Bounce", "...");
        assert!(rules.evaluate(&msg).is_none());
    }
}
