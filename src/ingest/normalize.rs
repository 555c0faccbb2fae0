//! Field normalization — vendor payload to `NormalizedMessage`.
//!
//! Inbound relay vendors disagree on field names for the same logical
//! field, and sometimes between their own API versions. Each logical field
//! therefore resolves through an ordered alias list: exact key match first,
//! then case-insensitive, first non-empty value wins.
//!
//! Normalization is total. A missing field becomes a sentinel or `None`,
//! never an error; the only hard rejection happens earlier, when the HTTP
//! body cannot be decoded at all. Pure transformation, no I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::ingest::types::{BodySource, NormalizedMessage, NO_CONTENT, NO_SUBJECT};

// ── Alias tables ────────────────────────────────────────────────────

const SENDER_ALIASES: &[&str] = &["sender", "from", "From", "From-Address"];
const RECIPIENT_ALIASES: &[&str] = &["recipient", "to", "To", "envelope-to"];
const SUBJECT_ALIASES: &[&str] = &["subject", "Subject"];
const BODY_TEXT_ALIASES: &[&str] = &["body-plain", "text", "stripped-text", "body_plain", "plain"];
const BODY_HTML_ALIASES: &[&str] = &["body-html", "html", "stripped-html", "body_html"];
const MESSAGE_ID_ALIASES: &[&str] = &["Message-Id", "message-id", "Message-ID", "message_id"];
const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "Date", "date"];

/// Resolve a logical field through its alias list.
///
/// Two passes: exact key match in alias order, then case-insensitive match
/// in alias order. An alias present with an empty value is skipped.
fn first_non_empty<'a>(fields: &'a BTreeMap<String, String>, aliases: &[&str]) -> Option<&'a str> {
    for alias in aliases {
        if let Some(value) = fields.get(*alias) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    for alias in aliases {
        for (key, value) in fields {
            if key.eq_ignore_ascii_case(alias) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Build a `NormalizedMessage` from decoded vendor fields.
///
/// `now` is the ingestion clock, used when the vendor omits a timestamp.
pub fn normalize(fields: &BTreeMap<String, String>, now: DateTime<Utc>) -> NormalizedMessage {
    let (sender, sender_display) = match first_non_empty(fields, SENDER_ALIASES) {
        Some(raw) => parse_address(raw),
        None => (None, None),
    };

    let recipient = first_non_empty(fields, RECIPIENT_ALIASES).and_then(|raw| parse_address(raw).0);

    let subject = first_non_empty(fields, SUBJECT_ALIASES)
        .unwrap_or(NO_SUBJECT)
        .to_string();

    let (body, body_source) = resolve_body(fields);

    let vendor_message_id =
        first_non_empty(fields, MESSAGE_ID_ALIASES).and_then(clean_message_id);

    let received_at = first_non_empty(fields, TIMESTAMP_ALIASES)
        .and_then(parse_timestamp)
        .unwrap_or(now);

    let low_confidence = sender.is_none();

    NormalizedMessage {
        sender,
        sender_display,
        recipient,
        subject,
        body,
        body_source,
        vendor_message_id,
        received_at,
        low_confidence,
    }
}

/// Prefer a plain-text body field; fall back to stripped HTML; else sentinel.
fn resolve_body(fields: &BTreeMap<String, String>) -> (String, BodySource) {
    if let Some(text) = first_non_empty(fields, BODY_TEXT_ALIASES) {
        return (text.to_string(), BodySource::PlainText);
    }
    if let Some(html) = first_non_empty(fields, BODY_HTML_ALIASES) {
        let stripped = strip_html(html);
        if !stripped.is_empty() {
            return (stripped, BodySource::StrippedHtml);
        }
    }
    (NO_CONTENT.to_string(), BodySource::Missing)
}

/// Split an address field into (bare address, display name).
///
/// Handles `"Display Name <addr>"`, `Name <addr>` and bare `addr` forms.
fn parse_address(raw: &str) -> (Option<String>, Option<String>) {
    let raw = raw.trim();
    if let Some(open) = raw.find('<') {
        if let Some(close) = raw[open + 1..].find('>') {
            let addr = raw[open + 1..open + 1 + close].trim();
            let display = raw[..open].trim().trim_matches('"').trim();
            let addr = (!addr.is_empty()).then(|| addr.to_string());
            let display = (!display.is_empty()).then(|| display.to_string());
            return (addr, display);
        }
    }
    if raw.is_empty() {
        (None, None)
    } else {
        (Some(raw.to_string()), None)
    }
}

/// Strip `<>` wrappers from a vendor message id.
fn clean_message_id(raw: &str) -> Option<String> {
    let id = raw.trim();
    let id = id.strip_prefix('<').unwrap_or(id);
    let id = id.strip_suffix('>').unwrap_or(id).trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Parse a vendor timestamp: epoch seconds, RFC 3339 or RFC 2822.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0);
    }
    // Some relays send epoch with a fractional part
    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() && secs >= 0.0 {
            return DateTime::from_timestamp(secs.trunc() as i64, 0);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}

// ── HTML stripping ──────────────────────────────────────────────────

/// Reduce an HTML body to plain text.
///
/// Tags are dropped (`script`/`style` lose their contents too), the block
/// tags `br`/`p`/`div`/`tr`/`li` become line breaks, entities are decoded,
/// and whitespace is collapsed per line with blank lines removed.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(lt) = rest.find('<') {
        text.push_str(&rest[..lt]);
        rest = &rest[lt..];

        let Some(gt) = rest.find('>') else {
            // Unterminated tag swallows the remainder
            rest = "";
            break;
        };
        let tag = &rest[1..gt];
        rest = &rest[gt + 1..];

        let name = tag
            .trim_start_matches('/')
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();

        match name.as_str() {
            "script" | "style" if !tag.starts_with('/') => {
                // Drop everything through the matching close tag
                let close = format!("</{name}");
                match rest.to_ascii_lowercase().find(&close) {
                    Some(pos) => {
                        let after = &rest[pos..];
                        rest = match after.find('>') {
                            Some(end) => &after[end + 1..],
                            None => "",
                        };
                    }
                    None => rest = "",
                }
            }
            "br" | "p" | "div" | "tr" | "li" => text.push('\n'),
            _ => {}
        }
    }
    text.push_str(rest);

    let decoded = decode_entities(&text);

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    lines.join("\n")
}

/// Decode the common named entities plus numeric `&#NNN;` / `&#xHH;` forms.
/// Anything unrecognized stays literal.
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let entity_end = match rest.find(';') {
            // Entities are short; a distant ';' means this '&' is literal
            Some(semi) if semi <= 10 => semi,
            _ => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };

        let entity = &rest[1..entity_end];
        let replacement = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => {
                if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };

        match replacement {
            Some(c) => {
                out.push(c);
                rest = &rest[entity_end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
