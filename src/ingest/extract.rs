//! Heuristic lead extraction from subject and body text.
//!
//! Best-effort only: each field is independently optional and a failed
//! match leaves it unset. Nothing here can fail ingestion. All methods are
//! pure functions of their inputs; the struct just holds compiled regexes.

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::ingest::types::{NormalizedMessage, UNKNOWN};

/// Structured fields pulled out of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub client_name: String,
    pub phone: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub venue: Option<String>,
}

/// Lead extraction engine with pre-compiled patterns.
pub struct LeadExtractor {
    phone_re: Regex,
    iso_date_re: Regex,
    numeric_date_re: Regex,
    day_month_re: Regex,
    month_day_re: Regex,
    venue_label_re: Regex,
    venue_at_re: Regex,
}

impl LeadExtractor {
    pub fn new() -> Self {
        Self {
            // Digit groups with optional +, spaces, hyphens, parens, dots
            phone_re: Regex::new(r"\+?\(?\d[\d\s\-().]{4,24}\d").unwrap(),
            iso_date_re: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap(),
            numeric_date_re: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{2,4})\b").unwrap(),
            day_month_re: Regex::new(
                r"\b(\d{1,2})(?:st|nd|rd|th)?\s+(?:of\s+)?([A-Za-z]{3,9})\.?,?\s*(\d{4})?",
            )
            .unwrap(),
            // The \b after the day keeps a bare "August 2026" from reading
            // as August 20th
            month_day_re: Regex::new(
                r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?\b(?:\s*,?\s*(\d{4}))?",
            )
            .unwrap(),
            venue_label_re: Regex::new(r"(?i)\bvenue\s*[:\-]\s*([^\n,.;!?]+)").unwrap(),
            venue_at_re: Regex::new(
                r"\b(?i:at)[ \t]+([A-Z][A-Za-z']*(?:[ \t]+(?:[A-Z][A-Za-z']*|of|the|and))*)",
            )
            .unwrap(),
        }
    }

    /// Run every heuristic over one message.
    ///
    /// `today` anchors year resolution for dates written without one.
    pub fn extract(&self, message: &NormalizedMessage, today: NaiveDate) -> Lead {
        Lead {
            client_name: self.client_name(message),
            phone: self.phone(&message.body),
            event_date: self
                .event_date(&message.subject, today)
                .or_else(|| self.event_date(&message.body, today)),
            venue: self.venue(&message.body),
        }
    }

    /// Display name, else the local part of the sender address, else "unknown".
    pub fn client_name(&self, message: &NormalizedMessage) -> String {
        if let Some(display) = &message.sender_display {
            let display = display.trim();
            if !display.is_empty() {
                return display.to_string();
            }
        }
        if let Some(sender) = &message.sender {
            if let Some(local) = sender.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
        UNKNOWN.to_string()
    }

    /// First digit group that normalizes to 7-15 digits.
    ///
    /// Returned digits-only, with a leading `+` kept when present.
    pub fn phone(&self, body: &str) -> Option<String> {
        for m in self.phone_re.find_iter(body) {
            let raw = m.as_str();
            let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
            if (7..=15).contains(&digits.len()) {
                if raw.starts_with('+') {
                    return Some(format!("+{digits}"));
                }
                return Some(digits);
            }
        }
        None
    }

    /// Earliest recognizable date in the text.
    ///
    /// All patterns compete on position: whichever form appears first in
    /// the text wins, regardless of which pattern matched it. Numeric
    /// dates are always day-first (`15/08/2026`); month-name forms accept
    /// both `15 August 2026` and `Aug 15th 2026`. A missing year resolves
    /// to the next occurrence of that day relative to `today`.
    pub fn event_date(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let candidates = [
            self.first_iso_date(text),
            self.first_numeric_date(text),
            self.first_day_month_date(text, today),
            self.first_month_day_date(text, today),
        ];
        candidates
            .into_iter()
            .flatten()
            .min_by_key(|(at, _)| *at)
            .map(|(_, date)| date)
    }

    /// First valid `YYYY-MM-DD` in the text, with its byte offset.
    fn first_iso_date(&self, text: &str) -> Option<(usize, NaiveDate)> {
        for caps in self.iso_date_re.captures_iter(text) {
            let at = caps.get(0)?.start();
            let (y, m, d) = (num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)?);
            if let Some(date) = NaiveDate::from_ymd_opt(y as i32, m, d) {
                return Some((at, date));
            }
        }
        None
    }

    /// First valid `DD/MM/YYYY` in the text, with its byte offset.
    fn first_numeric_date(&self, text: &str) -> Option<(usize, NaiveDate)> {
        for caps in self.numeric_date_re.captures_iter(text) {
            let at = caps.get(0)?.start();
            let (d, m, y) = (num(&caps, 1)?, num(&caps, 2)?, num(&caps, 3)?);
            let year = if y < 100 { 2000 + y } else { y };
            if let Some(date) = NaiveDate::from_ymd_opt(year as i32, m, d) {
                return Some((at, date));
            }
        }
        None
    }

    /// First valid `15 August 2026` form, with its byte offset.
    fn first_day_month_date(&self, text: &str, today: NaiveDate) -> Option<(usize, NaiveDate)> {
        for caps in self.day_month_re.captures_iter(text) {
            let at = caps.get(0)?.start();
            let day = num(&caps, 1)?;
            let Some(month) = caps.get(2).and_then(|m| month_from_name(m.as_str())) else {
                continue;
            };
            let year = caps.get(3).and_then(|y| y.as_str().parse::<u32>().ok());
            if let Some(date) = build_date(day, month, year, today) {
                return Some((at, date));
            }
        }
        None
    }

    /// First valid `Aug 15th 2026` form, with its byte offset.
    fn first_month_day_date(&self, text: &str, today: NaiveDate) -> Option<(usize, NaiveDate)> {
        for caps in self.month_day_re.captures_iter(text) {
            let at = caps.get(0)?.start();
            let Some(month) = caps.get(1).and_then(|m| month_from_name(m.as_str())) else {
                continue;
            };
            let day = num(&caps, 2)?;
            let year = caps.get(3).and_then(|y| y.as_str().parse::<u32>().ok());
            if let Some(date) = build_date(day, month, year, today) {
                return Some((at, date));
            }
        }
        None
    }

    /// Phrase after a `venue:` label or an `at <Capitalized …>` cue.
    pub fn venue(&self, body: &str) -> Option<String> {
        if let Some(caps) = self.venue_label_re.captures(body) {
            let venue = caps.get(1)?.as_str().trim();
            if !venue.is_empty() {
                return Some(venue.to_string());
            }
        }
        if let Some(caps) = self.venue_at_re.captures(body) {
            let mut words: Vec<&str> = caps.get(1)?.as_str().split_whitespace().collect();
            // Drop connectives the run picked up on its way out
            while matches!(words.last(), Some(&"of") | Some(&"the") | Some(&"and")) {
                words.pop();
            }
            if !words.is_empty() {
                return Some(words.join(" "));
            }
        }
        None
    }
}

impl Default for LeadExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn num(caps: &regex::Captures<'_>, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

fn month_from_name(name: &str) -> Option<u32> {
    const MONTHS: [(&str, &str); 12] = [
        ("jan", "january"),
        ("feb", "february"),
        ("mar", "march"),
        ("apr", "april"),
        ("may", "may"),
        ("jun", "june"),
        ("jul", "july"),
        ("aug", "august"),
        ("sep", "september"),
        ("oct", "october"),
        ("nov", "november"),
        ("dec", "december"),
    ];
    let lower = name.to_ascii_lowercase();
    for (i, (abbrev, full)) in MONTHS.iter().enumerate() {
        if lower == *abbrev || lower == *full || (lower == "sept" && *abbrev == "sep") {
            return Some(i as u32 + 1);
        }
    }
    None
}

/// Build a date, resolving a missing year to the next occurrence of the day.
fn build_date(day: u32, month: u32, year: Option<u32>, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(y) => NaiveDate::from_ymd_opt(y as i32, month, day),
        None => match NaiveDate::from_ymd_opt(today.year(), month, day) {
            Some(date) if date >= today => Some(date),
            _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::ingest::types::BodySource;

    fn extractor() -> LeadExtractor {
        LeadExtractor::new()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn make_message(
        sender: Option<&str>,
        display: Option<&str>,
        subject: &str,
        body: &str,
    ) -> NormalizedMessage {
        NormalizedMessage {
            sender: sender.map(String::from),
            sender_display: display.map(String::from),
            recipient: None,
            subject: subject.into(),
            body: body.into(),
            body_source: BodySource::PlainText,
            vendor_message_id: None,
            received_at: Utc::now(),
            low_confidence: sender.is_none(),
        }
    }

    // ── Client name ─────────────────────────────────────────────────

    #[test]
    fn name_prefers_display() {
        let msg = make_message(Some("sj@example.com"), Some("Sarah Johnson"), "", "");
        assert_eq!(extractor().client_name(&msg), "Sarah Johnson");
    }

    #[test]
    fn name_falls_back_to_local_part() {
        let msg = make_message(Some("sarah.johnson@example.com"), None, "", "");
        assert_eq!(extractor().client_name(&msg), "sarah.johnson");
    }

    #[test]
    fn name_unknown_when_no_sender() {
        let msg = make_message(None, None, "", "");
        assert_eq!(extractor().client_name(&msg), "unknown");
    }

    // ── Phone ───────────────────────────────────────────────────────

    #[test]
    fn phone_uk_mobile_with_space() {
        assert_eq!(
            extractor().phone("call 07123 456789 thanks").as_deref(),
            Some("07123456789")
        );
    }

    #[test]
    fn phone_international_keeps_plus() {
        assert_eq!(
            extractor().phone("reach me on +44 7123 456-789").as_deref(),
            Some("+447123456789")
        );
    }

    #[test]
    fn phone_parenthesized_area_code() {
        assert_eq!(
            extractor().phone("office (0121) 496 0000").as_deref(),
            Some("01214960000")
        );
    }

    #[test]
    fn phone_too_short_rejected() {
        assert_eq!(extractor().phone("extension 123456"), None);
    }

    #[test]
    fn phone_too_long_rejected() {
        assert_eq!(extractor().phone("ref 12345678901234567890"), None);
    }

    #[test]
    fn phone_ignores_slashed_dates() {
        assert_eq!(extractor().phone("the wedding is 15/08/2026"), None);
    }

    #[test]
    fn phone_first_of_two_wins() {
        assert_eq!(
            extractor()
                .phone("call 07123 456789 or 07999 888777")
                .as_deref(),
            Some("07123456789")
        );
    }

    // ── Event date ──────────────────────────────────────────────────

    #[test]
    fn date_iso() {
        assert_eq!(
            extractor().event_date("free on 2026-08-15?", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
    }

    #[test]
    fn date_numeric_is_day_first() {
        assert_eq!(
            extractor().event_date("Wedding enquiry - 15/08/2026", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
        // Ambiguous forms are read day-first too, never month-first
        assert_eq!(
            extractor().event_date("party on 04/05/2026", today()),
            NaiveDate::from_ymd_opt(2026, 5, 4)
        );
    }

    #[test]
    fn date_two_digit_year() {
        assert_eq!(
            extractor().event_date("booked for 15/08/26", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
    }

    #[test]
    fn date_day_then_month_name() {
        assert_eq!(
            extractor().event_date("ceremony on 15 August 2026", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
        assert_eq!(
            extractor().event_date("the 3rd of June 2027", today()),
            NaiveDate::from_ymd_opt(2027, 6, 3)
        );
    }

    #[test]
    fn date_month_name_then_day() {
        assert_eq!(
            extractor().event_date("Aug 15th 2026 works for us", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
    }

    #[test]
    fn date_missing_year_resolves_forward() {
        // today() is 2026-03-01: August is still ahead this year
        assert_eq!(
            extractor().event_date("thinking August 15", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
        // January has already passed, so next year
        assert_eq!(
            extractor().event_date("thinking January 10", today()),
            NaiveDate::from_ymd_opt(2027, 1, 10)
        );
    }

    #[test]
    fn date_invalid_calendar_date_skipped() {
        assert_eq!(extractor().event_date("maybe 31/02/2026", today()), None);
        // A later valid date still gets picked up
        assert_eq!(
            extractor().event_date("maybe 31/02/2026 or 01/03/2026", today()),
            NaiveDate::from_ymd_opt(2026, 3, 1)
        );
    }

    #[test]
    fn date_month_with_year_only_is_not_a_day() {
        assert_eq!(
            extractor().event_date("thinking about August 2026", today()),
            None
        );
        // A month-plus-year mention must not shadow a real date further on
        assert_eq!(
            extractor().event_date("free in August 2026, proposing 15/08/2026", today()),
            NaiveDate::from_ymd_opt(2026, 8, 15)
        );
        // US-style day-with-comma still parses
        assert_eq!(
            extractor().event_date("ceremony August 20, 2026", today()),
            NaiveDate::from_ymd_opt(2026, 8, 20)
        );
    }

    #[test]
    fn date_earliest_match_wins_across_formats() {
        // An earlier numeric date beats a later ISO one
        assert_eq!(
            extractor().event_date(
                "we met on 12/05/2025 and the wedding is 2026-08-15",
                today()
            ),
            NaiveDate::from_ymd_opt(2025, 5, 12)
        );
        // And the other way round
        assert_eq!(
            extractor().event_date("free from 2026-06-01, party on 15/08/2026", today()),
            NaiveDate::from_ymd_opt(2026, 6, 1)
        );
    }

    #[test]
    fn date_random_word_is_not_a_month() {
        assert_eq!(extractor().event_date("meet 15 Martin Street", today()), None);
        assert_eq!(extractor().event_date("about 15 minutes", today()), None);
    }

    #[test]
    fn date_none_when_absent() {
        assert_eq!(extractor().event_date("no dates here", today()), None);
    }

    // ── Venue ───────────────────────────────────────────────────────

    #[test]
    fn venue_after_at_cue() {
        assert_eq!(
            extractor()
                .venue("Looking for a saxophonist at The Grand Hotel, call 07123 456789")
                .as_deref(),
            Some("The Grand Hotel")
        );
    }

    #[test]
    fn venue_label_form() {
        assert_eq!(
            extractor().venue("Venue: Kew Gardens\nGuests: 80").as_deref(),
            Some("Kew Gardens")
        );
    }

    #[test]
    fn venue_keeps_connectives_inside() {
        assert_eq!(
            extractor().venue("reception at House of Commons afterwards").as_deref(),
            Some("House of Commons")
        );
    }

    #[test]
    fn venue_trailing_connective_trimmed() {
        assert_eq!(
            extractor().venue("drinks at Kew Gardens and then dinner").as_deref(),
            Some("Kew Gardens")
        );
    }

    #[test]
    fn venue_requires_capitalized_phrase() {
        assert_eq!(extractor().venue("we met at the park yesterday"), None);
    }

    #[test]
    fn venue_none_when_no_cue() {
        assert_eq!(extractor().venue("just a general question"), None);
    }

    // ── Full extraction ─────────────────────────────────────────────

    #[test]
    fn extract_wedding_enquiry_end_to_end() {
        let msg = make_message(
            Some("sarah.johnson@example.com"),
            None,
            "Wedding enquiry - 15/08/2026",
            "Looking for a saxophonist at The Grand Hotel, call 07123 456789",
        );
        let lead = extractor().extract(&msg, today());

        assert_eq!(lead.client_name, "sarah.johnson");
        assert_eq!(lead.phone.as_deref(), Some("07123456789"));
        assert_eq!(lead.event_date, NaiveDate::from_ymd_opt(2026, 8, 15));
        assert!(lead.venue.as_deref().unwrap().contains("The Grand Hotel"));
    }

    #[test]
    fn extract_subject_date_beats_body_date() {
        let msg = make_message(
            Some("a@b.com"),
            None,
            "Party 01/06/2026",
            "we last spoke on 02/01/2026 about this",
        );
        let lead = extractor().extract(&msg, today());
        assert_eq!(lead.event_date, NaiveDate::from_ymd_opt(2026, 6, 1));
    }

    #[test]
    fn extract_all_optional_fields_absent() {
        let msg = make_message(Some("a@b.com"), None, "Hello", "general availability question");
        let lead = extractor().extract(&msg, today());
        assert_eq!(lead.phone, None);
        assert_eq!(lead.event_date, None);
        assert_eq!(lead.venue, None);
    }
}
