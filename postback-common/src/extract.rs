use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::event::{ExtractedRecord, LeadEvent, PayoutCents};

/// How strictly lead events are vetted before a postback is built for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPolicy {
    /// Only a `client_id` tag is required.
    Lenient,
    /// The `client_id` must also start with an integer, so placeholder subids such as
    /// `[[SUBID]]` never reach the postback receiver.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Undecodable,
    MissingClientId,
    NonNumericClientId,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Undecodable => "undecodable",
            SkipReason::MissingClientId => "missing_client_id",
            SkipReason::NonNumericClientId => "non_numeric_client_id",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event left out of a batch, with whatever could be read from it and the event as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEvent {
    pub reason: SkipReason,
    pub payout_in_cents: Option<PayoutCents>,
    pub lead_uuid: Option<String>,
    pub client_id: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Accepted(ExtractedRecord),
    Skipped(SkippedEvent),
}

/// Pull payout, lead uuid and client id out of a single raw event.
pub fn extract(raw: &serde_json::Value, policy: ExtractionPolicy) -> Extraction {
    let event: LeadEvent = match serde_json::from_value(raw.clone()) {
        Ok(event) => event,
        Err(e) => {
            debug!("failed to decode lead event: {}", e);
            return Extraction::Skipped(SkippedEvent {
                reason: SkipReason::Undecodable,
                payout_in_cents: None,
                lead_uuid: None,
                client_id: None,
                raw: raw.clone(),
            });
        }
    };

    let skip = |reason: SkipReason, client_id: Option<String>| {
        Extraction::Skipped(SkippedEvent {
            reason,
            payout_in_cents: Some(event.payout_in_cents.clone()),
            lead_uuid: Some(event.lead_uuid.clone()),
            client_id,
            raw: raw.clone(),
        })
    };

    let Some(client_id) = event.client_id() else {
        return skip(SkipReason::MissingClientId, None);
    };

    if policy == ExtractionPolicy::Strict && !has_integer_prefix(&client_id) {
        return skip(SkipReason::NonNumericClientId, Some(client_id));
    }

    Extraction::Accepted(ExtractedRecord {
        payout_in_cents: event.payout_in_cents,
        lead_uuid: event.lead_uuid,
        client_id,
    })
}

/// Records accepted from one page, in page order, and the events that were left out.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExtractedBatch {
    pub records: Vec<ExtractedRecord>,
    pub skipped: Vec<SkippedEvent>,
}

impl ExtractedBatch {
    /// Number of skipped events per reason, in order of first appearance.
    pub fn skip_counts(&self) -> Vec<(SkipReason, usize)> {
        let mut counts: Vec<(SkipReason, usize)> = Vec::new();
        for skipped in &self.skipped {
            match counts.iter_mut().find(|(reason, _)| *reason == skipped.reason) {
                Some((_, count)) => *count += 1,
                None => counts.push((skipped.reason, 1)),
            }
        }
        counts
    }
}

pub fn extract_batch(events: &[serde_json::Value], policy: ExtractionPolicy) -> ExtractedBatch {
    let mut batch = ExtractedBatch::default();

    for raw in events {
        match extract(raw, policy) {
            Extraction::Accepted(record) => batch.records.push(record),
            Extraction::Skipped(skipped) => {
                metrics::counter!(
                    "lead_payouts_events_skipped",
                    &[("reason", skipped.reason.as_str())]
                )
                .increment(1);
                batch.skipped.push(skipped);
            }
        }
    }

    if !batch.skipped.is_empty() {
        let reasons = batch
            .skip_counts()
            .iter()
            .map(|(reason, count)| format!("{reason}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            skipped = batch.skipped.len(),
            events = ?batch.skipped,
            "{} lead events skipped ({})",
            batch.skipped.len(),
            reasons
        );
    }

    batch
}

/// True when the value starts with an integer once leading whitespace is ignored:
/// an optional sign followed by at least one ASCII digit. Anything may follow the digits.
pub fn has_integer_prefix(value: &str) -> bool {
    let trimmed = value.trim_start();
    let unsigned = trimmed
        .strip_prefix(['+', '-'])
        .unwrap_or(trimmed);

    unsigned
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}
