use std::fmt;

use serde::{Deserialize, Serialize};

/// Tag key carrying the partner sub-affiliate identifier.
pub const CLIENT_ID_TAG: &str = "client_id";

/// A payout amount in currency minor units, kept as the upstream number so that
/// conversion to a decimal amount never rounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PayoutCents(serde_json::Number);

impl PayoutCents {
    /// Render the amount in major units: the cent value divided by 100, without
    /// trailing zeros. `8480` becomes `84.8` and `85` becomes `0.85`.
    pub fn to_amount(&self) -> String {
        let integral = self
            .0
            .as_i64()
            .map(i128::from)
            .or_else(|| self.0.as_u64().map(i128::from));

        match (integral, self.0.as_f64()) {
            (Some(cents), _) => format_minor_units(cents),
            (None, Some(cents)) => format!("{}", cents / 100.0),
            (None, None) => self.0.to_string(),
        }
    }
}

impl From<i64> for PayoutCents {
    fn from(cents: i64) -> Self {
        PayoutCents(serde_json::Number::from(cents))
    }
}

impl fmt::Display for PayoutCents {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn format_minor_units(cents: i128) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let (whole, fraction) = (cents / 100, cents % 100);

    match fraction {
        0 => format!("{sign}{whole}"),
        f if f % 10 == 0 => format!("{sign}{whole}.{}", f / 10),
        f => format!("{sign}{whole}.{f:02}"),
    }
}

/// One key/value entry of an event's client tag collection.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientTag {
    pub key: String,
    pub value: serde_json::Value,
}

impl ClientTag {
    /// Tag values are normally strings, but numbers are accepted and rendered verbatim.
    pub fn value_as_string(&self) -> Option<String> {
        match &self.value {
            serde_json::Value::String(s) => Some(s.to_owned()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// A billable lead event as returned by the lead payouts endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    pub payout_in_cents: PayoutCents,
    pub lead_uuid: String,
    /// Only present when requested with `showClientTags=true`.
    #[serde(default)]
    pub client_tag_json: Option<Vec<ClientTag>>,
}

impl LeadEvent {
    pub fn client_tag(&self, key: &str) -> Option<&ClientTag> {
        self.client_tag_json
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|tag| tag.key == key)
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_tag(CLIENT_ID_TAG)
            .and_then(ClientTag::value_as_string)
    }
}

/// Body of a successful lead payouts response. Events are kept raw so that skipped
/// events can be logged exactly as they were received.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadPayoutsPage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub next_url: Option<String>,
}

/// One entry of the error array returned alongside a 422.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// The three values a postback needs from a lead event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExtractedRecord {
    pub payout_in_cents: PayoutCents,
    pub lead_uuid: String,
    pub client_id: String,
}

impl ExtractedRecord {
    pub fn new(
        payout_in_cents: impl Into<PayoutCents>,
        lead_uuid: &str,
        client_id: &str,
    ) -> Self {
        Self {
            payout_in_cents: payout_in_cents.into(),
            lead_uuid: lead_uuid.to_owned(),
            client_id: client_id.to_owned(),
        }
    }
}
