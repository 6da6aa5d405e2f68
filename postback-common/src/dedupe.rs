use std::collections::HashSet;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::event::ExtractedRecord;

/// Which records survive when compared against the previous cycle.
///
/// `KeepPreviouslySeen` is what the poller has always done: after the first cycle a record is
/// only forwarded if the previous cycle also contained it. `DropPreviouslySeen` forwards only
/// records the previous cycle did not contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupePolicy {
    #[default]
    KeepPreviouslySeen,
    DropPreviouslySeen,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("{0} is not a valid dedupe policy")]
pub struct ParseDedupePolicyError(String);

impl FromStr for DedupePolicy {
    type Err = ParseDedupePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_ref() {
            "keep_previously_seen" => Ok(DedupePolicy::KeepPreviouslySeen),
            "drop_previously_seen" => Ok(DedupePolicy::DropPreviouslySeen),
            invalid => Err(ParseDedupePolicyError(invalid.to_owned())),
        }
    }
}

/// The full record set of the most recent cycle. Only one cycle is ever remembered.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreviousPage {
    records: Vec<ExtractedRecord>,
}

/// Result of comparing a page against the previous one. `previous` must be handed to the
/// next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deduplicated {
    pub records: Vec<ExtractedRecord>,
    pub dropped: usize,
    pub previous: PreviousPage,
}

impl PreviousPage {
    pub fn records(&self) -> &[ExtractedRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Filter `current` against this page under `policy`. The returned state always holds
    /// exactly `current`, whatever was kept.
    pub fn dedupe(self, current: Vec<ExtractedRecord>, policy: DedupePolicy) -> Deduplicated {
        if self.records.is_empty() {
            return Deduplicated {
                records: current.clone(),
                dropped: 0,
                previous: PreviousPage { records: current },
            };
        }

        let seen: HashSet<&ExtractedRecord> = self.records.iter().collect();
        let keep_seen = policy == DedupePolicy::KeepPreviouslySeen;

        let records: Vec<ExtractedRecord> = current
            .iter()
            .filter(|record| seen.contains(record) == keep_seen)
            .cloned()
            .collect();
        let dropped = current.len() - records.len();

        info!(dropped, ?policy, "{} duplicate leads skipped", dropped);
        metrics::counter!("lead_payouts_duplicates_dropped").increment(dropped as u64);

        Deduplicated {
            records,
            dropped,
            previous: PreviousPage { records: current },
        }
    }
}

impl From<Vec<ExtractedRecord>> for PreviousPage {
    fn from(records: Vec<ExtractedRecord>) -> Self {
        Self { records }
    }
}
