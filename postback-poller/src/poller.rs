use std::time;

use chrono::{DateTime, Duration as ChronoDuration, SubsecRound, Timelike, Utc};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use postback_common::dedupe::{DedupePolicy, PreviousPage};
use postback_common::dispatch::PostbackOutcome;
use postback_common::event::ApiErrorDetail;
use postback_common::fetch::{log_fetch_error, Cursor, FetchError, FetchOutcome};
use postback_common::health::HealthHandle;
use postback_common::pipeline::Pipeline;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// The cursor for a cycle: `offset_hours` before `now`, truncated to the hour.
pub fn offset_timestamp(now: DateTime<Utc>, offset_hours: u32) -> Option<String> {
    let shifted = now.checked_sub_signed(ChronoDuration::hours(i64::from(offset_hours)))?;
    let hour = shifted
        .with_minute(0)?
        .with_second(0)?
        .with_nanosecond(0)?;

    Some(hour.format(TIMESTAMP_FORMAT).to_string())
}

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("cannot compute a cursor {offset_hours} hours before {now}")]
    CursorOutOfRange {
        now: DateTime<Utc>,
        offset_hours: u32,
    },
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl CycleError {
    pub fn log(&self) {
        match self {
            CycleError::Fetch(e) => log_fetch_error(e),
            other => error!("{}", other),
        }
    }
}

/// Structured summary of one cycle that produced a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub started_at: String,
    pub cursor: String,
    pub fetched: usize,
    pub skipped: usize,
    pub duplicates_dropped: usize,
    pub urls: Vec<String>,
    /// `None` when running dry.
    pub postbacks: Option<Vec<PostbackOutcome>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered(CycleSummary),
    /// Upstream has no events at the cursor yet.
    Exhausted(Vec<ApiErrorDetail>),
}

/// Fetches one page per tick at a fixed offset from the current hour and forwards the records
/// that survive deduplication against the previous tick.
pub struct Poller {
    pipeline: Pipeline,
    offset_hours: u32,
    interval: time::Duration,
    dedupe_policy: DedupePolicy,
    liveness: HealthHandle,
}

impl Poller {
    pub fn new(
        pipeline: Pipeline,
        offset_hours: u32,
        interval: time::Duration,
        dedupe_policy: DedupePolicy,
        liveness: HealthHandle,
    ) -> Self {
        Self {
            pipeline,
            offset_hours,
            interval,
            dedupe_policy,
            liveness,
        }
    }

    /// Run forever. The first cycle starts immediately; a faulted cycle never stops the
    /// next one from being scheduled.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut previous = PreviousPage::default();

        loop {
            interval.tick().await;

            let (result, next) = self.run_cycle(Utc::now(), previous).await;
            previous = next;

            match result {
                Ok(CycleOutcome::Delivered(summary)) => info!(
                    started_at = %summary.started_at,
                    cursor = %summary.cursor,
                    fetched = summary.fetched,
                    skipped = summary.skipped,
                    duplicates_dropped = summary.duplicates_dropped,
                    urls = summary.urls.len(),
                    postbacks = ?summary.postbacks.as_ref().map(Vec::len),
                    "cycle done"
                ),
                Ok(CycleOutcome::Exhausted(details)) => {
                    info!(?details, "no lead payouts available at cursor yet")
                }
                Err(e) => e.log(),
            }

            self.liveness.report_healthy();
            info!(
                "next run in {} minutes",
                self.interval.as_secs_f64() / 60.0
            );
        }
    }

    /// One fetch, extract, dedupe, format and dispatch pass. The state to use for the next
    /// cycle is always returned: `current` when a page was processed, `previous` untouched when
    /// the cycle was abandoned before deduplication.
    pub async fn run_cycle(
        &self,
        now: DateTime<Utc>,
        previous: PreviousPage,
    ) -> (Result<CycleOutcome, CycleError>, PreviousPage) {
        let started_at = now.trunc_subsecs(0).format(TIMESTAMP_FORMAT).to_string();

        let Some(timestamp) = offset_timestamp(now, self.offset_hours) else {
            let e = CycleError::CursorOutOfRange {
                now,
                offset_hours: self.offset_hours,
            };
            return (Err(e), previous);
        };
        let cursor = Cursor::Timestamp(timestamp);
        info!(%started_at, %cursor, "cycle start, attempting request");

        let page = match self.pipeline.fetch(&cursor).await {
            Ok(FetchOutcome::Page(page)) => page,
            Ok(FetchOutcome::Exhausted(details)) => {
                return (Ok(CycleOutcome::Exhausted(details)), previous)
            }
            Err(e) => return (Err(e.into()), previous),
        };

        let batch = self.pipeline.extract(&page);
        let deduplicated = previous.dedupe(batch.records, self.dedupe_policy);
        let delivery = self.pipeline.deliver(&deduplicated.records).await;

        let summary = CycleSummary {
            started_at,
            cursor: cursor.to_string(),
            fetched: page.events.len(),
            skipped: batch.skipped.len(),
            duplicates_dropped: deduplicated.dropped,
            urls: delivery.urls,
            postbacks: delivery.postbacks,
        };

        (Ok(CycleOutcome::Delivered(summary)), deduplicated.previous)
    }
}
