//! The stages every cycle goes through, exposed one by one so each orchestrator composes
//! them in its own order: fetch, extract, (dedupe), format and dispatch.
use thiserror::Error;
use tracing::info;

use crate::config::{LeadPayoutsConfig, PostbackConfig};
use crate::dispatch::{PostbackDispatcher, PostbackOutcome};
use crate::event::ExtractedRecord;
use crate::extract::{extract_batch, ExtractedBatch, ExtractionPolicy};
use crate::fetch::{Cursor, FetchError, FetchOutcome, FetchedPage, LeadPayoutsClient};
use crate::postback::PostbackFormatter;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    LeadPayouts(#[from] FetchError),
    #[error("failed to construct postback client: {0}")]
    PostbackClient(#[from] reqwest::Error),
}

/// Whether formatted postbacks are fired or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Fire,
    DryRun,
}

impl DeliveryMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            DeliveryMode::DryRun
        } else {
            DeliveryMode::Fire
        }
    }
}

/// What the format and dispatch stages produced for one batch of records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub urls: Vec<String>,
    /// `None` when running dry.
    pub postbacks: Option<Vec<PostbackOutcome>>,
}

pub struct Pipeline {
    fetcher: LeadPayoutsClient,
    formatter: PostbackFormatter,
    dispatcher: PostbackDispatcher,
    extraction: ExtractionPolicy,
    delivery: DeliveryMode,
}

impl Pipeline {
    pub fn new(
        fetcher: LeadPayoutsClient,
        formatter: PostbackFormatter,
        dispatcher: PostbackDispatcher,
        extraction: ExtractionPolicy,
        delivery: DeliveryMode,
    ) -> Self {
        Self {
            fetcher,
            formatter,
            dispatcher,
            extraction,
            delivery,
        }
    }

    pub fn from_config(
        lead_payouts: &LeadPayoutsConfig,
        postback: &PostbackConfig,
        extraction: ExtractionPolicy,
        delivery: DeliveryMode,
    ) -> Result<Self, SetupError> {
        let fetcher = LeadPayoutsClient::new(
            &lead_payouts.host,
            lead_payouts.bearer_token.as_str(),
            lead_payouts.request_timeout.0,
        )?;
        let dispatcher = PostbackDispatcher::new(postback.request_timeout.0)?;

        Ok(Self::new(
            fetcher,
            PostbackFormatter::new(&postback.base_url),
            dispatcher,
            extraction,
            delivery,
        ))
    }

    pub async fn fetch(&self, cursor: &Cursor) -> Result<FetchOutcome, FetchError> {
        let outcome = self.fetcher.fetch_page(cursor).await?;
        info!("request done");
        Ok(outcome)
    }

    pub fn extract(&self, page: &FetchedPage) -> ExtractedBatch {
        extract_batch(&page.events, self.extraction)
    }

    /// Format `records` into postback URLs and, unless running dry, fire them in order.
    pub async fn deliver(&self, records: &[ExtractedRecord]) -> Delivery {
        let urls = self.formatter.format_all(records);
        info!(urls = ?urls, "parse done, {} postback urls formatted", urls.len());

        let postbacks = match self.delivery {
            DeliveryMode::DryRun => {
                info!("dry run, {} postbacks not sent", urls.len());
                None
            }
            DeliveryMode::Fire => {
                let outcomes = self.dispatcher.dispatch(&urls).await;
                info!(
                    postbacks = ?outcomes,
                    "postback done, {} of {} postbacks sent",
                    outcomes.len(),
                    urls.len()
                );
                Some(outcomes)
            }
        };

        Delivery { urls, postbacks }
    }
}
