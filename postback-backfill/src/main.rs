//! Replay lead payouts from a timestamp and turn them into Kao postbacks.
//!
//! Exits 0 once upstream reports the end of the available data, 1 on anything else.
use std::process::ExitCode;

use clap::Parser;
use envconfig::Envconfig;
use tracing::{error, info};

use postback_backfill::backfill::{exit_status, Backfill};
use postback_backfill::config::{Args, Config};
use postback_common::extract::ExtractionPolicy;
use postback_common::fetch::{log_fetch_error, Cursor};
use postback_common::pipeline::{DeliveryMode, Pipeline};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
        Err(e) => e.exit(),
    };

    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match Pipeline::from_config(
        &config.lead_payouts,
        &config.postback,
        ExtractionPolicy::Lenient,
        DeliveryMode::from_dry_run(config.dry_run),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("request setup error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = Backfill::new(pipeline)
        .run(Cursor::Timestamp(args.timestamp))
        .await;

    match &result {
        Ok(summary) => info!(
            batches = summary.batches,
            urls = summary.urls,
            postbacks = summary.postbacks,
            skipped = summary.skipped,
            end = ?summary.end,
            "backfill complete"
        ),
        Err(e) => log_fetch_error(e),
    }

    ExitCode::from(exit_status(&result))
}
