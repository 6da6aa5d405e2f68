//! Poll lead payouts on a fixed interval and fire Kao postbacks for events not seen on the
//! previous tick.
use std::process::ExitCode;

use axum::Router;
use clap::Parser;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use tracing::{error, info};

use postback_common::extract::ExtractionPolicy;
use postback_common::health::HealthRegistry;
use postback_common::metrics;
use postback_common::pipeline::{DeliveryMode, Pipeline};
use postback_poller::config::{Args, Config};
use postback_poller::handlers;
use postback_poller::poller::Poller;

async fn listen(app: Router, bind: String) -> Result<()> {
    metrics::serve(app, &bind).await?;

    Ok(())
}

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
        ExtractionPolicy::Strict,
        DeliveryMode::from_dry_run(config.dry_run),
    ) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("request setup error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let recorder_handle = match metrics::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("failed to install metrics recorder, serving without /metrics: {}", e);
            None
        }
    };

    let interval = config.poll_interval.0;
    let deadline = match time::Duration::try_from(interval * 2) {
        Ok(deadline) => deadline,
        Err(e) => {
            error!("poll interval out of range: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let liveness = HealthRegistry::new("liveness");
    let poller = Poller::new(
        pipeline,
        args.offset_hours,
        interval,
        config.dedupe_policy,
        liveness.register("poller", deadline),
    );

    info!(
        offset_hours = args.offset_hours,
        interval_secs = interval.as_secs(),
        dedupe_policy = ?config.dedupe_policy,
        dry_run = config.dry_run,
        "starting lead payouts poller"
    );

    let app = handlers::app(liveness, recorder_handle);
    let http_server = Box::pin(listen(app, config.bind()));
    let poll_loop = Box::pin(poller.run());

    match select(http_server, poll_loop).await {
        Either::Left((listen_result, _)) => {
            if let Err(e) = listen_result {
                error!("failed to start postback-poller http server, {}", e);
            }
        }
        Either::Right((_, _)) => error!("postback-poller poll loop exited"),
    };

    ExitCode::FAILURE
}
