use clap::Parser;
use envconfig::Envconfig;

use postback_common::config::{LeadPayoutsConfig, PostbackConfig};

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(nested = true)]
    pub lead_payouts: LeadPayoutsConfig,

    #[envconfig(nested = true)]
    pub postback: PostbackConfig,

    /// Backfills only preview postback URLs unless explicitly told to fire them.
    #[envconfig(from = "BACKFILL_DRY_RUN", default = "true")]
    pub dry_run: bool,
}

/// Replay lead payouts from a starting timestamp until the end of the available data.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Timestamp to start at, in UTC. Example: 2021-04-03T20:00:00Z
    pub timestamp: String,
}
