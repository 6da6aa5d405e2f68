use std::str::FromStr;
use std::time;

use clap::Parser;
use envconfig::Envconfig;
use thiserror::Error;

use postback_common::config::{EnvMsDuration, LeadPayoutsConfig, PostbackConfig};
use postback_common::dedupe::DedupePolicy;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(from = "POLL_INTERVAL_MS", default = "900000")]
    pub poll_interval: PollInterval,

    #[envconfig(from = "DEDUPE_POLICY", default = "keep_previously_seen")]
    pub dedupe_policy: DedupePolicy,

    #[envconfig(from = "POSTBACK_DRY_RUN", default = "false")]
    pub dry_run: bool,

    #[envconfig(nested = true)]
    pub lead_payouts: LeadPayoutsConfig,

    #[envconfig(nested = true)]
    pub postback: PostbackConfig,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Milliseconds between cycles. Zero is rejected since the timer cannot tick at that rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(pub time::Duration);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParsePollIntervalError {
    #[error("poll interval must be a whole number of milliseconds")]
    Invalid,
    #[error("poll interval must be greater than zero")]
    Zero,
}

impl FromStr for PollInterval {
    type Err = ParsePollIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let EnvMsDuration(interval) = s.parse().map_err(|_| ParsePollIntervalError::Invalid)?;

        if interval.is_zero() {
            return Err(ParsePollIntervalError::Zero);
        }

        Ok(PollInterval(interval))
    }
}

/// Poll lead payouts on a fixed interval and fire Kao postbacks for new events.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of hours before now to request events from. Example: 6
    pub offset_hours: u32,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let env = HashMap::from([(
            "LEAD_PAYOUTS_BEARER_TOKEN".to_owned(),
            "secret".to_owned(),
        )]);

        let config = Config::init_from_hashmap(&env).expect("valid config");

        assert_eq!(config.bind(), "0.0.0.0:3302");
        assert_eq!(config.poll_interval.0, time::Duration::from_secs(15 * 60));
        assert_eq!(config.dedupe_policy, DedupePolicy::KeepPreviouslySeen);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let env = HashMap::from([
            ("LEAD_PAYOUTS_BEARER_TOKEN".to_owned(), "secret".to_owned()),
            ("POLL_INTERVAL_MS".to_owned(), "0".to_owned()),
        ]);

        assert!(Config::init_from_hashmap(&env).is_err());
        assert_eq!("0".parse::<PollInterval>(), Err(ParsePollIntervalError::Zero));
        assert_eq!(
            "15m".parse::<PollInterval>(),
            Err(ParsePollIntervalError::Invalid)
        );
        assert_eq!(
            "1".parse::<PollInterval>(),
            Ok(PollInterval(time::Duration::from_millis(1)))
        );
    }

    #[test]
    fn test_invalid_dedupe_policy() {
        let env = HashMap::from([
            ("LEAD_PAYOUTS_BEARER_TOKEN".to_owned(), "secret".to_owned()),
            ("DEDUPE_POLICY".to_owned(), "everything".to_owned()),
        ]);

        assert!(Config::init_from_hashmap(&env).is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["postback-poller", "6"]).unwrap();
        assert_eq!(args.offset_hours, 6);

        assert!(Args::try_parse_from(["postback-poller", "six"]).is_err());
        assert!(Args::try_parse_from(["postback-poller", "-6"]).is_err());
        assert!(Args::try_parse_from(["postback-poller"]).is_err());
    }
}
