use std::str::FromStr;
use std::time;

use envconfig::Envconfig;

use crate::postback::KAO_POSTBACK_BASE_URL;

#[derive(Envconfig, Clone)]
pub struct LeadPayoutsConfig {
    #[envconfig(from = "LEAD_PAYOUTS_HOST", default = "https://api.evenfinancial.com")]
    pub host: String,

    #[envconfig(from = "LEAD_PAYOUTS_BEARER_TOKEN")]
    pub bearer_token: NonEmptyString,

    #[envconfig(from = "LEAD_PAYOUTS_REQUEST_TIMEOUT_MS", default = "30000")]
    pub request_timeout: EnvMsDuration,
}

#[derive(Envconfig, Clone)]
pub struct PostbackConfig {
    #[envconfig(from = "POSTBACK_BASE_URL", default = "https://www.kaotrk.com/tracking202/static/gpb.php?")]
    pub base_url: String,

    #[envconfig(from = "POSTBACK_REQUEST_TIMEOUT_MS", default = "5000")]
    pub request_timeout: EnvMsDuration,
}

impl Default for PostbackConfig {
    fn default() -> Self {
        Self {
            base_url: KAO_POSTBACK_BASE_URL.to_owned(),
            request_timeout: EnvMsDuration(time::Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyString(pub String);

impl NonEmptyString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringIsEmptyError;

impl FromStr for NonEmptyString {
    type Err = StringIsEmptyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Err(StringIsEmptyError)
        } else {
            Ok(NonEmptyString(s.to_owned()))
        }
    }
}
