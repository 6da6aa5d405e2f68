pub mod config;
pub mod dedupe;
pub mod dispatch;
pub mod event;
pub mod extract;
pub mod fetch;
pub mod health;
pub mod metrics;
pub mod pipeline;
pub mod postback;
