pub mod config;
pub mod handlers;
pub mod poller;
