pub mod backfill;
pub mod config;
