// Job-posting sync service
//
// Wires the jobsync pipeline to a Feishu table, runs it on a cron schedule,
// and reports run status over HTTP.

pub mod config;
pub mod kernel;
pub mod server;

pub use config::*;
